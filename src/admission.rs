//! Pre-execution admission gate.
//!
//! Pure predicate over the snippet text: shape and size checks first, then a
//! coarse fail-closed scan for surface syntax that could only be an attempt
//! to reach outside the sandbox. The scan is defense in depth — the actual
//! boundary is the capability-scoped global scope built in
//! [`crate::sandbox::context`], which simply never binds any of these names.

use crate::types::{ErrorCategory, ErrorDetail, EvalLimits};

/// Identifiers with no binding inside the sandbox, paired with the reason
/// they are scanned for. A snippet naming one of these would fail at runtime
/// with an unresolved-reference fault anyway; rejecting up front just saves
/// the cost of spinning up an interpreter.
const UNBOUND_IDENTIFIERS: &[&str] = &[
    // dynamic code construction
    "eval",
    "Function",
    // module loading
    "require",
    // host global scope
    "globalThis",
    "window",
    "global",
    "process",
    // timers and task scheduling
    "setTimeout",
    "setInterval",
    "setImmediate",
    "queueMicrotask",
    // network
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
];

/// Keywords that are only legal in module source, which a snippet never is.
const MODULE_KEYWORDS: &[&str] = &["import", "export"];

/// Decide whether a snippet is eligible to run at all.
///
/// Shape and size violations are `AdmissionRejected`. Scan hits are reported
/// exactly the way the runtime would report them — as an unresolved-reference
/// fault (`CapabilityViolation`) — so a caller cannot tell the pre-filter
/// apart from the structural boundary behind it.
pub fn admit(code: &str, limits: &EvalLimits) -> Result<(), ErrorDetail> {
    if code.trim().is_empty() {
        return Err(ErrorDetail::new(
            ErrorCategory::AdmissionRejected,
            "code must be a non-empty string",
        ));
    }

    let length = code.chars().count();
    if length > limits.max_code_length {
        return Err(ErrorDetail::new(
            ErrorCategory::AdmissionRejected,
            format!(
                "code length {} exceeds the maximum of {} characters",
                length, limits.max_code_length
            ),
        ));
    }

    for ident in UNBOUND_IDENTIFIERS {
        if contains_bare_identifier(code, ident) {
            return Err(ErrorDetail::new(
                ErrorCategory::CapabilityViolation,
                format!("{ident} is not defined"),
            ));
        }
    }

    for keyword in MODULE_KEYWORDS {
        if contains_bare_identifier(code, keyword) {
            return Err(ErrorDetail::new(
                ErrorCategory::CapabilityViolation,
                "module syntax is not supported",
            ));
        }
    }

    Ok(())
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// True when `ident` occurs in `code` with non-identifier characters (or the
/// text boundary) on both sides. Catches `setTimeout(...)` without tripping
/// on `mySetTimeoutish`. Property accesses like `obj.eval` still match; the
/// scan is deliberately fail-closed.
fn contains_bare_identifier(code: &str, ident: &str) -> bool {
    let bytes = code.as_bytes();
    let mut start = 0;
    while let Some(pos) = code[start..].find(ident) {
        let at = start + pos;
        let end = at + ident.len();
        let before_ok = at == 0 || !is_ident_char(bytes[at - 1]);
        let after_ok = end >= bytes.len() || !is_ident_char(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        start = end;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit_default(code: &str) -> Result<(), ErrorDetail> {
        admit(code, &EvalLimits::default())
    }

    #[test]
    fn accepts_plain_snippets() {
        assert!(admit_default("return response.status;").is_ok());
        assert!(admit_default("const x = [1, 2, 3];\nreturn x.length;").is_ok());
    }

    #[test]
    fn rejects_empty_and_whitespace_code() {
        for code in ["", "   ", "\n\t  \n"] {
            let detail = admit_default(code).unwrap_err();
            assert_eq!(detail.category, ErrorCategory::AdmissionRejected);
        }
    }

    #[test]
    fn rejects_oversized_code() {
        let code = "x".repeat(MAX_LEN + 1);
        let detail = admit_default(&code).unwrap_err();
        assert_eq!(detail.category, ErrorCategory::AdmissionRejected);
        assert!(detail.message.contains("maximum"));
    }

    const MAX_LEN: usize = crate::types::MAX_CODE_LENGTH;

    #[test]
    fn accepts_code_exactly_at_the_limit() {
        let mut code = "//".to_string();
        code.push_str(&"x".repeat(MAX_LEN - 2));
        assert_eq!(code.chars().count(), MAX_LEN);
        assert!(admit_default(&code).is_ok());
    }

    #[test]
    fn scan_hits_look_like_unresolved_references() {
        let detail = admit_default("setTimeout(function() {}, 10);").unwrap_err();
        assert_eq!(detail.category, ErrorCategory::CapabilityViolation);
        assert_eq!(detail.message, "setTimeout is not defined");

        let detail = admit_default("return eval('1 + 1');").unwrap_err();
        assert_eq!(detail.category, ErrorCategory::CapabilityViolation);
        assert_eq!(detail.message, "eval is not defined");
    }

    #[test]
    fn scan_rejects_module_syntax() {
        let detail = admit_default("import fs from 'fs';").unwrap_err();
        assert_eq!(detail.category, ErrorCategory::CapabilityViolation);
        assert_eq!(detail.message, "module syntax is not supported");
    }

    #[test]
    fn scan_respects_identifier_boundaries() {
        // "eval" embedded in larger identifiers is not a hit
        assert!(admit_default("const retrieval = 1; return retrieval;").is_ok());
        assert!(admit_default("const evaluation = 2; return evaluation;").is_ok());
        // "fetch" as part of another word
        assert!(admit_default("const prefetched = 3; return prefetched;").is_ok());
    }

    #[test]
    fn scan_is_fail_closed_on_property_access() {
        // obj.eval is almost certainly aliasing mischief; reject it
        let detail = admit_default("return response.eval;").unwrap_err();
        assert_eq!(detail.category, ErrorCategory::CapabilityViolation);
    }
}
