//! Capability context construction.
//!
//! Builds the exact set of bindings a snippet may reference inside a fresh
//! interpreter: the two data snapshots, a captured `console`, and a fixed
//! allow-list of pure utility namespaces. The interpreter itself carries no
//! I/O of any kind, so the boundary is structural — there is nothing unsafe
//! to reach regardless of the syntax used to try.

use crate::sandbox::capture::LogSink;
use crate::types::LogKind;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsResult, JsValue, NativeFunction, Source};
use serde_json::Value;
use std::rc::Rc;

/// Global names that survive the hardening prelude. Everything else is
/// removed from the global object before user code runs.
const ALLOWED_GLOBALS: &[&str] = &[
    // data and capture bindings installed by this module
    "response",
    "request",
    "console",
    // structured-data serialization
    "JSON",
    // numeric and string formatting
    "Math",
    "Number",
    "String",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "NaN",
    "Infinity",
    "undefined",
    // collections
    "Array",
    "Object",
    "Map",
    "Set",
    // date arithmetic and pattern matching
    "Date",
    "RegExp",
    // error values a snippet may construct or catch
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    // the sandbox's own global binding; removing it mid-sweep would break
    // the sweep itself, and it leads nowhere but the allow-list
    "globalThis",
];

/// Per-request snapshot of the data bindings.
///
/// Values are owned clones of the caller's JSON; the snippet can never
/// observe or mutate the caller's originals.
#[derive(Clone, Debug)]
pub struct ContextSpec {
    pub response: Value,
    pub request: Value,
}

impl ContextSpec {
    pub fn new(response: Value, request: Value) -> Self {
        Self { response, request }
    }
}

/// Install every binding the snippet is allowed to see, then prune and
/// freeze everything else. Must run before any user code is evaluated.
pub fn install(context: &mut Context, spec: &ContextSpec, sink: Rc<LogSink>) -> JsResult<()> {
    install_data(context, spec)?;
    install_console(context, sink)?;
    harden(context)
}

fn install_data(context: &mut Context, spec: &ContextSpec) -> JsResult<()> {
    let response = JsValue::from_json(&spec.response, context)?;
    context.register_global_property(js_string!("response"), response, Attribute::empty())?;
    let request = JsValue::from_json(&spec.request, context)?;
    context.register_global_property(js_string!("request"), request, Attribute::empty())?;
    Ok(())
}

/// `console` with `log`, `info`, `warn`, `error`, all routed into the
/// capture sink. Arguments are converted at call time so later mutation of
/// a logged object cannot rewrite history.
fn install_console(context: &mut Context, sink: Rc<LogSink>) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(console_fn(sink.clone(), LogKind::Log), js_string!("log"), 0)
        .function(
            console_fn(sink.clone(), LogKind::Info),
            js_string!("info"),
            0,
        )
        .function(
            console_fn(sink.clone(), LogKind::Warn),
            js_string!("warn"),
            0,
        )
        .function(console_fn(sink, LogKind::Error), js_string!("error"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, Attribute::empty())?;
    Ok(())
}

fn console_fn(sink: Rc<LogSink>, kind: LogKind) -> NativeFunction {
    // SAFETY: the closure captures only an Rc around a channel sender and
    // plain counters — no garbage-collected values — which is the
    // requirement `from_closure` places on its captures.
    unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            let arguments = args
                .iter()
                .map(|arg| js_value_to_json(arg, context).unwrap_or(Value::Null))
                .collect();
            sink.emit(kind, arguments);
            Ok(JsValue::undefined())
        })
    }
}

/// Convert an engine value to JSON for capture or as the result value.
/// `None` means the value was absent (`undefined`). Values JSON cannot
/// express (functions, symbols, cycles) fall back to their display string.
pub fn js_value_to_json(value: &JsValue, context: &mut Context) -> Option<Value> {
    if value.is_undefined() {
        return None;
    }
    match value.to_json(context) {
        Ok(json) => Some(json),
        Err(_) => Some(Value::String(value.display().to_string())),
    }
}

/// Remove every global the allow-list does not name and freeze the shared
/// intrinsics, so no alias or computed-member path can recover a pruned
/// binding or smuggle state between otherwise-pure namespaces. The
/// constructor escape hatch on function prototypes is severed first:
/// without it, `(function(){}).constructor` no longer reaches dynamic code
/// construction.
fn harden(context: &mut Context) -> JsResult<()> {
    let keep = ALLOWED_GLOBALS
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(",");
    let prelude = format!(
        r#"
(function() {{
    "use strict";
    var hosts = [
        function () {{}},
        function* () {{}},
        async function () {{}},
        async function* () {{}}
    ];
    for (var i = 0; i < hosts.length; i++) {{
        var proto = Object.getPrototypeOf(hosts[i]);
        try {{
            Object.defineProperty(proto, "constructor", {{ value: undefined }});
        }} catch (e) {{}}
    }}
    var keep = [{keep}];
    var names = Object.getOwnPropertyNames(globalThis);
    for (var i = 0; i < names.length; i++) {{
        if (keep.indexOf(names[i]) < 0) {{
            try {{
                delete globalThis[names[i]];
            }} catch (e) {{
                globalThis[names[i]] = undefined;
            }}
        }}
    }}
    Object.freeze(Object.prototype);
    Object.freeze(Array.prototype);
    Object.freeze(String.prototype);
    Object.freeze(Number.prototype);
    Object.freeze(Date.prototype);
    Object.freeze(RegExp.prototype);
}})();
"#
    );
    context.eval(Source::from_bytes(&prelude)).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::capture;
    use serde_json::json;

    fn eval_in_sandbox(
        spec: ContextSpec,
        code: &str,
    ) -> (Result<Option<Value>, String>, Vec<Value>) {
        let (sink, rx) = LogSink::channel(64);
        let mut context = Context::default();
        install(&mut context, &spec, Rc::new(sink)).expect("install failed");
        let result = match context.eval(Source::from_bytes(code)) {
            Ok(value) => Ok(js_value_to_json(&value, &mut context)),
            Err(err) => Err(err.to_string()),
        };
        let logged = capture::drain(&rx)
            .into_iter()
            .flat_map(|e| e.arguments)
            .collect();
        (result, logged)
    }

    fn empty_spec() -> ContextSpec {
        ContextSpec::new(json!({}), json!({}))
    }

    #[test]
    fn data_bindings_are_visible() {
        let spec = ContextSpec::new(json!({ "a": 41 }), json!({ "url": "/x" }));
        let (result, _) = eval_in_sandbox(spec, "response.a + 1");
        assert_eq!(result.unwrap(), Some(json!(42)));

        let spec = ContextSpec::new(json!({}), json!({ "url": "/x" }));
        let (result, _) = eval_in_sandbox(spec, "request.url");
        assert_eq!(result.unwrap(), Some(json!("/x")));
    }

    #[test]
    fn console_calls_reach_the_sink() {
        let (result, logged) = eval_in_sandbox(empty_spec(), "console.log('hello', 1); 0");
        assert!(result.is_ok());
        assert_eq!(logged, vec![json!("hello"), json!(1)]);
    }

    #[test]
    fn pruned_globals_are_unreachable() {
        for code in [
            "typeof eval",
            "typeof Function",
            "typeof Promise",
            "typeof Symbol",
            "typeof Reflect",
            "typeof Proxy",
        ] {
            let (result, _) = eval_in_sandbox(empty_spec(), code);
            assert_eq!(
                result.unwrap(),
                Some(json!("undefined")),
                "global should be pruned: {code}"
            );
        }
    }

    #[test]
    fn constructor_chain_does_not_reach_dynamic_code() {
        let (result, _) = eval_in_sandbox(
            empty_spec(),
            "(function() {}).constructor === undefined",
        );
        assert_eq!(result.unwrap(), Some(json!(true)));
    }

    #[test]
    fn allowed_utilities_still_work() {
        let (result, _) = eval_in_sandbox(
            empty_spec(),
            r#"JSON.stringify({ n: Math.max(1, 2), s: "x".toUpperCase() })"#,
        );
        assert_eq!(result.unwrap(), Some(json!("{\"n\":2,\"s\":\"X\"}")));
    }

    #[test]
    fn undefined_maps_to_absent() {
        let mut context = Context::default();
        assert!(js_value_to_json(&JsValue::undefined(), &mut context).is_none());
    }
}
