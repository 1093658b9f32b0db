//! scriptbox: a sandboxed JavaScript snippet-evaluation engine
//!
//! Executes untrusted snippets against a read-only request/response context
//! with no ambient authority, under judge-enforced deadlines, and reports a
//! structured, deterministic outcome.
//!
//! # Architecture
//!
//! The pipeline is four pure gates; failure at any stage short-circuits to
//! a structured result:
//!
//! ## Admission ([`admission`])
//! - Shape and size checks plus a coarse fail-closed scan, before any
//!   execution resource exists
//!
//! ## Sandbox ([`sandbox`])
//! - [`sandbox::context`]: capability-scoped global scope — the two data
//!   snapshots, a captured `console`, a fixed allow-list of pure utility
//!   namespaces, and nothing else
//! - [`sandbox::host`]: fresh interpreter per call on a dedicated worker
//!   thread; the deadline is enforced from outside the worker's control
//!   flow
//! - [`sandbox::capture`]: bounded console capture with emission-order
//!   sequence numbers that survive a deadline abort
//!
//! ## Engine ([`engine`])
//! - Orchestration and pure result assembly; every call yields exactly one
//!   [`types::EvaluationResult`]
//!
//! ## Interfaces ([`http`], [`cli`])
//! - Wire shapes, axum routes, the injected bounded history store, and the
//!   service/one-shot entrypoints
//!
//! ## Observability ([`observability`])
//! - Structured audit events with per-evaluation correlation IDs
//!
//! # Design Principles
//!
//! 1. **Capabilities, not blocklists** - the global scope never contains
//!    anything unsafe, whatever the syntax used to look for it
//! 2. **Deadlines are enforced, not requested** - a hung snippet cannot
//!    extend its own lifetime
//! 3. **Total results** - every evaluation produces exactly one structured
//!    report; nothing propagates past the engine boundary
//! 4. **No shared state** - each call builds and discards its own context,
//!    interpreter, and capture channel

// Pre-execution gate
pub mod admission;

// Capability context, capture, and the execution host
pub mod sandbox;

// Evaluation pipeline
pub mod engine;

// External interfaces
pub mod http;

// Observability
pub mod observability;

// Shared type definitions and closed enums
pub mod types;

// CLI entrypoint wiring for the scriptbox binary
pub mod cli;

// Re-export commonly used types for convenience
pub use engine::Evaluator;
pub use types::*;
