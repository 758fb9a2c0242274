//! # Trace Registry
//!
//! An in-process registry that tracks the lifecycle of named trace sessions
//! for a profiling/tracing facility. Each trace carries a call-count budget;
//! the instrumentation layer asks the registry before each invocation of a
//! traced function and is told whether this invocation should finalize the
//! trace and emit a report.
//!
//! Two facades share the same state machine:
//!
//! - [`TraceRegistry`], a cloneable handle over a mutex-guarded table, for
//!   callers that want a plain synchronous API.
//! - [`worker::RegistryWorker`] with [`worker::RegistryHandle`], a dedicated
//!   task consuming requests from a channel, for async callers. Every request
//!   carries its own reply channel, so the operation set is closed: a request
//!   that is not expressible as a [`worker::RegistryMessage`] cannot reach the
//!   worker at all.
//!
//! # Example
//!
//! ```
//! use std::num::NonZeroU64;
//! use trace_registry::{StartOutcome, TraceRegistry};
//!
//! let registry: TraceRegistry<&str, Vec<&str>> = TraceRegistry::new();
//! let budget = NonZeroU64::new(2).unwrap();
//! let options = vec!["return_trace"];
//!
//! // First call creates the trace with a zeroed counter.
//! let outcome = registry
//!     .start_or_advance("factorial", budget, options.clone())
//!     .unwrap();
//! assert_eq!(outcome, StartOutcome::Started { id: "factorial" });
//!
//! // Each stop/start pair counts one traced invocation.
//! registry.stop(&"factorial").unwrap();
//! registry
//!     .start_or_advance("factorial", budget, options.clone())
//!     .unwrap();
//! registry.stop(&"factorial").unwrap();
//!
//! // The call that reaches the budget reports it, echoing the options back.
//! match registry
//!     .start_or_advance("factorial", budget, options.clone())
//!     .unwrap()
//! {
//!     StartOutcome::EndTrace { calls, options, .. } => {
//!         assert_eq!(calls, 2);
//!         assert_eq!(options, vec!["return_trace"]);
//!     }
//!     other => panic!("expected EndTrace, got {other:?}"),
//! }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod error;
mod internal_logging;
mod registry;
pub mod worker;

pub use error::TraceRegistryError;
pub use registry::{StartOutcome, StoppedTrace, TraceRecord, TraceRegistry};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, warn};
}
