//! Errors returned by registry operations.
use std::sync::PoisonError;
use thiserror::Error;

/// Errors produced by registry operations.
///
/// Identifiers are carried in their `Debug` rendering so the error type stays
/// independent of the registry's key and option type parameters.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TraceRegistryError {
    /// A stop was requested for an identifier that has never been started.
    #[error("unknown trace: {0}")]
    UnknownTrace(String),

    /// An existing, stopped trace was re-armed with a different budget or
    /// different options than it was created with. The stored record is left
    /// untouched.
    #[error("trace {0} re-armed with mismatched budget or options")]
    ConfigMismatch(String),

    /// The registry itself failed: a poisoned lock, or a worker whose channel
    /// has been closed.
    #[error("registry failure: {0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for TraceRegistryError {
    fn from(err: PoisonError<T>) -> Self {
        TraceRegistryError::InternalFailure(format!("registry lock poisoned: {err}"))
    }
}
