use std::time::Duration;
use thiserror::Error;

/// The only errors that escape [`crate::PartResolver::resolve`]. Every
/// downstream stage failure is absorbed into confidence and notes instead.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure of a single source adapter. Caught at the fan-out call site,
/// recorded to the health monitor, never surfaced to the caller.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned unparseable content: {0}")]
    Parse(String),

    #[error("upstream quota exhausted: {0}")]
    Quota(String),

    #[error("adapter timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Failure of the language-model inference collaborator.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference quota exceeded")]
    Quota,

    #[error("inference timed out")]
    Timeout,

    #[error("inference backend error: {0}")]
    Backend(String),
}
