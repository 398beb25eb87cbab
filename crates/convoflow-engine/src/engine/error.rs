//! Engine error types.

use thiserror::Error;

/// Errors from [`EngineBuilder::build`](super::EngineBuilder::build).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// An option was out of range.
    #[error("build error: {message}")]
    Build { message: String },
}
