//! Shared primitives for all Rust crates in Rategate.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used across Rategate crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration or violated invariant. Fatal at startup;
    /// never produced on the request path.
    #[error("validation error: {0}")]
    Validation(String),

    /// Backend connectivity or operation failure. The admission path
    /// recovers from this category by failing open.
    #[error("internal error: {0}")]
    Internal(String),
}
