//! Error types shared by GKDB crates

use thiserror::Error;

/// Result type alias for shared GKDB operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared infrastructure
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),
}
