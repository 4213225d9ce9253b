//! Shared error type

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by shared AARC code
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}
