use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Windows API error: {0}")]
    Windows(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unsupported value type: {0}")]
    UnsupportedType(String),

    #[error("Not supported on this platform: {0}")]
    Unsupported(String),
}

pub type DriverResult<T> = Result<T, DriverError>;
