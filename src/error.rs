//! Crate-level error type
//!
//! Server entry points return this error. Per-connection failures are
//! contained to that connection's teardown path and never surface here.

use std::io;

/// Error type for server-level operations
#[derive(Debug)]
pub enum Error {
    /// I/O error (bind, accept)
    Io(io::Error),
    /// Could not spawn or join a server task
    Runtime(String),
}

/// Result alias for server-level operations
pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Runtime(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
