//! Error handling for the WiFi repeater
//!
//! Unified error types shared by the foundation and core crates. Frame-level
//! problems are never reported through these; malformed traffic is dropped
//! silently at the ingress layer.

use std::fmt;
use std::io;

/// Main error type for repeater operations
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A bounded wait (connect, disconnect, worker gate) expired
    TimeOut,
    /// Operation is not valid in the current bridging state
    InvalidState,
    /// Bad argument (address out of range, zero-length SSID, ...)
    InvalidParameter,
    /// The STA interface has no upstream association
    NotConnected,
    /// The radio driver rejected an operation
    Driver(String),
    /// Configuration validation/parsing error
    Config(String),
    /// I/O operation failed
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TimeOut => write!(f, "Operation timed out"),
            Error::InvalidState => write!(f, "Invalid state"),
            Error::InvalidParameter => write!(f, "Invalid parameter"),
            Error::NotConnected => write!(f, "Not connected"),
            Error::Driver(msg) => write!(f, "Radio driver error: {msg}"),
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Result type alias for repeater operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert!(Error::TimeOut.to_string().contains("timed out"));
        let err = Error::Driver("set_mac rejected".to_string());
        assert!(err.to_string().contains("set_mac rejected"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
