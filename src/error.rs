//! Session-level errors.
//!
//! Per-message problems live next to the code that raises them
//! ([`ParseError`](crate::parser::ParseError),
//! [`LookupError`](crate::lookup::LookupError)) and never end a session.
//! The variants here are the ones that do.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Bad user input: invalid regex, non-positive runtime, malformed config file.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The feed could not be reached, or dropped and could not be recovered.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Writing matched events to the console failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    pub fn configuration<E: std::fmt::Display>(error: E) -> Self {
        Self::Configuration(error.to_string())
    }

    pub fn connection<E: std::fmt::Display>(error: E) -> Self {
        Self::Connection(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::MonitorError;

    #[test]
    fn test_configuration_message() {
        let err = MonitorError::configuration("runtime must be positive");
        assert_eq!(
            err.to_string(),
            "invalid configuration: runtime must be positive"
        );
    }

    #[test]
    fn test_connection_message() {
        let err = MonitorError::connection("Connection timeout");
        assert_eq!(err.to_string(), "connection failed: Connection timeout");
    }
}
