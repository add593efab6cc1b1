#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_creation() {
        let error = LudusError::ConnectionError("server is not running".to_string());
        assert_eq!(error.to_string(), "Connection error: server is not running");
    }

    #[test]
    fn test_timeout_error_creation() {
        let error = LudusError::TimeoutError("no response within 10s".to_string());
        assert_eq!(error.to_string(), "Timeout error: no response within 10s");
    }

    #[test]
    fn test_rpc_error_creation() {
        let error = LudusError::RpcError("boom".to_string());
        assert_eq!(error.to_string(), "MCP error: boom");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let ludus_error: LudusError = io_error.into();
        assert!(matches!(ludus_error, LudusError::IoError(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let ludus_error: LudusError = json_error.into();
        assert!(matches!(ludus_error, LudusError::JsonError(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let invalid_toml = "invalid = [toml";
        let toml_error = toml::from_str::<toml::Value>(invalid_toml).unwrap_err();
        let ludus_error: LudusError = toml_error.into();
        assert!(matches!(ludus_error, LudusError::ConfigError(_)));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LudusError::BrokenPipe("x".to_string()).error_code(),
            "BROKEN_PIPE"
        );
        assert_eq!(
            LudusError::TimeoutError("x".to_string()).error_code(),
            "TIMEOUT_ERROR"
        );
        assert_eq!(
            LudusError::ConnectionClosed("x".to_string()).error_code(),
            "CONNECTION_CLOSED"
        );
    }
}

use thiserror::Error;

/// Error type for the ludus-mcp crate.
///
/// The transport variants are deliberately distinct: callers and logs need to
/// tell "timed out" apart from "process died" and from "server returned an
/// application error", so they must never be collapsed into one another.
#[derive(Error, Debug)]
pub enum LudusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Spawn error: {0}")]
    SpawnError(String),

    #[error("Broken pipe: {0}")]
    BrokenPipe(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("MCP error: {0}")]
    RpcError(String),

    #[error("Ludus API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<toml::de::Error> for LudusError {
    fn from(error: toml::de::Error) -> Self {
        LudusError::ConfigError(error.to_string())
    }
}

impl LudusError {
    pub fn error_code(&self) -> &'static str {
        match self {
            LudusError::ConnectionError(_) => "CONNECTION_ERROR",
            LudusError::SpawnError(_) => "SPAWN_ERROR",
            LudusError::BrokenPipe(_) => "BROKEN_PIPE",
            LudusError::TimeoutError(_) => "TIMEOUT_ERROR",
            LudusError::ConnectionClosed(_) => "CONNECTION_CLOSED",
            LudusError::ProtocolError(_) => "PROTOCOL_ERROR",
            LudusError::RpcError(_) => "MCP_ERROR",
            LudusError::ApiError(_) => "API_ERROR",
            LudusError::ConfigError(_) => "CONFIG_ERROR",
            LudusError::ProcessError(_) => "PROCESS_ERROR",
            LudusError::IoError(_) => "IO_ERROR",
            LudusError::JsonError(_) => "JSON_ERROR",
            LudusError::HttpError(_) => "HTTP_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LudusError>;
