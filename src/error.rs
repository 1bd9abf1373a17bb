//! Error types for the tool-provider client layer

use thiserror::Error;

/// Errors produced while loading, connecting, and invoking tools
#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    /// Malformed or incomplete configuration. Fatal, never retried.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transport-level failure while establishing or using a connection
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Connect or request exceeded its deadline
    #[error("Timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Handshake or wire-protocol failure
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Server reported an error response
    #[error("Server error {code}: {message}")]
    Server { code: i32, message: String },

    /// Requested logical tool name is not in the catalog
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// Invocation arguments failed the derived parameter contract
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The tool's own logic failed at call time
    #[error("Tool '{tool}' failed: {message}")]
    Execution { tool: String, message: String },

    /// Message encoding/decoding failure
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl BridgeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn server(code: i32, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether the connect retry loop should swallow this error and try again.
    ///
    /// Everything up to and including the handshake is transient territory;
    /// configuration and per-call failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Protocol { .. } | Self::Server { .. }
        )
    }

    /// Short machine-readable kind tag used in structured error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::Connection { .. } => "ConnectionError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Protocol { .. } => "ProtocolError",
            Self::Server { .. } => "ServerError",
            Self::ToolNotFound { .. } => "ToolNotFoundError",
            Self::Validation { .. } => "ValidationError",
            Self::Execution { .. } => "ExecutionError",
            Self::Serialization { .. } => "SerializationError",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BridgeError::connection("refused").is_retryable());
        assert!(BridgeError::timeout(30).is_retryable());
        assert!(BridgeError::protocol("handshake rejected").is_retryable());
        assert!(!BridgeError::configuration("missing field").is_retryable());
        assert!(!BridgeError::validation("bad argument").is_retryable());
        assert!(!BridgeError::execution("echo", "boom").is_retryable());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(BridgeError::validation("x").kind(), "ValidationError");
        assert_eq!(BridgeError::execution("t", "x").kind(), "ExecutionError");
        assert_eq!(BridgeError::tool_not_found("t").kind(), "ToolNotFoundError");
    }
}
