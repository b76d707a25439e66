use thiserror::Error;

/// Result type for RIO operations
pub type Result<T> = std::result::Result<T, RioError>;

/// Errors that can occur when talking to a Russound controller
#[derive(Error, Debug)]
pub enum RioError {
    /// Socket error (unreachable, refused, reset, failed write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command was issued while no connection is open
    #[error("Not connected")]
    NotConnected,

    /// Connection was closed while a command was pending
    #[error("Connection closed")]
    ConnectionClosed,

    /// No response arrived within the request timeout
    #[error("Request timeout")]
    Timeout,

    /// Controller answered with an error status line
    #[error("Controller error: {detail}")]
    Protocol {
        /// Error text following the `E` status code
        detail: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response did not carry what the command asked for
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration is missing required values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Event channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
