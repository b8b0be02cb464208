use thiserror::Error;

/// Result type for OD-11 operations
pub type Result<T> = std::result::Result<T, Od11Error>;

/// Errors that can occur when talking to an OD-11 speaker
#[derive(Error, Debug)]
pub enum Od11Error {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timed out waiting for a state update
    #[error("Timed out waiting for a state update")]
    Timeout,

    /// No session identifier assigned yet (group join incomplete)
    #[error("Not joined to a group yet")]
    NotJoined,

    /// Malformed or out-of-sequence frame from the speaker
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Source name/alias/ID could not be resolved
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Invalid connection parameters
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
