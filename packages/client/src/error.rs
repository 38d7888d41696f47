//! Error types for the realtime messaging client.

use thiserror::Error;

use crate::stomp::FrameError;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The broker refused the STOMP handshake
    #[error("Broker rejected the connection: {0}")]
    Rejected(String),

    /// The broker did not answer the handshake in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// STOMP frame could not be parsed
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport is gone; the frame was not written
    #[error("Not connected")]
    NotConnected,

    /// The client's event loop has been disposed
    #[error("Client has been disposed")]
    Disposed,
}

/// Errors raised while loading the stored authentication session
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Session file could not be read
    #[error("Failed to read session file: {0}")]
    Io(#[from] std::io::Error),

    /// Session file is not valid JSON
    #[error("Invalid session file: {0}")]
    Invalid(#[from] serde_json::Error),

    /// The session has no signed-in user
    #[error("No current user in the stored session")]
    MissingUser,

    /// A stored value is malformed
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
