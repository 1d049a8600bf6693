//! Client error types

use crate::message::MessageError;
use thiserror::Error;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connecting to a relay failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Relay url is not a ws:// or wss:// url
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Malformed frame or unexpected reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected to relay")]
    NotConnected,

    /// The pool has no relay able to take the request
    #[error("No relays configured")]
    NoRelays,

    /// Every relay rejected or failed the publish
    #[error("Event publish failed: {0}")]
    PublishFailed(String),

    /// The operation needs relays that are not configured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<MessageError> for ClientError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::Json(e) => ClientError::Serialization(e),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(err.to_string())
    }
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;
