use thiserror::Error;

/// Application-wide error type
///
/// Nothing in the signaling layer is process-fatal: every variant is handled
/// by logging and dropping the affected message or operation.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed envelope or candidate-array JSON
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outbound serialization failure
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Session not found: {0}")]
    UnknownSession(String),

    /// A registered handler rejected its parameter
    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    /// Offer/answer/candidate text rejected by the negotiation backend's parser
    #[error("Negotiation parse error: {0}")]
    NegotiationParse(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Whether the peer has to re-drive negotiation after this error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, AppError::NegotiationParse(_) | AppError::Decode(_))
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
