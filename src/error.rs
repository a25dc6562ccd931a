//! Relay failure taxonomy.
//!
//! Connection-scoped failures (`AuthRequired`, `RoomResolution`) reject the
//! connection before the WebSocket upgrade is accepted. Everything else is
//! scoped to a single message: reported to the originating session on an
//! error frame, the message dropped, the connection left open. Nothing here
//! is process-fatal.

use crate::media::MAX_MEDIA_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No usable principal for the connection route.
    #[error("unknown principal: {0}")]
    AuthRequired(String),

    /// Target room is missing, closed to the principal, or the peer hint
    /// cannot be resolved.
    #[error("room resolution failed: {0}")]
    RoomResolution(String),

    /// Inbound frame is structurally invalid: not a JSON object, no content
    /// field populated, or more than one populated.
    #[error("invalid message frame: {0}")]
    InvalidFrame(String),

    /// Declared MIME type is missing or not in the allow-list.
    #[error("unsupported media type: {0}")]
    UnsupportedType(String),

    /// Decoded content exceeds the media size ceiling.
    #[error("content exceeds the {} MiB media size limit", MAX_MEDIA_BYTES / (1024 * 1024))]
    TooLarge,

    /// Audio payload could not be decoded for transcoding.
    #[error("audio decode failed: {0}")]
    Decode(String),

    /// Durable write failed. The message is dropped and never broadcast.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for RelayError {
    fn from(err: rusqlite::Error) -> Self {
        RelayError::Persistence(err.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
