//! Error types for the protocol layer.
//!
//! When you see a `ProtocolError`, the problem is in the shape of the data
//! (an identifier that doesn't parse, a hello that doesn't decode), not in
//! networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, an unknown
    /// `type` tag, or an identifier that fails validation.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The string is not a valid room code (wrong length or a character
    /// outside the code alphabet).
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// The string is not a valid member identifier.
    #[error("invalid member id: {0:?}")]
    InvalidMemberId(String),

    /// The message decoded but violates the handshake rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
