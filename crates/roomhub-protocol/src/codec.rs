//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between the handshake types and raw frame bytes. The
//! rest of the hub only needs something that implements [`Codec`], so a
//! binary format can later replace [`JsonCodec`] without touching the
//! server code.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec is shared by every
/// connection task the server spawns.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is what a browser client speaks natively, so hellos can be built
/// with `JSON.stringify` and read with `JSON.parse`.
///
/// ## Example
///
/// ```rust
/// use roomhub_protocol::{ClientHello, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let hello: ClientHello = codec
///     .decode(br#"{"type":"join","room":"QWER","name":"ada"}"#)
///     .unwrap();
///
/// match hello {
///     ClientHello::Join { room, name } => {
///         assert_eq!(room.as_str(), "QWER");
///         assert_eq!(name, "ada");
///     }
///     other => panic!("unexpected hello: {other:?}"),
/// }
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
