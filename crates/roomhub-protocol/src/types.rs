//! Core protocol types: identifiers and the join handshake.
//!
//! Everything here travels on the wire. Room payloads themselves are opaque
//! bytes and never pass through these types; only the first exchange on a
//! connection (the hello) is structured.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 4;

/// The characters a room code is drawn from.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A short, human-typeable room code such as `"QWER"`.
///
/// Always exactly [`ROOM_CODE_LEN`] characters from
/// [`ROOM_CODE_ALPHABET`]; the constructors enforce it and serde goes
/// through the same validation, so a `RoomCode` in hand is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Validates and wraps a room code.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidRoomCode`] on a wrong length or a
    /// character outside the alphabet. Codes are case-sensitive.
    pub fn parse(code: &str) -> Result<Self, ProtocolError> {
        let valid = code.len() == ROOM_CODE_LEN
            && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b));
        if valid {
            Ok(Self(code.to_owned()))
        } else {
            Err(ProtocolError::InvalidRoomCode(code.to_owned()))
        }
    }

    /// Draws a uniformly random code.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| {
                let i = rng.random_range(0..ROOM_CODE_ALPHABET.len());
                char::from(ROOM_CODE_ALPHABET[i])
            })
            .collect();
        Self(code)
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// A member's durable identity within a room.
///
/// Minted on admission and handed to the client, which presents it again
/// to resume after a dropped connection. Serializes as the hyphenated UUID
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Mints a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidMemberId(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Join handshake
// ---------------------------------------------------------------------------

/// The first frame a client sends on a new connection.
///
/// Internally tagged, so the JSON reads `{"type":"join","room":"QWER",...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientHello {
    /// Create a new room and join it.
    Create { name: String },

    /// Join an existing room as a new member.
    Join { room: RoomCode, name: String },

    /// Re-attach a member that was admitted earlier.
    Resume { room: RoomCode, member: MemberId },
}

/// The server's answer to a [`ClientHello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerHello {
    /// The connection is attached; room traffic follows.
    Welcome {
        room: RoomCode,
        member: MemberId,
        name: String,
    },

    /// The hello was refused and the connection will close.
    /// `code` follows HTTP conventions (400, 404, 409, 503).
    Rejected { code: u16, message: String },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_parse_accepts_uppercase_letters() {
        let code = RoomCode::parse("ABCZ").expect("valid code");
        assert_eq!(code.as_str(), "ABCZ");
        assert_eq!(code.to_string(), "ABCZ");
    }

    #[test]
    fn test_room_code_parse_rejects_bad_input() {
        for bad in ["", "ABC", "ABCDE", "abcd", "AB1D", "AB D", "ÄBCD"] {
            assert!(
                matches!(RoomCode::parse(bad), Err(ProtocolError::InvalidRoomCode(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_room_code_random_stays_in_alphabet() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let code = RoomCode::random(&mut rng);
            assert!(RoomCode::parse(code.as_str()).is_ok(), "{code}");
        }
    }

    #[test]
    fn test_room_code_deserialize_validates() {
        let ok: RoomCode = serde_json::from_str("\"QWER\"").unwrap();
        assert_eq!(ok.as_str(), "QWER");
        assert!(serde_json::from_str::<RoomCode>("\"qwer\"").is_err());
    }

    #[test]
    fn test_member_id_serializes_as_uuid_string() {
        let id: MemberId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"67e55044-10b1-426f-9247-bb680e5fe0c8\"");
    }

    #[test]
    fn test_member_id_parse_rejects_garbage() {
        assert!(matches!(
            "not-a-uuid".parse::<MemberId>(),
            Err(ProtocolError::InvalidMemberId(_))
        ));
    }

    #[test]
    fn test_member_ids_are_unique() {
        assert_ne!(MemberId::new(), MemberId::new());
    }

    #[test]
    fn test_client_hello_wire_shape() {
        let hello: ClientHello =
            serde_json::from_str(r#"{"type":"create","name":"ada"}"#).unwrap();
        assert_eq!(hello, ClientHello::Create { name: "ada".into() });

        let resume: ClientHello = serde_json::from_str(
            r#"{"type":"resume","room":"QWER","member":"67e55044-10b1-426f-9247-bb680e5fe0c8"}"#,
        )
        .unwrap();
        assert!(matches!(resume, ClientHello::Resume { .. }));
    }

    #[test]
    fn test_client_hello_rejects_invalid_room_code() {
        let result = serde_json::from_str::<ClientHello>(
            r#"{"type":"join","room":"nope","name":"ada"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_server_hello_rejected_wire_shape() {
        let json = serde_json::to_value(ServerHello::Rejected {
            code: 404,
            message: "room QWER not found".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "rejected");
        assert_eq!(json["code"], 404);
    }
}
