//! Wire protocol for Roomhub.
//!
//! Room traffic is opaque bytes, so the protocol is small:
//!
//! - **Identifiers** ([`RoomCode`], [`MemberId`]) — what rooms and members
//!   are called on the wire.
//! - **Handshake** ([`ClientHello`], [`ServerHello`]) — the one structured
//!   exchange at the start of every connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how hellos become bytes.
//! - **Errors** ([`ProtocolError`]).

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientHello, MemberId, ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomCode,
    ServerHello,
};
