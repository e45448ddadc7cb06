//! Error types for the room layer.

use roomhub_protocol::{MemberId, RoomCode};
use roomhub_transport::ConnectionId;

/// Errors surfaced to the layer calling into rooms.
///
/// Faults inside a room (slow consumers, dead connections) never show up
/// here; they are resolved by eviction.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room is registered under this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room has never admitted this member.
    #[error("member {member} not found in room {room}")]
    MemberNotFound { room: RoomCode, member: MemberId },

    /// The room has started and no longer admits members.
    #[error("room {0} has started and is not admitting members")]
    NotAdmitted(RoomCode),

    /// The member already has a live connection.
    #[error("member {member} is already attached on {connection}")]
    AlreadyAttached {
        member: MemberId,
        connection: ConnectionId,
    },

    /// Every code tried while creating a room was already taken.
    #[error("no free room code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}
