//! Unified error type for Roomhub.

use roomhub_protocol::ProtocolError;
use roomhub_room::RoomError;
use roomhub_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed or missing hello).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, not admitted, already attached).
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl HubError {
    /// The status a `rejected` hello carries for this error.
    ///
    /// `None` for transport errors: the connection is already unusable, so
    /// there is nobody to tell. An oversized frame is the exception, as it
    /// is refused before anything is read past its header.
    pub fn rejection_code(&self) -> Option<u16> {
        match self {
            Self::Transport(TransportError::MessageTooLarge { .. }) => Some(400),
            Self::Transport(_) => None,
            Self::Protocol(_) => Some(400),
            Self::Room(RoomError::NotFound(_) | RoomError::MemberNotFound { .. }) => Some(404),
            Self::Room(RoomError::NotAdmitted(_) | RoomError::AlreadyAttached { .. }) => {
                Some(409)
            }
            Self::Room(RoomError::CodeSpaceExhausted { .. } | RoomError::Unavailable(_)) => {
                Some(503)
            }
        }
    }
}
