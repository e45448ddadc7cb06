//! Members: a room participant and its (at most one) live connection.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use roomhub_protocol::MemberId;
use roomhub_transport::{Connection, ConnectionId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{RoomError, RoomHandle, pump};

/// Where a member stands with respect to its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Admitted, never connected.
    Unattached,
    /// Pumps are running on this connection.
    Attached(ConnectionId),
    /// The last connection ended. The member may attach again.
    Disconnected(ConnectionId),
}

struct MemberInner {
    id: MemberId,
    name: String,
    room: RoomHandle,
    state: Mutex<ConnectionState>,
}

/// A participant in one room.
///
/// Cheap to clone; clones share identity and connection state.
#[derive(Clone)]
pub struct Member {
    inner: Arc<MemberInner>,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("room", self.inner.room.code())
            .field("state", &self.connection_state())
            .finish()
    }
}

impl Member {
    pub(crate) fn new(id: MemberId, name: String, room: RoomHandle) -> Self {
        Self {
            inner: Arc::new(MemberInner {
                id,
                name,
                room,
                state: Mutex::new(ConnectionState::Unattached),
            }),
        }
    }

    pub fn id(&self) -> MemberId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The room this member was admitted to.
    pub fn room(&self) -> &RoomHandle {
        &self.inner.room
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.lock_state()
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.connection_state(), ConnectionState::Attached(_))
    }

    /// Binds `conn` to this member: registers a fresh outbound queue with
    /// the room, then spawns the inbound and outbound pumps.
    ///
    /// The connection is consumed either way. On error it is dropped
    /// without a close frame; callers that want to tell the peer why should
    /// check [`is_attached`](Self::is_attached) before handing it over.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyAttached`] if another connection is live.
    /// - [`RoomError::Unavailable`] if the room coordinator is gone.
    pub async fn attach<C: Connection>(&self, conn: C) -> Result<Pumps, RoomError> {
        let conn_id = conn.id();
        {
            let mut state = self.lock_state();
            if let ConnectionState::Attached(current) = *state {
                return Err(RoomError::AlreadyAttached {
                    member: self.id(),
                    connection: current,
                });
            }
            *state = ConnectionState::Attached(conn_id);
        }

        let config = self.room().config().clone();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        if let Err(e) = self.room().register(self.clone(), outbound_tx).await {
            self.release(conn_id);
            return Err(e);
        }

        tracing::debug!(
            room = %self.room().code(),
            member = %self.id(),
            conn_id = %conn_id,
            "attaching connection"
        );

        let (reader, writer) = conn.split();
        let inbound = tokio::spawn(pump::inbound(
            reader,
            self.clone(),
            conn_id,
            config.clone(),
        ));
        let outbound = tokio::spawn(pump::outbound(
            writer,
            outbound_rx,
            self.id(),
            conn_id,
            config,
        ));

        Ok(Pumps {
            connection: conn_id,
            inbound,
            outbound,
        })
    }

    /// Marks the connection as ended, unless a newer one has replaced it.
    pub(crate) fn release(&self, conn_id: ConnectionId) {
        let mut state = self.lock_state();
        if *state == ConnectionState::Attached(conn_id) {
            *state = ConnectionState::Disconnected(conn_id);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The two tasks driving an attached connection.
#[derive(Debug)]
pub struct Pumps {
    connection: ConnectionId,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl Pumps {
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Waits for both pumps to finish, i.e. for the connection to end.
    pub async fn join(self) {
        let (inbound, outbound) = tokio::join!(self.inbound, self.outbound);
        for (pump, result) in [("inbound", inbound), ("outbound", outbound)] {
            if let Err(e) = result {
                tracing::error!(conn_id = %self.connection, pump, error = %e, "pump task failed");
            }
        }
    }
}
