//! Room coordinator: an isolated Tokio task that owns a room's membership.
//!
//! Each room runs in its own task, communicating with the outside world
//! through a single mpsc channel. Because there is exactly one channel and
//! one consumer, registrations, unregistrations and broadcasts are handled
//! strictly in the order they were submitted, never by kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use roomhub_protocol::{MemberId, RoomCode};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::{HubConfig, Member, RoomError, RoomState};

/// Sending side of a member's outbound queue. Held only by the coordinator.
pub type OutboundSender = mpsc::Sender<Bytes>;

/// Receiving side of a member's outbound queue. Drained only by that
/// member's outbound pump.
pub type OutboundReceiver = mpsc::Receiver<Bytes>;

/// A unit of broadcast: an opaque payload and the member it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The member whose connection produced the payload.
    pub origin: MemberId,
    /// The payload, relayed byte for byte.
    pub payload: Bytes,
}

impl Envelope {
    /// Wraps a payload received from `origin`.
    pub fn new(origin: MemberId, payload: impl Into<Bytes>) -> Self {
        Self {
            origin,
            payload: payload.into(),
        }
    }
}

/// Commands sent to a room coordinator through its channel.
pub(crate) enum RoomCommand {
    /// Record a freshly minted member in the admitted roster.
    Admit {
        member: Member,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Find an admitted member by id.
    Lookup {
        member_id: MemberId,
        reply: oneshot::Sender<Option<Member>>,
    },

    /// Seat a member with its outbound queue.
    Register {
        member: Member,
        outbound: OutboundSender,
    },

    /// Remove a member's seat and close its queue.
    Unregister { member_id: MemberId },

    /// Fan a payload out to every seated member.
    Broadcast(Envelope),

    /// Request a snapshot of the room.
    Info { reply: oneshot::Sender<RoomInfo> },
}

/// A snapshot of room metadata.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    /// The room's code.
    pub code: RoomCode,
    /// Current lifecycle state.
    pub state: RoomState,
    /// Members currently seated (registered and not yet unregistered or
    /// evicted), in no particular order.
    pub members: Vec<MemberId>,
    /// Number of members ever admitted.
    pub admitted: usize,
}

/// Handle to a running room coordinator.
///
/// Cheap to clone: an mpsc sender, the shared started flag, and the shared
/// config. The registry holds one per room and every [`Member`] carries one.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    started: Arc<AtomicBool>,
    config: Arc<HubConfig>,
    sender: mpsc::Sender<RoomCommand>,
}

impl fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHandle")
            .field("code", &self.code)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Returns the hub config this room was created with.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Returns the room's current lifecycle state.
    pub fn state(&self) -> RoomState {
        if self.started.load(Ordering::Acquire) {
            RoomState::Started
        } else {
            RoomState::Open
        }
    }

    /// Moves the room from `Open` to `Started`.
    ///
    /// Returns `true` if this call made the transition, `false` if the
    /// room had already started.
    pub fn start(&self) -> bool {
        let was_started = self.started.swap(true, Ordering::AcqRel);
        if !was_started {
            tracing::info!(room = %self.code, "room started");
        }
        !was_started
    }

    /// Admits a new participant under `name`, before any connection exists.
    ///
    /// # Errors
    /// [`RoomError::NotAdmitted`] once the room has started.
    pub async fn admit(&self, name: impl Into<String>) -> Result<Member, RoomError> {
        if !self.state().is_joinable() {
            return Err(RoomError::NotAdmitted(self.code.clone()));
        }
        let member = Member::new(MemberId::new(), name.into(), self.clone());
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Admit {
            member: member.clone(),
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())??;
        Ok(member)
    }

    /// Looks up a member admitted earlier, e.g. to re-attach it.
    ///
    /// # Errors
    /// [`RoomError::MemberNotFound`] if the room never admitted `member_id`.
    pub async fn get_member(&self, member_id: MemberId) -> Result<Member, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Lookup {
            member_id,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| self.unavailable())?
            .ok_or_else(|| RoomError::MemberNotFound {
                room: self.code.clone(),
                member: member_id,
            })
    }

    /// Submits a registration. A started room closes `outbound` instead of
    /// seating the member.
    pub async fn register(
        &self,
        member: Member,
        outbound: OutboundSender,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Register { member, outbound }).await
    }

    /// Submits an unregistration. Unregistering an absent member is a no-op.
    pub async fn unregister(&self, member_id: MemberId) -> Result<(), RoomError> {
        self.send(RoomCommand::Unregister { member_id }).await
    }

    /// Submits a payload for fan-out to every seated member.
    pub async fn broadcast(&self, envelope: Envelope) -> Result<(), RoomError> {
        self.send(RoomCommand::Broadcast(envelope)).await
    }

    /// Requests a snapshot of the room.
    ///
    /// The snapshot reflects every command submitted before this call.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Info { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.code.clone())
    }
}

/// A seated member: who it is and where its traffic goes.
struct Seat {
    member: Member,
    outbound: OutboundSender,
}

/// The internal coordinator state. Runs inside a Tokio task.
struct RoomCoordinator {
    code: RoomCode,
    started: Arc<AtomicBool>,
    /// Seated members. Dropping a seat closes that member's queue.
    seats: HashMap<MemberId, Seat>,
    /// Everyone ever admitted, so members can be found again before (or
    /// between) connections.
    admitted: HashMap<MemberId, Member>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomCoordinator {
    /// Runs the coordinator loop until every handle is gone.
    async fn run(mut self) {
        tracing::info!(room = %self.code, "room coordinator started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Admit { member, reply } => {
                    let _ = reply.send(self.handle_admit(member));
                }
                RoomCommand::Lookup { member_id, reply } => {
                    let _ = reply.send(self.admitted.get(&member_id).cloned());
                }
                RoomCommand::Register { member, outbound } => {
                    self.handle_register(member, outbound);
                }
                RoomCommand::Unregister { member_id } => {
                    self.handle_unregister(member_id);
                }
                RoomCommand::Broadcast(envelope) => {
                    self.handle_broadcast(envelope);
                }
                RoomCommand::Info { reply } => {
                    let _ = reply.send(self.info());
                }
            }
        }

        tracing::info!(room = %self.code, "room coordinator stopped");
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn handle_admit(&mut self, member: Member) -> Result<(), RoomError> {
        // The handle checked too, but the room may have started since.
        if self.is_started() {
            return Err(RoomError::NotAdmitted(self.code.clone()));
        }
        tracing::info!(
            room = %self.code,
            member = %member.id(),
            name = member.name(),
            "member admitted"
        );
        self.admitted.insert(member.id(), member);
        Ok(())
    }

    fn handle_register(&mut self, member: Member, outbound: OutboundSender) {
        let member_id = member.id();
        if self.is_started() {
            tracing::info!(
                room = %self.code,
                member = %member_id,
                "room started, refusing registration"
            );
            drop(outbound);
            return;
        }

        let replaced = self.seats.insert(member_id, Seat { member, outbound });
        if replaced.is_some() {
            tracing::debug!(room = %self.code, member = %member_id, "replaced stale seat");
        }
        tracing::info!(
            room = %self.code,
            member = %member_id,
            members = self.seats.len(),
            "member registered"
        );
    }

    fn handle_unregister(&mut self, member_id: MemberId) {
        match self.seats.remove(&member_id) {
            Some(seat) => {
                tracing::info!(
                    room = %self.code,
                    member = %member_id,
                    name = seat.member.name(),
                    members = self.seats.len(),
                    "member unregistered"
                );
            }
            None => {
                tracing::trace!(room = %self.code, member = %member_id, "unregister of absent member");
            }
        }
    }

    fn handle_broadcast(&mut self, envelope: Envelope) {
        if !self.seats.contains_key(&envelope.origin) {
            tracing::debug!(
                room = %self.code,
                member = %envelope.origin,
                "payload from unseated member, dropping"
            );
            return;
        }

        tracing::trace!(
            room = %self.code,
            member = %envelope.origin,
            bytes = envelope.payload.len(),
            "broadcast"
        );

        let mut evicted = Vec::new();
        for (member_id, seat) in &self.seats {
            match seat.outbound.try_send(envelope.payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        room = %self.code,
                        member = %member_id,
                        "outbound queue full, evicting slow member"
                    );
                    evicted.push(*member_id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        room = %self.code,
                        member = %member_id,
                        "outbound pump gone, evicting member"
                    );
                    evicted.push(*member_id);
                }
            }
        }

        for member_id in evicted {
            self.seats.remove(&member_id);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            code: self.code.clone(),
            state: if self.is_started() {
                RoomState::Started
            } else {
                RoomState::Open
            },
            members: self.seats.keys().copied().collect(),
            admitted: self.admitted.len(),
        }
    }
}

/// Spawns a new room coordinator task and returns a handle to it.
///
/// The command channel is bounded by `config.inlet_capacity`: submitters
/// wait when it is full, the coordinator never does.
pub(crate) fn spawn_room(code: RoomCode, config: Arc<HubConfig>) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.inlet_capacity);
    let started = Arc::new(AtomicBool::new(false));

    let coordinator = RoomCoordinator {
        code: code.clone(),
        started: Arc::clone(&started),
        seats: HashMap::new(),
        admitted: HashMap::new(),
        receiver: rx,
    };

    tokio::spawn(coordinator.run());

    RoomHandle {
        code,
        started,
        config,
        sender: tx,
    }
}
