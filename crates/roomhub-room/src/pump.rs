//! The two per-connection tasks.
//!
//! The inbound pump reads frames and submits them to the room; the outbound
//! pump drains the member's queue onto the wire and sends liveness probes.
//! Each is the only task touching its half of the connection. Whichever
//! side fails first brings the other down:
//!
//! - inbound exits → unregisters → the room drops the queue → outbound
//!   sees the queue close, sends a close frame and exits.
//! - outbound exits → drops the writer → the reader reports closed →
//!   inbound exits and unregisters.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use roomhub_protocol::MemberId;
use roomhub_transport::{
    ConnectionId, ConnectionReader, ConnectionWriter, Incoming, TransportError,
};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{Envelope, HubConfig, Member, OutboundReceiver};

/// Separator placed between payloads coalesced into one frame.
const NEWLINE: u8 = b'\n';

/// Why a pump stopped.
#[derive(Debug)]
enum Hangup {
    /// The peer closed the connection, or the writer half was released.
    Closed,
    ReadFailed(TransportError),
    /// Nothing arrived within `pong_wait`.
    DeadlineElapsed,
    Oversized(usize),
    RoomUnavailable,
    /// The room dropped the queue: unregistered, evicted, or refused.
    QueueClosed,
    WriteFailed(TransportError),
    WriteTimedOut,
}

impl fmt::Display for Hangup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
            Self::DeadlineElapsed => write!(f, "read deadline elapsed"),
            Self::Oversized(len) => write!(f, "message of {len} bytes over the limit"),
            Self::RoomUnavailable => write!(f, "room unavailable"),
            Self::QueueClosed => write!(f, "outbound queue closed"),
            Self::WriteFailed(e) => write!(f, "write failed: {e}"),
            Self::WriteTimedOut => write!(f, "write deadline elapsed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Reads frames until the connection ends, then unregisters the member.
pub(crate) async fn inbound<R: ConnectionReader>(
    mut reader: R,
    member: Member,
    conn_id: ConnectionId,
    config: HubConfig,
) {
    let hangup = read_loop(&mut reader, &member, &config).await;
    log_hangup("inbound", member.id(), conn_id, &hangup);

    // Submit the unregister before releasing, so a re-attach can never
    // register ahead of it.
    if member.room().unregister(member.id()).await.is_err() {
        tracing::debug!(member = %member.id(), "room gone before unregister");
    }
    member.release(conn_id);
}

async fn read_loop<R: ConnectionReader>(
    reader: &mut R,
    member: &Member,
    config: &HubConfig,
) -> Hangup {
    loop {
        // Every frame, liveness or payload, pushes the deadline out.
        let frame = match time::timeout(config.pong_wait, reader.recv()).await {
            Err(_) => return Hangup::DeadlineElapsed,
            Ok(Err(TransportError::MessageTooLarge { size, .. })) => {
                return Hangup::Oversized(size);
            }
            Ok(Err(e)) => return Hangup::ReadFailed(e),
            Ok(Ok(None)) => return Hangup::Closed,
            Ok(Ok(Some(frame))) => frame,
        };

        let payload = match frame {
            Incoming::Liveness => {
                tracing::trace!(member = %member.id(), "liveness frame");
                continue;
            }
            Incoming::Payload(payload) => payload,
        };

        // The transport normally refuses these before buffering them.
        if payload.len() > config.max_message_size {
            return Hangup::Oversized(payload.len());
        }

        let envelope = Envelope::new(member.id(), payload);
        if member.room().broadcast(envelope).await.is_err() {
            return Hangup::RoomUnavailable;
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Drains the member's queue onto the wire and probes the peer every
/// `ping_period`. Exits when the queue closes or a write fails.
pub(crate) async fn outbound<W: ConnectionWriter>(
    mut writer: W,
    mut queue: OutboundReceiver,
    member_id: MemberId,
    conn_id: ConnectionId,
    config: HubConfig,
) {
    let hangup = write_loop(&mut writer, &mut queue, &config).await;
    log_hangup("outbound", member_id, conn_id, &hangup);

    if matches!(hangup, Hangup::QueueClosed) {
        match time::timeout(config.write_wait, writer.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(conn_id = %conn_id, error = %e, "close frame failed"),
            Err(_) => tracing::debug!(conn_id = %conn_id, "close frame timed out"),
        }
    }
    // Dropping the writer here releases the reader.
}

async fn write_loop<W: ConnectionWriter>(
    writer: &mut W,
    queue: &mut OutboundReceiver,
    config: &HubConfig,
) -> Hangup {
    let period = config.ping_period();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = queue.recv() => {
                let Some(first) = message else {
                    return Hangup::QueueClosed;
                };
                let frame = coalesce(first, queue);
                if let Err(hangup) = deadline(config, writer.send(frame)).await {
                    return hangup;
                }
            }
            _ = ticker.tick() => {
                if let Err(hangup) = deadline(config, writer.ping()).await {
                    return hangup;
                }
            }
        }
    }
}

/// Joins `first` with whatever else is already queued into one
/// newline-separated frame.
///
/// Only messages present when called are taken, so a busy room cannot keep
/// the pump from writing.
fn coalesce(first: Bytes, queue: &mut OutboundReceiver) -> Bytes {
    let pending = queue.len();
    if pending == 0 {
        return first;
    }

    let mut frame = BytesMut::from(&first[..]);
    for _ in 0..pending {
        match queue.try_recv() {
            Ok(next) => {
                frame.put_u8(NEWLINE);
                frame.extend_from_slice(&next);
            }
            Err(_) => break,
        }
    }
    frame.freeze()
}

async fn deadline(
    config: &HubConfig,
    write: impl Future<Output = Result<(), TransportError>>,
) -> Result<(), Hangup> {
    match time::timeout(config.write_wait, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Hangup::WriteFailed(e)),
        Err(_) => Err(Hangup::WriteTimedOut),
    }
}

fn log_hangup(pump: &'static str, member: MemberId, conn: ConnectionId, hangup: &Hangup) {
    match hangup {
        Hangup::Closed | Hangup::QueueClosed => {
            tracing::debug!(pump, %member, conn_id = %conn, reason = %hangup, "pump stopped");
        }
        _ => {
            tracing::warn!(pump, %member, conn_id = %conn, reason = %hangup, "pump stopped");
        }
    }
}
