//! Transport abstraction layer for Roomhub.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network protocol carrying room traffic. A connection is used whole
//! during the join handshake, then [split](Connection::split) into a
//! [`ConnectionReader`] and a [`ConnectionWriter`] so the inbound and
//! outbound pumps can run independently.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingWebSocket, WebSocketConnection, WebSocketReader, WebSocketTransport,
    WebSocketWriter, limited_config,
};

use std::fmt;
use std::future::Future;

use bytes::Bytes;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something read off a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// An application payload.
    Payload(Bytes),
    /// A protocol-level liveness frame (ping or pong). Carries no data but
    /// proves the peer is still there.
    Liveness,
}

/// Accepts new incoming connections.
///
/// `accept` only takes the peer off the listener. The protocol handshake
/// runs later through [`PendingConnection::upgrade`], so the caller can do
/// it off the accept loop and under its own deadline.
pub trait Transport: Send + Sync + 'static {
    /// The not-yet-upgraded peer produced by this transport.
    type Pending: PendingConnection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming peer.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// A peer accepted at the socket level whose handshake has not run yet.
pub trait PendingConnection: Send + 'static {
    /// The connection produced once the handshake completes.
    type Connection: Connection;

    /// Identifier the upgraded connection will carry.
    fn id(&self) -> ConnectionId;

    /// Runs the protocol handshake.
    fn upgrade(
        self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single bidirectional connection.
///
/// The whole connection is used for request/reply exchanges before a member
/// is attached; afterwards it is split into independently owned halves.
pub trait Connection: Send + 'static {
    /// Read half produced by [`split`](Self::split).
    type Reader: ConnectionReader;
    /// Write half produced by [`split`](Self::split).
    type Writer: ConnectionWriter;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Sends one payload to the remote peer.
    fn send(
        &mut self,
        data: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next application payload, skipping liveness frames.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;

    /// Sends a close frame and shuts the connection down.
    fn close(self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Splits the connection into its read and write halves.
    ///
    /// Dropping the writer releases the connection: the reader reports it
    /// as closed from then on.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// The read half of a split [`Connection`].
pub trait ConnectionReader: Send + 'static {
    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is closed, either by the peer
    /// or because the writer half was released.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Incoming>, TransportError>> + Send;
}

/// The write half of a split [`Connection`].
pub trait ConnectionWriter: Send + 'static {
    /// Sends one frame of payload data.
    fn send(
        &mut self,
        data: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a liveness probe.
    fn ping(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a close frame and flushes it.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
