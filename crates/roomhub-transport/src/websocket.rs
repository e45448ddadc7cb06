//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};

use crate::{
    Connection, ConnectionId, ConnectionReader, ConnectionWriter, Incoming,
    PendingConnection, Transport, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A tungstenite config that refuses frames and messages above `limit`.
///
/// The check happens on the frame header, so an oversized payload is never
/// read into memory.
pub fn limited_config(limit: usize) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(limit))
        .max_frame_size(Some(limit))
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: Option<WebSocketConfig>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            config: None,
        })
    }

    /// Caps inbound frames and messages at `limit` bytes.
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.config = Some(limited_config(limit));
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Pending = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let pending = PendingWebSocket {
            id: next_connection_id(),
            stream,
            addr,
            config: self.config,
        };
        tracing::debug!(conn_id = %pending.id, %addr, "accepted TCP peer");
        Ok(pending)
    }
}

/// A TCP peer that has not sent its WebSocket upgrade request yet.
pub struct PendingWebSocket {
    id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    config: Option<WebSocketConfig>,
}

impl PendingWebSocket {
    /// The remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl PendingConnection for PendingWebSocket {
    type Connection = WebSocketConnection<TcpStream>;

    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn upgrade(self) -> Result<Self::Connection, TransportError> {
        let ws = upgrade(self.stream, self.config).await?;
        tracing::debug!(conn_id = %self.id, addr = %self.addr, "upgraded to WebSocket");
        Ok(WebSocketConnection { id: self.id, ws })
    }
}

async fn upgrade<S>(
    stream: S,
    config: Option<WebSocketConfig>,
) -> Result<WebSocketStream<S>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio_tungstenite::accept_async_with_config(stream, config)
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })
}

/// A single WebSocket connection over any byte stream.
///
/// Production connections run over TCP; tests run them over
/// `tokio::io::duplex` pipes.
pub struct WebSocketConnection<S = TcpStream> {
    id: ConnectionId,
    ws: WebSocketStream<S>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Performs the server side of the WebSocket upgrade on `stream`.
    pub async fn accept(
        stream: S,
        config: Option<WebSocketConfig>,
    ) -> Result<Self, TransportError> {
        let ws = upgrade(stream, config).await?;
        Ok(Self::from_stream(ws))
    }

    /// Wraps a stream that has already been upgraded elsewhere.
    pub fn from_stream(ws: WebSocketStream<S>) -> Self {
        Self {
            id: next_connection_id(),
            ws,
        }
    }
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WebSocketReader<S>;
    type Writer = WebSocketWriter<S>;

    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.ws.send(to_message(data)).await.map_err(send_failed)
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Bytes::copy_from_slice(text.as_bytes())));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => return Err(receive_failed(e)),
            }
        }
    }

    async fn close(mut self) -> Result<(), TransportError> {
        self.ws.close(None).await.map_err(send_failed)
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.ws.split();
        let (release, released) = watch::channel(());
        (
            WebSocketReader {
                id: self.id,
                stream,
                released,
            },
            WebSocketWriter {
                id: self.id,
                sink,
                _release: release,
            },
        )
    }
}

/// Read half of a [`WebSocketConnection`].
pub struct WebSocketReader<S = TcpStream> {
    id: ConnectionId,
    stream: SplitStream<WebSocketStream<S>>,
    released: watch::Receiver<()>,
}

impl<S> WebSocketReader<S> {
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<S> ConnectionReader for WebSocketReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        let msg = tokio::select! {
            biased;
            // The writer never publishes a value, so this only resolves
            // once it has been dropped.
            _ = self.released.changed() => {
                tracing::trace!(conn_id = %self.id, "writer released connection");
                return Ok(None);
            }
            msg = self.stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Binary(data))) => Ok(Some(Incoming::Payload(data))),
            Some(Ok(Message::Text(text))) => Ok(Some(Incoming::Payload(
                Bytes::copy_from_slice(text.as_bytes()),
            ))),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                Ok(Some(Incoming::Liveness))
            }
            // A raw frame never surfaces on read; count it as activity.
            Some(Ok(Message::Frame(_))) => Ok(Some(Incoming::Liveness)),
            Some(Ok(Message::Close(_))) | None => Ok(None),
            Some(Err(e)) => Err(receive_failed(e)),
        }
    }
}

/// Write half of a [`WebSocketConnection`].
///
/// Dropping it releases the connection for the paired reader.
pub struct WebSocketWriter<S = TcpStream> {
    id: ConnectionId,
    sink: SplitSink<WebSocketStream<S>, Message>,
    _release: watch::Sender<()>,
}

impl<S> WebSocketWriter<S> {
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<S> ConnectionWriter for WebSocketWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.sink.send(to_message(data)).await.map_err(send_failed)
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(send_failed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Closing the sink queues a close frame and flushes it.
        SinkExt::close(&mut self.sink).await.map_err(send_failed)
    }
}

/// UTF-8 payloads travel as text frames so browsers receive strings;
/// anything else goes out as binary.
fn to_message(data: Bytes) -> Message {
    match Utf8Bytes::try_from(data.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(data),
    }
}

fn send_failed(e: WsError) -> TransportError {
    TransportError::SendFailed(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        e,
    ))
}

fn receive_failed(e: WsError) -> TransportError {
    if let WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) = e {
        return TransportError::MessageTooLarge {
            size,
            limit: max_size,
        };
    }
    TransportError::ReceiveFailed(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        e,
    ))
}
