//! `HubServer` builder and accept loop.
//!
//! This is the entry point for running a Roomhub server. It ties the
//! layers together: transport → handshake → registry → room pumps.

use std::sync::Arc;

use roomhub_protocol::{Codec, JsonCodec};
use roomhub_room::{HubConfig, RoomRegistry};
use roomhub_transport::{PendingConnection, Transport, TransportError, WebSocketTransport};

use crate::HubError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<K: Codec> {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) codec: K,
}

/// Builder for configuring and starting a Roomhub server.
///
/// # Example
///
/// ```rust,no_run
/// use roomhub::prelude::*;
///
/// # async fn run() -> Result<(), HubError> {
/// let server = HubServer::builder()
///     .bind("0.0.0.0:8080")
///     .config(HubConfig::default())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HubServerBuilder {
    bind_addr: String,
    config: HubConfig,
}

impl HubServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: HubConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets queue sizes, limits and heartbeat timings.
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` for hellos and `WebSocketTransport` for traffic.
    pub async fn build(self) -> Result<HubServer, HubError> {
        let registry = Arc::new(RoomRegistry::new(self.config));
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_message_limit(registry.config().max_message_size);

        Ok(HubServer {
            transport,
            state: Arc::new(ServerState {
                registry,
                codec: JsonCodec,
            }),
        })
    }
}

impl Default for HubServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Roomhub server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HubServer<K: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<K>>,
}

impl HubServer {
    /// Creates a new builder.
    pub fn builder() -> HubServerBuilder {
        HubServerBuilder::new()
    }
}

impl<K: Codec> HubServer<K> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry every connection resolves rooms through.
    ///
    /// Shared, so the embedding application can start rooms or inspect
    /// them while the server runs.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming peers and spawns a task for each. The WebSocket
    /// upgrade runs inside that task, so a peer that never finishes it
    /// only holds up itself. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), HubError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Roomhub server running");

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = serve(pending, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Upgrades a freshly accepted peer, then hands it to the handler.
///
/// The upgrade and the hello after it each get `handshake_timeout`.
async fn serve<P, K>(pending: P, state: Arc<ServerState<K>>) -> Result<(), HubError>
where
    P: PendingConnection,
    K: Codec,
{
    let conn_id = pending.id();
    let wait = state.registry.config().handshake_timeout;
    let conn = match tokio::time::timeout(wait, pending.upgrade()).await {
        Ok(conn) => conn?,
        Err(_) => {
            tracing::debug!(%conn_id, "upgrade timed out");
            return Err(TransportError::ConnectionClosed("upgrade timed out".into()).into());
        }
    };
    handle_connection(conn, state).await
}
