//! # Roomhub
//!
//! Real-time rooms over WebSockets.
//!
//! Clients connect, say hello (create a room, join one by its four-letter
//! code, or resume a membership), and from then on every payload they send
//! is relayed to everyone in the room, themselves included. Slow members
//! are evicted rather than allowed to stall the room, and silent
//! connections are dropped after a heartbeat deadline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomhub::prelude::*;
//!
//! # async fn run() -> Result<(), HubError> {
//! let server = HubServer::builder().bind("0.0.0.0:8080").build().await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::HubError;
pub use server::{HubServer, HubServerBuilder};

/// Re-exports for typical server setup and client-side hello handling.
pub mod prelude {
    pub use crate::{HubError, HubServer, HubServerBuilder};
    pub use roomhub_protocol::{
        ClientHello, Codec, JsonCodec, MemberId, RoomCode, ServerHello,
    };
    pub use roomhub_room::{HubConfig, RoomHandle, RoomRegistry, RoomState};
}
