//! Rooms for Roomhub.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! membership and fans every payload out to every member. Each attached
//! connection gets two more tasks: an inbound pump feeding the room and an
//! outbound pump draining the member's queue.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — mints room codes, finds rooms by code
//! - [`RoomHandle`] — submit commands to a running room
//! - [`Member`] — a participant; [`attach`](Member::attach) binds a connection
//! - [`HubConfig`] — queue sizes, size limit, heartbeat timings
//! - [`RoomState`] — lifecycle state machine

mod config;
mod error;
mod member;
mod pump;
mod registry;
mod room;

pub use config::{HubConfig, RoomState};
pub use error::RoomError;
pub use member::{ConnectionState, Member, Pumps};
pub use registry::RoomRegistry;
pub use room::{Envelope, OutboundReceiver, OutboundSender, RoomHandle, RoomInfo};
