//! Hub configuration and the room state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// HubConfig
// ---------------------------------------------------------------------------

/// Tunables shared by the registry, every room, and every member pump.
///
/// Override individual fields with struct update syntax:
///
/// ```rust
/// use std::time::Duration;
/// use roomhub_room::HubConfig;
///
/// let config = HubConfig {
///     pong_wait: Duration::from_secs(20),
///     ..HubConfig::default()
/// };
/// assert_eq!(config.ping_period(), Duration::from_secs(18));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Capacity of each member's outbound queue. A member whose queue is
    /// full when a broadcast arrives is evicted.
    pub outbound_capacity: usize,

    /// Capacity of each room's command channel. Pumps wait when it is full;
    /// the room itself never does.
    pub inlet_capacity: usize,

    /// Largest inbound payload, in bytes. Anything bigger closes the
    /// connection.
    pub max_message_size: usize,

    /// How long a connection may stay silent (no data, no ping, no pong)
    /// before it is treated as dead.
    pub pong_wait: Duration,

    /// Deadline for a single write: payload frames, pings, close frames.
    pub write_wait: Duration,

    /// How many random room codes to try before giving up on a create.
    pub max_code_attempts: u32,

    /// How long a new connection has to send its hello.
    pub handshake_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            inlet_capacity: 64,
            max_message_size: 512,
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_code_attempts: 1_000,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl HubConfig {
    /// Interval between liveness probes: nine tenths of
    /// [`pong_wait`](Self::pong_wait), so every read window sees at least
    /// one probe.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`RoomRegistry::new`](crate::RoomRegistry::new). Channel
    /// capacities and the attempt budget must be at least 1, and the
    /// timeouts non-zero.
    pub fn validated(mut self) -> Self {
        if self.outbound_capacity == 0 {
            tracing::warn!("outbound_capacity of 0 is not allowed, using 1");
            self.outbound_capacity = 1;
        }
        if self.inlet_capacity == 0 {
            tracing::warn!("inlet_capacity of 0 is not allowed, using 1");
            self.inlet_capacity = 1;
        }
        self.max_code_attempts = self.max_code_attempts.max(1);
        let floor = Duration::from_millis(10);
        self.pong_wait = self.pong_wait.max(floor);
        self.write_wait = self.write_wait.max(floor);
        self.handshake_timeout = self.handshake_timeout.max(floor);
        self
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Open ──(start)──→ Started
/// ```
///
/// - **Open**: admitting and registering members.
/// - **Started**: membership is fixed. Existing members keep relaying;
///   admissions and registrations are refused. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Open,
    Started,
}

impl RoomState {
    /// Returns `true` if the room accepts new members.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Started => write!(f, "Started"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_config_default() {
        let config = HubConfig::default();
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.max_message_size, 512);
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.write_wait, Duration::from_secs(10));
    }

    #[test]
    fn test_ping_period_is_nine_tenths_of_pong_wait() {
        let config = HubConfig::default();
        assert_eq!(config.ping_period(), Duration::from_secs(54));
        assert!(config.ping_period() < config.pong_wait);
    }

    #[test]
    fn test_validated_clamps_zero_values() {
        let config = HubConfig {
            outbound_capacity: 0,
            inlet_capacity: 0,
            max_code_attempts: 0,
            pong_wait: Duration::ZERO,
            ..HubConfig::default()
        }
        .validated();
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.inlet_capacity, 1);
        assert_eq!(config.max_code_attempts, 1);
        assert!(config.pong_wait > Duration::ZERO);
    }

    #[test]
    fn test_validated_keeps_sane_values() {
        let config = HubConfig::default();
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn test_room_state_is_joinable() {
        assert!(RoomState::Open.is_joinable());
        assert!(!RoomState::Started.is_joinable());
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::Open.to_string(), "Open");
        assert_eq!(RoomState::Started.to_string(), "Started");
    }
}
