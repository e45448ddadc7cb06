//! Room registry: mints room codes and maps them to running rooms.

use std::collections::HashMap;
use std::sync::Arc;

use roomhub_protocol::RoomCode;
use tokio::sync::RwLock;

use crate::room::spawn_room;
use crate::{HubConfig, RoomError, RoomHandle, RoomInfo};

/// Tracks every room in the hub by code.
///
/// Shared across connection handlers behind an `Arc`. Lookups take a read
/// lock and run concurrently; creation takes the write lock so that picking
/// a free code and inserting the room happen as one step.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomCode, RoomHandle>>,
    config: Arc<HubConfig>,
}

impl RoomRegistry {
    /// Creates an empty registry. Out-of-range config values are clamped.
    pub fn new(config: HubConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config: Arc::new(config.validated()),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Creates a room under a fresh random code and starts its coordinator.
    ///
    /// # Errors
    /// [`RoomError::CodeSpaceExhausted`] if `max_code_attempts` draws all
    /// hit existing rooms.
    pub async fn create_room(&self) -> Result<RoomHandle, RoomError> {
        self.create_room_with(|| RoomCode::random(&mut rand::rng()))
            .await
    }

    async fn create_room_with(
        &self,
        mut next_code: impl FnMut() -> RoomCode,
    ) -> Result<RoomHandle, RoomError> {
        let mut rooms = self.rooms.write().await;
        let attempts = self.config.max_code_attempts;

        for attempt in 1..=attempts {
            let code = next_code();
            if rooms.contains_key(&code) {
                tracing::debug!(%code, attempt, "room code taken, retrying");
                continue;
            }

            let handle = spawn_room(code.clone(), Arc::clone(&self.config));
            rooms.insert(code.clone(), handle.clone());
            tracing::info!(%code, rooms = rooms.len(), "room created");
            return Ok(handle);
        }

        tracing::error!(attempts, rooms = rooms.len(), "no free room code");
        Err(RoomError::CodeSpaceExhausted { attempts })
    }

    /// Looks up a room by code.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no room has that code.
    pub async fn get_room(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Snapshots every room that still admits members.
    ///
    /// Rooms whose coordinator fails to answer are skipped.
    pub async fn list_open_rooms(&self) -> Vec<RoomInfo> {
        // Clone the handles out so no lock is held while rooms answer.
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            if !handle.state().is_joinable() {
                continue;
            }
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_codes(&self) -> Vec<RoomCode> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
