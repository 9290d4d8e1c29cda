// ============================
// crates/backend-lib/src/rooms.rs
// ============================
//! Room state store: maps room ids to live actor handles. Rooms are
//! created lazily by the first join and live until ended. The optional
//! reaper sweeps rooms that have sat empty past a TTL; it never touches
//! a room with members.
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use tracing::{debug, info};

use crate::config::ReaperSettings;
use crate::metrics::{ROOM_CREATED, ROOM_REAPED};
use crate::registry::ConnectionRegistry;
use crate::room_actor::{spawn_room_actor, ActorOptions, RoomHandle};

#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<String, RoomHandle>>,
    opts: ActorOptions,
    registry: ConnectionRegistry,
}

impl RoomManager {
    pub fn new(opts: ActorOptions, registry: ConnectionRegistry) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            opts,
            registry,
        }
    }

    /// Look up a room, spawning it when absent. A handle whose actor
    /// has terminated counts as absent, so a fresh join after `end`
    /// recreates the room.
    pub fn get_or_create(&self, room_id: &str, creator_id: &str) -> RoomHandle {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_closed() {
                    debug!(room_id, "respawning over ended room");
                    let handle =
                        spawn_room_actor(room_id, creator_id, self.opts, self.registry.clone());
                    occupied.insert(handle.clone());
                    counter!(ROOM_CREATED).increment(1);
                    handle
                } else {
                    occupied.get().clone()
                }
            }
            Entry::Vacant(vacant) => {
                info!(room_id, "room created");
                let handle =
                    spawn_room_actor(room_id, creator_id, self.opts, self.registry.clone());
                vacant.insert(handle.clone());
                counter!(ROOM_CREATED).increment(1);
                handle
            }
        }
    }

    /// Look up a live room; ended rooms are pruned on access.
    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        let handle = self.rooms.get(room_id).map(|entry| entry.value().clone())?;
        if handle.is_closed() {
            self.rooms
                .remove_if(room_id, |_, current| current.is_closed());
            return None;
        }
        Some(handle)
    }

    pub fn delete(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    pub fn active_room_ids(&self) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of live rooms. Ended-but-unpruned handles do not count.
    pub fn len(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the background sweep. Call once at startup when enabled.
    pub fn spawn_reaper(&self, settings: ReaperSettings) {
        let manager = self.clone();
        let ttl = Duration::from_secs(settings.empty_room_ttl_secs);
        let interval = Duration::from_secs(settings.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.sweep(ttl).await;
            }
        });
    }

    async fn sweep(&self, ttl: Duration) {
        let ids: Vec<String> = self.rooms.iter().map(|e| e.key().clone()).collect();
        for room_id in ids {
            let Some(handle) = self.rooms.get(&room_id).map(|e| e.value().clone()) else {
                continue;
            };
            match handle.status().await {
                // Actor already gone; drop the stale handle.
                Err(_) => {
                    self.rooms.remove_if(&room_id, |_, h| h.is_closed());
                }
                Ok(status) => {
                    if status.empty_for.is_some_and(|d| d >= ttl) {
                        info!(room_id, "reaping empty room");
                        counter!(ROOM_REAPED).increment(1);
                        self.rooms.remove(&room_id);
                    }
                }
            }
        }
    }
}
