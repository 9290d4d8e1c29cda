// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Room coordination engine for multi-party meetings: ephemeral
//! per-room state, role-based moderation, admission workflow,
//! connection-negotiation relay and room-scoped broadcasts over
//! WebSocket.
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod room;
pub mod room_actor;
pub mod rooms;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::registry::ConnectionRegistry;
use crate::room_actor::ActorOptions;
use crate::rooms::RoomManager;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomManager,
    pub registry: ConnectionRegistry,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let opts = ActorOptions {
            relay_unicast: settings.relay_unicast,
        };
        let registry = ConnectionRegistry::new();
        Self {
            rooms: RoomManager::new(opts, registry.clone()),
            registry,
            settings: Arc::new(settings),
        }
    }
}
