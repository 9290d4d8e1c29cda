// ============================
// crates/backend-lib/src/metrics.rs
// ============================
//! Central place for metric keys.
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_MALFORMED: &str = "ws.malformed";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_JOINED: &str = "room.joined";
pub const ROOM_ENDED: &str = "room.ended";
pub const ROOM_REAPED: &str = "room.reaped";
pub const CMD_IGNORED: &str = "command.ignored";
pub const BROADCAST_DROPPED: &str = "broadcast.dropped";
