// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Relay offer/answer/ice to the addressed peer only instead of
    /// fanning out to the whole room
    pub relay_unicast: bool,
    /// Empty-room reaper
    pub reaper: ReaperSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperSettings {
    /// Sweep rooms that have been empty for longer than the TTL
    pub enabled: bool,
    /// How long a room may sit empty before it is removed
    pub empty_room_ttl_secs: u64,
    /// Time between sweeps
    pub sweep_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            log_level: "info".to_string(),
            relay_unicast: false,
            reaper: ReaperSettings::default(),
        }
    }
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            empty_room_ttl_secs: 60 * 10,
            sweep_interval_secs: 30,
        }
    }
}

/// Load settings from `huddle.toml` and `HUDDLE_`-prefixed env vars,
/// layered over the defaults.
pub fn load_settings() -> Result<Settings> {
    load_from("huddle.toml")
}

/// Same as [`load_settings`] with an explicit config file path.
pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let settings = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed("HUDDLE_").split("__"))
        .extract()?;
    Ok(settings)
}
