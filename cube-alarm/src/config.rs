//! Daemon configuration.
//!
//! Every setting comes from an environment variable and has a default, so a
//! bare `cube-alarmd` starts an API with no cube link. Values that are set
//! but unparsable are startup errors rather than silently ignored.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_API_ADDR: &str = "CUBE_ALARM_API_ADDR";
pub const ENV_STORE: &str = "CUBE_ALARM_STORE";
pub const ENV_SOUND: &str = "CUBE_ALARM_SOUND";
pub const ENV_PLAYER: &str = "CUBE_ALARM_PLAYER";
pub const ENV_CUBE_ADDRESS: &str = "CUBE_ALARM_CUBE_ADDRESS";
pub const ENV_BRIDGE_PORT: &str = "CUBE_ALARM_BRIDGE_PORT";
pub const ENV_AUTO_CONNECT: &str = "CUBE_ALARM_AUTO_CONNECT";
pub const ENV_TICK_MS: &str = "CUBE_ALARM_TICK_MS";

const DEFAULT_STORE: &str = "alarms.json";
const DEFAULT_SOUND: &str = "sounds/alarm.wav";
const DEFAULT_PLAYER: &str = "aplay";
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Ticks longer than a minute could skip a matching minute entirely.
const MAX_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Listen address of the HTTP API and push channel.
    pub api_addr: SocketAddr,

    /// File holding the alarm definitions.
    pub store_path: PathBuf,

    /// Alarm sound asset. `None` suppresses playback.
    pub sound: Option<PathBuf>,

    /// External program used to play the sound asset.
    pub player: String,

    /// Wireless address of the cube. Without it the bridge picks the first
    /// cube it discovers.
    pub cube_address: Option<String>,

    /// Serial port of the radio bridge. Without it the cube link stays down.
    pub bridge_port: Option<String>,

    /// Bring the cube link up at startup.
    pub auto_connect: bool,

    /// Scheduler tick period.
    pub tick: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], 5001)),
            store_path: PathBuf::from(DEFAULT_STORE),
            sound: Some(PathBuf::from(DEFAULT_SOUND)),
            player: DEFAULT_PLAYER.to_string(),
            cube_address: None,
            bridge_port: None,
            auto_connect: true,
            tick: DEFAULT_TICK,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_addr = match lookup(ENV_API_ADDR) {
            Some(value) => value.parse().map_err(|e: std::net::AddrParseError| {
                invalid(ENV_API_ADDR, &value, e.to_string())
            })?,
            None => defaults.api_addr,
        };

        let store_path = lookup(ENV_STORE)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.store_path);

        // An explicitly empty sound suppresses playback.
        let sound = match lookup(ENV_SOUND) {
            Some(value) if value.is_empty() => None,
            Some(value) => Some(PathBuf::from(value)),
            None => defaults.sound,
        };

        let player = lookup(ENV_PLAYER)
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.player);

        let cube_address = lookup(ENV_CUBE_ADDRESS).filter(|v| !v.is_empty());
        let bridge_port = lookup(ENV_BRIDGE_PORT).filter(|v| !v.is_empty());

        let auto_connect = match lookup(ENV_AUTO_CONNECT) {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| invalid(ENV_AUTO_CONNECT, &value, "expected true or false"))?,
            None => defaults.auto_connect,
        };

        let tick = match lookup(ENV_TICK_MS) {
            Some(value) => {
                let ms: u64 = value.parse().map_err(|e: std::num::ParseIntError| {
                    invalid(ENV_TICK_MS, &value, e.to_string())
                })?;
                let tick = Duration::from_millis(ms);
                if tick.is_zero() || tick > MAX_TICK {
                    return Err(invalid(ENV_TICK_MS, &value, "must be between 1 and 60000"));
                }
                tick
            }
            None => defaults.tick,
        };

        Ok(Self {
            api_addr,
            store_path,
            sound,
            player,
            cube_address,
            bridge_port,
            auto_connect,
            tick,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
