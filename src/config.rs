//! Process configuration.
//!
//! DESIGN
//! ======
//! Process-level settings (data directory, ports, replay policy) come from
//! `clap` flags with environment fallbacks. Per-component tuning knobs live
//! next to the component that uses them and are read with [`env_parse`],
//! which falls back to the default when a variable is unset or unparsable.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::services::collector::ReplayScope;

/// Command-line and environment settings for the whole process.
#[derive(Parser, Debug, Clone)]
#[command(name = "inkhub", about = "Realtime sync server for a shared drawing canvas")]
pub struct Config {
    /// Base data directory. The event log lives in `message/`, assets in `vector/`.
    #[arg(short = 'd', long, env = "INKHUB_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Port for the websocket message service.
    #[arg(long, env = "INKHUB_MESSAGE_PORT", default_value_t = 9300)]
    pub message_port: u16,

    /// Port for the vector asset service.
    #[arg(long, env = "INKHUB_ASSET_PORT", default_value_t = 9200)]
    pub asset_port: u16,

    /// History sent to a client when it joins.
    #[arg(long, env = "INKHUB_REPLAY_SCOPE", value_enum, default_value_t = ReplayScope::SinceLastClear)]
    pub replay_scope: ReplayScope,

    /// Grace period for each shutdown step, in seconds.
    #[arg(long, env = "INKHUB_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,
}

impl Config {
    #[must_use]
    pub fn message_dir(&self) -> PathBuf {
        self.data_dir.join("message")
    }

    #[must_use]
    pub fn asset_dir(&self) -> PathBuf {
        self.data_dir.join("vector")
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
