use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use retrochat_core::{RoomConfig, SyncConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub poll_interval: Duration,
    pub min_fetch_gap: Duration,
    pub sweep_interval: Duration,
    pub code_attempts: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let config = Self {
            host: get("RETROCHAT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&get, "RETROCHAT_PORT", 3000)?,
            db_path: PathBuf::from(get("RETROCHAT_DB_PATH").unwrap_or_else(|| "retrochat.db".into())),
            poll_interval: Duration::from_millis(parse(&get, "RETROCHAT_POLL_INTERVAL_MS", 1500)?),
            min_fetch_gap: Duration::from_millis(parse(&get, "RETROCHAT_MIN_FETCH_GAP_MS", 250)?),
            sweep_interval: Duration::from_secs(parse(&get, "RETROCHAT_SWEEP_INTERVAL_SECS", 300)?),
            code_attempts: parse(&get, "RETROCHAT_CODE_ATTEMPTS", 64)?,
        };

        anyhow::ensure!(!config.poll_interval.is_zero(), "RETROCHAT_POLL_INTERVAL_MS must be > 0");
        anyhow::ensure!(!config.sweep_interval.is_zero(), "RETROCHAT_SWEEP_INTERVAL_SECS must be > 0");
        anyhow::ensure!(config.code_attempts > 0, "RETROCHAT_CODE_ATTEMPTS must be > 0");
        Ok(config)
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("bad listen address {}:{}", self.host, self.port))
    }

    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            code_attempts: self.code_attempts,
            ..RoomConfig::default()
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: self.poll_interval,
            min_fetch_gap: self.min_fetch_gap,
            ..SyncConfig::default()
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
