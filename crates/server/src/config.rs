//! Runtime configuration from the environment.

use std::env;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "data/draft_rooms.sqlite";
const DEFAULT_SAVE_INTERVAL_SECS: u64 = 5;

/// Server settings, all overridable via environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port (`PORT`).
    pub port: u16,
    /// SQLite path for the room store (`DRAFTDEN_DB`).
    pub db_path: String,
    /// Seconds between room snapshot passes (`DRAFTDEN_SAVE_INTERVAL_SECS`).
    pub save_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            port: env_parsed("PORT").unwrap_or(DEFAULT_PORT),
            db_path: env::var("DRAFTDEN_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            save_interval_secs: env_parsed("DRAFTDEN_SAVE_INTERVAL_SECS")
                .unwrap_or(DEFAULT_SAVE_INTERVAL_SECS),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
