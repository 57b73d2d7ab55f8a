//! Server configuration loaded from the environment.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` reads this once at startup (after `dotenvy` has loaded `.env`).
//! Every knob has a default except `DATABASE_URL`, which is only required
//! when the Postgres store is selected.

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BOARD_LAYER_COUNT: usize = 3;
/// Layer documents embed their elements; 16 MiB mirrors a document-store ceiling.
const DEFAULT_LAYER_MAX_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which layer store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Layers pre-allocated for every new board.
    pub board_layer_count: usize,
    /// Ceiling for one layer's serialized element array.
    pub layer_max_bytes: usize,
    /// Outbound frame queue per websocket client.
    pub client_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store: StoreKind::Memory,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            board_layer_count: DEFAULT_BOARD_LAYER_COUNT,
            layer_max_bytes: DEFAULT_LAYER_MAX_BYTES,
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// # Errors
    ///
    /// Returns an error if `STORE` is not `postgres`/`memory`, if the Postgres
    /// store is selected without `DATABASE_URL`, or if the layer count or the
    /// client channel capacity is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests don't touch process env.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store = match lookup("STORE").as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(ConfigError::Invalid { key: "STORE", value: other.to_owned() }),
        };

        let database_url = lookup("DATABASE_URL");
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let board_layer_count = parse_or(&lookup, "BOARD_LAYER_COUNT", DEFAULT_BOARD_LAYER_COUNT);
        if board_layer_count == 0 {
            return Err(ConfigError::Invalid { key: "BOARD_LAYER_COUNT", value: "0".into() });
        }

        // `mpsc::channel` panics on a zero capacity.
        let client_channel_capacity =
            parse_or(&lookup, "CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY);
        if client_channel_capacity == 0 {
            return Err(ConfigError::Invalid { key: "CLIENT_CHANNEL_CAPACITY", value: "0".into() });
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            store,
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            board_layer_count,
            layer_max_bytes: parse_or(&lookup, "LAYER_MAX_BYTES", DEFAULT_LAYER_MAX_BYTES),
            client_channel_capacity,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
