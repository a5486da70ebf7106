use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_DELAY_SECS: u64 = 1;
pub const DEFAULT_RETRY_BUDGET: u8 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub root_path: String,
    pub db_path: String,
    pub queue_backend: QueueBackend,
    pub rocksdb_path: String,
    pub chunk_size: usize,
    pub chunk_delay_secs: u64,
    pub retry_budget: u8,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

/// Where the queue snapshot lives between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Sqlite,
    Memory,
    Rocksdb,
}

/// Knobs the chunked scanner runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    pub retry_budget: u8,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::from_secs(DEFAULT_CHUNK_DELAY_SECS),
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl ScanSettings {
    /// A chunk must make progress and an item must get at least one attempt.
    pub fn normalized(self) -> Self {
        Self {
            chunk_size: self.chunk_size.max(1),
            chunk_delay: self.chunk_delay,
            retry_budget: self.retry_budget.max(1),
        }
    }
}

impl AppConfig {
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            chunk_size: self.chunk_size,
            chunk_delay: Duration::from_secs(self.chunk_delay_secs),
            retry_budget: self.retry_budget,
        }
        .normalized()
    }
}

/// Defaults, then `Config.toml` if present, then `TREECLOSURE_*` variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .set_default("root_path", ".")?
        .set_default("db_path", "treeclosure.db")?
        .set_default("queue_backend", "sqlite")?
        .set_default("rocksdb_path", "treeclosure_queue.rocksdb")?
        .set_default("chunk_size", DEFAULT_CHUNK_SIZE as i64)?
        .set_default("chunk_delay_secs", DEFAULT_CHUNK_DELAY_SECS as i64)?
        .set_default("retry_budget", DEFAULT_RETRY_BUDGET as i64)?
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("TREECLOSURE")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
