//! Runtime configuration for the ledger
use backon::{BackoffBuilder, ExponentialBuilder};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables with this prefix override file values, e.g.
/// `RFQ_LEDGER__MAX_SEQUENCE_RETRIES=3`.
pub const CONFIG_ENV_PREFIX: &str = "RFQ_LEDGER";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory of the sled database.
    pub db_path: PathBuf,
    /// Attempts made to claim the next version/response/history sequence number before a
    /// conflict is reported to the caller.
    pub max_sequence_retries: usize,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("rfq-ledger.db"),
            max_sequence_retries: 8,
            retry_min_delay_ms: 1,
            retry_max_delay_ms: 50,
        }
    }
}

impl LedgerConfig {
    /// Layers an optional YAML file under `RFQ_LEDGER__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn open_db(&self) -> sled::Result<sled::Db> {
        sled::open(&self.db_path)
    }

    /// In-memory database that disappears on drop.
    pub fn temporary() -> sled::Result<sled::Db> {
        sled::Config::new().temporary(true).open()
    }

    /// Backoff between sequence claim attempts. Allows `max_sequence_retries - 1` retries so
    /// the total number of attempts equals `max_sequence_retries`.
    pub fn retry_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.retry_min_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry_max_delay_ms))
            .with_max_times(self.max_sequence_retries.saturating_sub(1))
            .with_jitter()
    }

    pub fn retry_delays(&self) -> impl Iterator<Item = Duration> {
        self.retry_backoff().build()
    }
}
