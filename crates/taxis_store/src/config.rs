use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use taxis_core::{TaxisError, TaxisResult};

/// URL schemes the relational store accepts, mapped to backend names.
const SUPPORTED_SCHEMES: [(&str, &str); 4] = [
    ("sqlite:", "sqlite"),
    ("postgres:", "postgres"),
    ("postgresql:", "postgres"),
    ("mysql:", "mysql"),
];

/// Pool sizing. Attribute writes are short transactions, so a small pool
/// with a bounded acquire wait is enough; raise `max_connections` when many
/// entities are ingested concurrently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub idle_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout_ms: 5_000,
            idle_timeout_ms: None,
        }
    }
}

/// Connection settings for the relational backend. The URL scheme selects
/// the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxisConfig {
    pub database_url: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl TaxisConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: PoolConfig::default(),
        }
    }

    /// File-backed sqlite database, created on first open.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self::new(format!("sqlite://{}?mode=rwc", path.as_ref().display()))
    }

    /// Backend selected by the URL scheme, or a validation error for
    /// anything the store cannot drive.
    pub fn backend_name(&self) -> TaxisResult<&'static str> {
        SUPPORTED_SCHEMES
            .iter()
            .find(|(scheme, _)| self.database_url.starts_with(scheme))
            .map(|(_, name)| *name)
            .ok_or_else(|| {
                TaxisError::validation(format!(
                    "unsupported database url '{}'",
                    self.database_url
                ))
            })
    }

    /// Reads the config file at `path`. On first run the file is seeded
    /// with a sqlite database at `default_sqlite` and the seeded config is
    /// returned.
    pub fn load_or_init(path: &Path, default_sqlite: &Path) -> TaxisResult<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let config: TaxisConfig = serde_json::from_str(&raw).map_err(|err| {
                    TaxisError::validation(format!("parse {}: {err}", path.display()))
                })?;
                config.backend_name()?;
                Ok(config)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let config = Self::sqlite(default_sqlite);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|err| {
                        TaxisError::storage(format!("create {}: {err}", parent.display()))
                    })?;
                }
                let payload = serde_json::to_string_pretty(&config)
                    .map_err(|err| TaxisError::storage(format!("serialize config: {err}")))?;
                fs::write(path, payload).map_err(|err| {
                    TaxisError::storage(format!("write {}: {err}", path.display()))
                })?;
                Ok(config)
            }
            Err(err) => Err(TaxisError::storage(format!(
                "read {}: {err}",
                path.display()
            ))),
        }
    }
}
