//! Engine configuration.
//!
//! TOML-deserialized, with defaults chosen for safety: memory store,
//! 50 ms operation bound, fail-closed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::QuotaEngine;
use crate::memory_store::MemoryBackend;
use crate::policy::FailureMode;
use crate::pricing::PricingTable;
use crate::store::{QuotaBackend, QuotaStore};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Redis { url: String },
    Sqlite { path: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default)]
    pub default_failure_mode: FailureMode,
}

fn default_op_timeout_ms() -> u64 {
    50
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            op_timeout_ms: default_op_timeout_ms(),
            default_failure_mode: FailureMode::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse config failed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("store backend '{kind}' requires the '{feature}' feature")]
    StoreFeatureDisabled {
        kind: &'static str,
        feature: &'static str,
    },
    #[error("invalid store configuration: {reason}")]
    Store { reason: String },
}

impl QuotaConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn build_backend(&self) -> Result<Arc<dyn QuotaBackend>, ConfigError> {
        match &self.store {
            StoreConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
            StoreConfig::Redis { url } => {
                #[cfg(feature = "store-redis")]
                {
                    let backend = crate::redis_store::RedisQuotaBackend::new(url)
                        .map_err(|err| ConfigError::Store {
                            reason: err.to_string(),
                        })?;
                    Ok(Arc::new(backend))
                }
                #[cfg(not(feature = "store-redis"))]
                {
                    let _ = url;
                    Err(ConfigError::StoreFeatureDisabled {
                        kind: "redis",
                        feature: "store-redis",
                    })
                }
            }
            StoreConfig::Sqlite { path } => {
                #[cfg(feature = "store-sqlite")]
                {
                    Ok(Arc::new(crate::sqlite_store::SqliteQuotaBackend::new(
                        path.clone(),
                    )))
                }
                #[cfg(not(feature = "store-sqlite"))]
                {
                    let _ = path;
                    Err(ConfigError::StoreFeatureDisabled {
                        kind: "sqlite",
                        feature: "store-sqlite",
                    })
                }
            }
        }
    }

    pub fn build_engine(&self, pricing: PricingTable) -> Result<QuotaEngine, ConfigError> {
        let backend = self.build_backend()?;
        let store = QuotaStore::new(backend).with_op_timeout(self.op_timeout());
        Ok(QuotaEngine::with_store(store, pricing))
    }
}
