//! In-process backend with plain get/put semantics.
//!
//! Records are held as the JSON documents of the persisted layout. This
//! backend deliberately does not implement a native atomic `add`, so it
//! exercises the store's read-modify-write path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::record::UsageRecord;
use crate::store::{QuotaBackend, StoreUnavailable};

#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl QuotaBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<UsageRecord>, StoreUnavailable> {
        let records = self.records.lock().await;
        match records.get(key) {
            None => Ok(None),
            Some(raw) => serde_json::from_str(raw).map(Some).map_err(|err| {
                StoreUnavailable::new(format!("corrupt record at {key}: {err}"))
            }),
        }
    }

    async fn save(&self, key: &str, record: &UsageRecord) -> Result<(), StoreUnavailable> {
        let raw = serde_json::to_string(record)
            .map_err(|err| StoreUnavailable::new(format!("serialize record: {err}")))?;
        self.records.lock().await.insert(key.to_string(), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let backend = MemoryBackend::new();
        let record = UsageRecord {
            spent_usd_micros: 42,
            period_tag: "2025-01".to_string(),
            request_count: 1,
            updated_at_ms: 7,
        };

        backend.save("credential:c:quota", &record).await.expect("save");
        let loaded = backend
            .load("credential:c:quota")
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded, record);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn missing_key_is_absent_not_an_error() {
        let backend = MemoryBackend::new();
        assert!(backend.load("user:u:quota").await.expect("load").is_none());
    }
}
