//! Quota store: period-correct usage records over a simple get/put backend.
//!
//! One `QuotaStore` serves all three scopes; the scope only parameterizes the
//! storage key (`{scope}:{identifier}:quota`). Absence is a valid zero-cost
//! state, never a not-found error, and stale-period records are reset lazily
//! by whichever reader observes them first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::record::{Scope, UsageRecord, period_tag_at};

/// The single error kind the quota store raises: the backing store could not
/// be reached, timed out, or returned something unusable.
#[derive(Clone, Debug, Error)]
#[error("quota store unavailable: {reason}")]
pub struct StoreUnavailable {
    pub reason: String,
}

impl StoreUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Storage seam. The baseline contract is plain get/put with no conditional
/// write; `add` is the optional native atomic increment for backends that
/// have one (Redis, SQLite), which `QuotaStore::increment` prefers.
#[async_trait]
pub trait QuotaBackend: Send + Sync + std::fmt::Debug {
    async fn load(&self, key: &str) -> Result<Option<UsageRecord>, StoreUnavailable>;

    async fn save(&self, key: &str, record: &UsageRecord) -> Result<(), StoreUnavailable>;

    /// Atomically add `usd_micros` and one request under `period_tag`,
    /// resetting the record first if it belongs to another period. Returns
    /// `Ok(None)` when the backend has no native atomic increment.
    async fn add(
        &self,
        _key: &str,
        _period_tag: &str,
        _usd_micros: u64,
        _now_ms: u64,
    ) -> Result<Option<UsageRecord>, StoreUnavailable> {
        Ok(None)
    }
}

/// Bound on a single backend operation; an elapsed timeout is the same
/// failure as an unreachable store.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct QuotaStore {
    backend: Arc<dyn QuotaBackend>,
    clock: Arc<dyn Clock>,
    op_timeout: Duration,
}

impl QuotaStore {
    pub fn new(backend: Arc<dyn QuotaBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn storage_key(scope: Scope, identifier: &str) -> String {
        format!("{scope}:{identifier}:quota")
    }

    pub fn current_period_tag(&self) -> String {
        period_tag_at(self.clock.now_epoch_seconds())
    }

    /// A zero record tagged with the current period, as synthesized for
    /// not-yet-seen identities and fail-open placeholders.
    pub fn placeholder_record(&self) -> UsageRecord {
        UsageRecord::zero(self.current_period_tag(), self.clock.now_epoch_millis())
    }

    /// Current, period-correct record for a scope identity. Materializes and
    /// persists a zero record when none exists or the stored one is stale.
    pub async fn read(&self, scope: Scope, identifier: &str) -> Result<UsageRecord, StoreUnavailable> {
        let key = Self::storage_key(scope, identifier);
        let period_tag = self.current_period_tag();

        let stored = self.bounded(self.backend.load(&key)).await?;
        match stored {
            Some(record) if !record.is_stale(&period_tag) => Ok(record),
            _ => {
                let fresh = UsageRecord::zero(period_tag, self.clock.now_epoch_millis());
                self.bounded(self.backend.save(&key, &fresh)).await?;
                Ok(fresh)
            }
        }
    }

    /// Adds `usd_micros` and one request to a scope identity and returns the
    /// updated record.
    pub async fn increment(
        &self,
        scope: Scope,
        identifier: &str,
        usd_micros: u64,
    ) -> Result<UsageRecord, StoreUnavailable> {
        let key = Self::storage_key(scope, identifier);
        let period_tag = self.current_period_tag();
        let now_ms = self.clock.now_epoch_millis();

        if let Some(record) = self
            .bounded(self.backend.add(&key, &period_tag, usd_micros, now_ms))
            .await?
        {
            return Ok(record);
        }

        // Plain get/put path: read-modify-write. Concurrent writers on the
        // same key are last-write-wins here.
        let current = self.read(scope, identifier).await?;
        let updated = current.add(usd_micros, now_ms);
        self.bounded(self.backend.save(&key, &updated)).await?;
        Ok(updated)
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreUnavailable>>,
    ) -> Result<T, StoreUnavailable> {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreUnavailable::new(format!(
                "operation timed out after {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}
