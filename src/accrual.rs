//! Post-request usage accrual.
//!
//! Records a completed request's cost at all three scopes. Accrual is
//! independent of admission (it runs even after a fail-open placeholder) and
//! each increment is best-effort: by the time accrual runs the response has
//! normally already been sent, so a failed increment is logged and swallowed,
//! never retried and never rolled back.

use crate::check::ScopeKeys;
use crate::record::Scope;
use crate::store::QuotaStore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccrualReport {
    pub recorded: u32,
    pub failed: u32,
}

pub async fn accrue(store: &QuotaStore, keys: &ScopeKeys, usd_micros: u64) -> AccrualReport {
    let mut report = AccrualReport::default();
    for scope in Scope::ALL {
        match store.increment(scope, keys.identifier(scope), usd_micros).await {
            Ok(_) => report.recorded += 1,
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    scope = scope.as_str(),
                    identifier = keys.identifier(scope),
                    usd_micros,
                    error = %err,
                    "usage accrual failed, spend not recorded at this scope"
                );
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::memory_store::MemoryBackend;
    use crate::record::UsageRecord;
    use crate::store::{QuotaBackend, StoreUnavailable};

    #[tokio::test]
    async fn accrues_at_all_three_scopes() {
        let store = QuotaStore::new(Arc::new(MemoryBackend::new()));
        let keys = ScopeKeys::new("cred-1", "user-1", "org-1");

        let report = accrue(&store, &keys, 400_000).await;
        assert_eq!(report, AccrualReport { recorded: 3, failed: 0 });

        for scope in Scope::ALL {
            let record = store
                .read(scope, keys.identifier(scope))
                .await
                .expect("read");
            assert_eq!(record.spent_usd_micros, 400_000);
            assert_eq!(record.request_count, 1);
        }
    }

    #[tokio::test]
    async fn one_failing_scope_does_not_stop_the_others() {
        /// Fails writes for user-scope keys only.
        #[derive(Clone, Debug)]
        struct PartialBackend {
            inner: MemoryBackend,
        }

        #[async_trait]
        impl QuotaBackend for PartialBackend {
            async fn load(&self, key: &str) -> Result<Option<UsageRecord>, StoreUnavailable> {
                self.inner.load(key).await
            }

            async fn save(&self, key: &str, record: &UsageRecord) -> Result<(), StoreUnavailable> {
                if key.starts_with("user:") {
                    return Err(StoreUnavailable::new("write refused"));
                }
                self.inner.save(key, record).await
            }
        }

        let backend = PartialBackend {
            inner: MemoryBackend::new(),
        };
        let store = QuotaStore::new(Arc::new(backend));
        let keys = ScopeKeys::new("cred-1", "user-1", "org-1");

        let report = accrue(&store, &keys, 100_000).await;
        assert_eq!(report, AccrualReport { recorded: 2, failed: 1 });

        let credential = store.read(Scope::Credential, "cred-1").await.expect("read");
        let organization = store
            .read(Scope::Organization, "org-1")
            .await
            .expect("read");
        assert_eq!(credential.spent_usd_micros, 100_000);
        assert_eq!(organization.spent_usd_micros, 100_000);
    }
}
