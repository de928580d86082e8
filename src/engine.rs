//! Engine facade: store + checker + cost calculator + metrics behind one
//! handle, shared across request tasks.

use std::sync::Arc;
use std::time::Duration;

use crate::accrual::{AccrualReport, accrue};
use crate::check::{AdmissionResult, QuotaChecker, ScopeKeys, ScopeLimits};
use crate::clock::Clock;
use crate::cost::{CostCalculator, RequestShape};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::policy::{FailureMode, PolicyOutcome};
use crate::pricing::PricingTable;
use crate::store::{QuotaBackend, QuotaStore, StoreUnavailable};

/// Everything the engine needs per request, resolved by the request handler:
/// the three scope identities, their limits, and the organization's
/// failure mode.
#[derive(Clone, Debug)]
pub struct AdmissionRequest {
    pub keys: ScopeKeys,
    pub limits: ScopeLimits,
    pub failure_mode: FailureMode,
}

#[derive(Clone)]
pub struct QuotaEngine {
    store: QuotaStore,
    checker: QuotaChecker,
    calculator: CostCalculator,
    metrics: Arc<EngineMetrics>,
}

impl QuotaEngine {
    pub fn new(backend: Arc<dyn QuotaBackend>, pricing: PricingTable) -> Self {
        Self::with_store(QuotaStore::new(backend), pricing)
    }

    pub fn with_store(store: QuotaStore, pricing: PricingTable) -> Self {
        Self {
            checker: QuotaChecker::new(store.clone()),
            store,
            calculator: CostCalculator::new(pricing),
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.rebuild(|store| store.with_clock(clock))
    }

    pub fn with_op_timeout(self, op_timeout: Duration) -> Self {
        self.rebuild(|store| store.with_op_timeout(op_timeout))
    }

    fn rebuild(self, reconfigure: impl FnOnce(QuotaStore) -> QuotaStore) -> Self {
        let store = reconfigure(self.store);
        Self {
            checker: QuotaChecker::new(store.clone()),
            store,
            calculator: self.calculator,
            metrics: self.metrics,
        }
    }

    pub fn store(&self) -> &QuotaStore {
        &self.store
    }

    pub fn calculator(&self) -> &CostCalculator {
        &self.calculator
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Policy-wrapped admission decision. The only error callers see is
    /// `StoreUnavailable`, and only for fail-closed organizations; the
    /// handler translates it into a service-unavailable response.
    pub async fn admit(
        &self,
        request: &AdmissionRequest,
    ) -> Result<PolicyOutcome, StoreUnavailable> {
        self.metrics.record_request();
        match self
            .checker
            .check_with_policy(&request.keys, &request.limits, request.failure_mode)
            .await
        {
            Ok(outcome) => {
                if outcome.degraded {
                    self.metrics.record_store_error();
                    self.metrics.record_fail_open_admission();
                }
                match outcome.result {
                    AdmissionResult::Admitted { .. } => self.metrics.record_admitted(),
                    AdmissionResult::Denied(_) => self.metrics.record_denied(),
                }
                Ok(outcome)
            }
            Err(err) => {
                self.metrics.record_store_error();
                Err(err)
            }
        }
    }

    pub fn cost_from_usage(&self, model: &str, input_tokens: u64, output_tokens: u64) -> u64 {
        self.calculator
            .cost_from_usage(model, input_tokens, output_tokens)
    }

    pub fn estimate_cost(&self, model: &str, shape: &RequestShape) -> u64 {
        self.calculator.estimate_from_request(model, shape)
    }

    /// Inline accrual of a completed request's cost at all three scopes.
    pub async fn settle(&self, keys: &ScopeKeys, usd_micros: u64) -> AccrualReport {
        let report = accrue(&self.store, keys, usd_micros).await;
        self.metrics.add_accrual_failures(report.failed);
        report
    }

    /// Accrual off the client-facing latency path: spawned so the handler can
    /// send the response first and let the spend land afterwards.
    pub fn settle_detached(
        &self,
        keys: ScopeKeys,
        usd_micros: u64,
    ) -> tokio::task::JoinHandle<AccrualReport> {
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let report = accrue(&store, &keys, usd_micros).await;
            metrics.add_accrual_failures(report.failed);
            report
        })
    }
}
