//! End-to-end admission and accrual scenarios against the in-memory backend.

use std::sync::Arc;

use tollgate::{
    AdmissionRequest, AdmissionResult, FailureMode, MemoryBackend, ModelPricing, PricingTable,
    QuotaEngine, RequestShape, Scope, ScopeKeys, ScopeLimits,
};

const USD: u64 = 1_000_000;

fn pricing() -> PricingTable {
    let mut table = PricingTable::default();
    table.insert(
        "gpt-4o-mini",
        ModelPricing {
            input_usd_micros_per_mtok: 150_000,
            output_usd_micros_per_mtok: 600_000,
        },
    );
    table
}

fn keys() -> ScopeKeys {
    ScopeKeys::new("cred-1", "user-1", "org-1")
}

fn request(credential_limit_usd_micros: u64) -> AdmissionRequest {
    AdmissionRequest {
        keys: keys(),
        limits: ScopeLimits {
            credential_usd_micros: Some(credential_limit_usd_micros),
            user_usd_micros: Some(1_000 * USD),
            organization_usd_micros: Some(10_000 * USD),
        },
        failure_mode: FailureMode::FailClosed,
    }
}

#[tokio::test]
async fn spend_below_limit_admits_until_a_check_observes_the_limit() {
    let engine = QuotaEngine::new(Arc::new(MemoryBackend::new()), pricing());
    let request = request(10 * USD);

    // Seed: $9.50 already spent this period.
    engine.settle(&request.keys, 9 * USD + USD / 2).await;

    // $9.50 < $10.00 at check time, so the request is admitted even though
    // its own cost will push the total closer to the limit.
    let outcome = engine.admit(&request).await.expect("admit");
    let AdmissionResult::Admitted { credential, .. } = &outcome.result else {
        panic!("expected admission");
    };
    assert_eq!(credential.spent_usd_micros, 9_500_000);

    // The request completes at a cost of $0.40; accrual runs after the
    // response was sent.
    engine.settle(&request.keys, 400_000).await;

    let record = engine
        .store()
        .read(Scope::Credential, "cred-1")
        .await
        .expect("read");
    assert_eq!(record.spent_usd_micros, 9_900_000);

    // Still under the limit: the next request is admitted too.
    let outcome = engine.admit(&request).await.expect("admit");
    assert!(outcome.result.is_admitted());
}

#[tokio::test]
async fn spend_at_limit_denies_with_zero_remaining() {
    let engine = QuotaEngine::new(Arc::new(MemoryBackend::new()), pricing());
    let request = request(10 * USD);

    // A prior overshoot left the credential exactly at $10.00.
    engine.settle(&request.keys, 10 * USD).await;

    let outcome = engine.admit(&request).await.expect("admit");
    let denial = outcome.result.denial().expect("denied");
    assert_eq!(denial.scope, Scope::Credential);
    assert_eq!(denial.reason(), "credential_quota_exceeded");
    assert_eq!(denial.limit_usd_micros, 10 * USD);
    assert_eq!(denial.remaining_usd_micros(), 0);
}

#[tokio::test]
async fn accrual_runs_even_for_usage_reported_after_a_denied_sibling() {
    // Two logical requests: one denied, one completed. The completed one's
    // accrual is independent of any admission outcome.
    let engine = QuotaEngine::new(Arc::new(MemoryBackend::new()), pricing());
    let request = request(USD);

    engine.settle(&request.keys, USD).await;
    let outcome = engine.admit(&request).await.expect("admit");
    assert!(!outcome.result.is_admitted());

    let cost = engine.cost_from_usage("gpt-4o-mini", 1_000_000, 1_000_000);
    assert_eq!(cost, 750_000);
    engine.settle(&request.keys, cost).await;

    let record = engine
        .store()
        .read(Scope::User, "user-1")
        .await
        .expect("read");
    assert_eq!(record.spent_usd_micros, USD + 750_000);
    assert_eq!(record.request_count, 2);
}

#[tokio::test]
async fn estimate_is_used_only_without_reported_usage() {
    let engine = QuotaEngine::new(Arc::new(MemoryBackend::new()), pricing());
    let keys = keys();

    // Upstream reported usage: charge the exact cost.
    let actual = engine.cost_from_usage("gpt-4o-mini", 2_000, 500);
    engine.settle(&keys, actual).await;

    // No usage in the response: fall back to the shape estimate.
    let shape = RequestShape {
        prompt_chars: 8_000,
        max_output_tokens: Some(500),
    };
    let estimate = engine.estimate_cost("gpt-4o-mini", &shape);
    assert!(estimate > 0);
    engine.settle(&keys, estimate).await;

    let record = engine
        .store()
        .read(Scope::Credential, "cred-1")
        .await
        .expect("read");
    assert_eq!(record.spent_usd_micros, actual + estimate);
    assert_eq!(record.request_count, 2);
}

#[tokio::test]
async fn engine_built_from_config_enforces_quotas() {
    let config = tollgate::QuotaConfig::from_toml_str(
        r#"
        op_timeout_ms = 100

        [store]
        kind = "memory"
        "#,
    )
    .expect("config");
    let engine = config.build_engine(pricing()).expect("engine");

    let request = request(10 * USD);
    let outcome = engine.admit(&request).await.expect("admit");
    assert!(outcome.result.is_admitted());
    assert!(!outcome.degraded);
}
