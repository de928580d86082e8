//! Hierarchical spend-quota enforcement for multi-tenant LLM gateways.
//!
//! Every inbound request resolves to three nested spending scopes —
//! credential, user, organization — each with its own monthly monetary
//! limit. The engine decides admission before the upstream model call
//! (credential first, short-circuiting), converts reported token usage into
//! USD micros afterwards, and accrues the spend at all three scopes
//! best-effort. When the backing store is unreachable, the organization's
//! fail-open / fail-closed policy decides.
//!
//! The store abstraction assumes plain get/put; backends with a native
//! atomic increment (Redis, SQLite) use it so concurrent accruals cannot
//! lose updates.

pub mod accrual;
pub mod check;
pub mod clock;
pub mod config;
pub mod cost;
pub mod engine;
pub mod memory_store;
pub mod metrics;
pub mod policy;
pub mod pricing;
pub mod record;
#[cfg(feature = "store-redis")]
pub mod redis_store;
#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
pub mod store;

pub use accrual::{AccrualReport, accrue};
pub use check::{AdmissionResult, Denial, QuotaChecker, ScopeKeys, ScopeLimits};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, QuotaConfig, StoreConfig};
pub use cost::{CostCalculator, FALLBACK_USD_MICROS_PER_MTOK, RequestShape};
pub use engine::{AdmissionRequest, QuotaEngine};
pub use memory_store::MemoryBackend;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use policy::{FailureMode, PolicyOutcome};
pub use pricing::{ModelPricing, PricingTable, PricingTableError};
pub use record::{Scope, UsageRecord, period_tag_at};
#[cfg(feature = "store-redis")]
pub use redis_store::RedisQuotaBackend;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteQuotaBackend;
pub use store::{DEFAULT_OP_TIMEOUT, QuotaBackend, QuotaStore, StoreUnavailable};
