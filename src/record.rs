//! Per-scope usage records and billing-period tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three nesting levels at which spend is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Credential,
    User,
    Organization,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Credential, Scope::User, Scope::Organization];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Credential => "credential",
            Scope::User => "user",
            Scope::Organization => "organization",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated spend for one scope identity within one billing period.
///
/// A record whose `period_tag` does not match the current period is logically
/// zero; readers reset it lazily and persist the zeroed record back.
/// `updated_at_ms` is observability-only and never drives correctness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub spent_usd_micros: u64,
    pub period_tag: String,
    pub request_count: u64,
    pub updated_at_ms: u64,
}

impl UsageRecord {
    pub fn zero(period_tag: impl Into<String>, now_ms: u64) -> Self {
        Self {
            spent_usd_micros: 0,
            period_tag: period_tag.into(),
            request_count: 0,
            updated_at_ms: now_ms,
        }
    }

    pub fn is_stale(&self, current_period_tag: &str) -> bool {
        self.period_tag != current_period_tag
    }

    pub fn add(&self, usd_micros: u64, now_ms: u64) -> Self {
        Self {
            spent_usd_micros: self.spent_usd_micros.saturating_add(usd_micros),
            period_tag: self.period_tag.clone(),
            request_count: self.request_count.saturating_add(1),
            updated_at_ms: now_ms,
        }
    }
}

/// Billing-period tag (`YYYY-MM`, UTC) for a point in time.
pub fn period_tag_at(epoch_seconds: u64) -> String {
    let ts = i64::try_from(epoch_seconds).unwrap_or(i64::MAX);
    match time::OffsetDateTime::from_unix_timestamp(ts) {
        Ok(datetime) => format!("{:04}-{:02}", datetime.year(), u8::from(datetime.month())),
        Err(_) => "1970-01".to_string(),
    }
}
