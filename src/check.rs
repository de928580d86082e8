//! Ordered hierarchical admission check.
//!
//! Scopes are checked credential, then user, then organization: the most
//! specific, most frequently exhausted quota fails fast and the remaining
//! reads are skipped. The check is reactive — current accumulated spend
//! against the limit — so a request can only be denied for spend already on
//! record, never for the cost it is about to incur.

use serde::{Deserialize, Serialize};

use crate::record::{Scope, UsageRecord};
use crate::store::{QuotaStore, StoreUnavailable};

/// The three scope identities resolved from one inbound credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeKeys {
    pub credential: String,
    pub user: String,
    pub organization: String,
}

impl ScopeKeys {
    pub fn new(
        credential: impl Into<String>,
        user: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            credential: credential.into(),
            user: user.into(),
            organization: organization.into(),
        }
    }

    pub fn identifier(&self, scope: Scope) -> &str {
        match scope {
            Scope::Credential => &self.credential,
            Scope::User => &self.user,
            Scope::Organization => &self.organization,
        }
    }
}

/// Monetary ceilings per scope, in USD micros. `None` disables the scope's
/// check. Limits are independently configured and need not nest numerically;
/// all configured scopes are enforced regardless.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeLimits {
    pub credential_usd_micros: Option<u64>,
    pub user_usd_micros: Option<u64>,
    pub organization_usd_micros: Option<u64>,
}

impl ScopeLimits {
    pub fn for_scope(&self, scope: Scope) -> Option<u64> {
        match scope {
            Scope::Credential => self.credential_usd_micros,
            Scope::User => self.user_usd_micros,
            Scope::Organization => self.organization_usd_micros,
        }
    }
}

/// A denial names the first violated scope and carries its record and limit
/// so the handler can report used/limit/remaining without a second read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub scope: Scope,
    pub limit_usd_micros: u64,
    pub record: UsageRecord,
}

impl Denial {
    pub fn remaining_usd_micros(&self) -> u64 {
        self.limit_usd_micros
            .saturating_sub(self.record.spent_usd_micros)
    }

    pub fn reason(&self) -> &'static str {
        match self.scope {
            Scope::Credential => "credential_quota_exceeded",
            Scope::User => "user_quota_exceeded",
            Scope::Organization => "organization_quota_exceeded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionResult {
    /// All configured scopes are under their limits. Carries the three
    /// records read during the check for remaining-budget response headers.
    Admitted {
        credential: UsageRecord,
        user: UsageRecord,
        organization: UsageRecord,
    },
    Denied(Denial),
}

impl AdmissionResult {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionResult::Admitted { .. })
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            AdmissionResult::Denied(denial) => Some(denial),
            AdmissionResult::Admitted { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct QuotaChecker {
    store: QuotaStore,
}

impl QuotaChecker {
    pub fn new(store: QuotaStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &QuotaStore {
        &self.store
    }

    /// Decides admission for one request. Storage errors propagate uncaught;
    /// the failure-mode policy is the one boundary that catches them.
    pub async fn check(
        &self,
        keys: &ScopeKeys,
        limits: &ScopeLimits,
    ) -> Result<AdmissionResult, StoreUnavailable> {
        let credential = self.store.read(Scope::Credential, &keys.credential).await?;
        if let Some(denial) =
            deny_if_exhausted(Scope::Credential, &credential, limits.credential_usd_micros)
        {
            return Ok(AdmissionResult::Denied(denial));
        }

        let user = self.store.read(Scope::User, &keys.user).await?;
        if let Some(denial) = deny_if_exhausted(Scope::User, &user, limits.user_usd_micros) {
            return Ok(AdmissionResult::Denied(denial));
        }

        let organization = self
            .store
            .read(Scope::Organization, &keys.organization)
            .await?;
        if let Some(denial) = deny_if_exhausted(
            Scope::Organization,
            &organization,
            limits.organization_usd_micros,
        ) {
            return Ok(AdmissionResult::Denied(denial));
        }

        Ok(AdmissionResult::Admitted {
            credential,
            user,
            organization,
        })
    }
}

fn deny_if_exhausted(scope: Scope, record: &UsageRecord, limit: Option<u64>) -> Option<Denial> {
    let limit_usd_micros = limit?;
    if record.spent_usd_micros >= limit_usd_micros {
        return Some(Denial {
            scope,
            limit_usd_micros,
            record: record.clone(),
        });
    }
    None
}
