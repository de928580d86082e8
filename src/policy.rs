//! Failure-mode policy: the single seam where availability is traded for
//! consistency, per organization.
//!
//! Storage errors are caught exactly once, here. A fail-closed organization
//! is never silently admitted during an outage; a fail-open organization is
//! never rejected for storage reasons (a genuine quota denial discovered
//! before the outage still stands).

use serde::{Deserialize, Serialize};

use crate::check::{AdmissionResult, QuotaChecker, ScopeKeys, ScopeLimits};
use crate::store::StoreUnavailable;

/// Organization-configured behavior when the quota store is unreachable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    FailOpen,
    #[default]
    FailClosed,
}

/// Result of a policy-wrapped check. `degraded` is true only when the store
/// was unreachable and a fail-open placeholder admission was synthesized; no
/// real usage check happened for such a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub result: AdmissionResult,
    pub degraded: bool,
}

impl QuotaChecker {
    pub async fn check_with_policy(
        &self,
        keys: &ScopeKeys,
        limits: &ScopeLimits,
        failure_mode: FailureMode,
    ) -> Result<PolicyOutcome, StoreUnavailable> {
        match self.check(keys, limits).await {
            Ok(result) => Ok(PolicyOutcome {
                result,
                degraded: false,
            }),
            Err(err) => match failure_mode {
                FailureMode::FailClosed => Err(err),
                FailureMode::FailOpen => {
                    tracing::warn!(
                        error = %err,
                        organization = keys.organization.as_str(),
                        "quota store unreachable, admitting fail-open"
                    );
                    let placeholder = self.store().placeholder_record();
                    Ok(PolicyOutcome {
                        result: AdmissionResult::Admitted {
                            credential: placeholder.clone(),
                            user: placeholder.clone(),
                            organization: placeholder,
                        },
                        degraded: true,
                    })
                }
            },
        }
    }
}
