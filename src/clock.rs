//! Injectable wall-clock source.
//!
//! Billing-period math depends on "now"; tests substitute a manual clock to
//! drive period rollovers deterministically.

pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> u64;

    fn now_epoch_millis(&self) -> u64 {
        self.now_epoch_seconds().saturating_mul(1000)
    }
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> u64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_else(|_| std::time::Duration::from_secs(0));
        now.as_secs()
    }

    fn now_epoch_millis(&self) -> u64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_else(|_| std::time::Duration::from_secs(0));
        u64::try_from(now.as_millis()).unwrap_or(u64::MAX)
    }
}
