//! Which error kinds the client retries, and how

use std::collections::HashMap;
use std::time::Duration;

use catalink_domain::constants::{QUOTA_EXCEEDED_MIN_DELAY_SECS, RATE_LIMITED_MIN_DELAY_SECS};
use catalink_domain::ErrorKind;
use parking_lot::RwLock;

/// Retry rule for one error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    pub retryable: bool,
    /// Cap below the configured `max_retries`; `None` uses the global value
    pub max_retries: Option<u32>,
    /// Floor under the computed backoff delay
    pub min_delay: Option<Duration>,
}

impl KindPolicy {
    pub const fn never() -> Self {
        Self { retryable: false, max_retries: None, min_delay: None }
    }

    pub const fn always() -> Self {
        Self { retryable: true, max_retries: None, min_delay: None }
    }

    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub const fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = Some(min_delay);
        self
    }

    /// Whether another retry is allowed after `kind_retries` earlier
    /// retries caused by this same kind
    pub fn allows(&self, kind_retries: u32) -> bool {
        self.retryable && self.max_retries.map_or(true, |max| kind_retries < max)
    }
}

/// Mutable table of [`KindPolicy`] rules, one per [`ErrorKind`]
///
/// Kinds missing from the table are never retried.
#[derive(Debug)]
pub struct RetryPolicyTable {
    rules: RwLock<HashMap<ErrorKind, KindPolicy>>,
}

impl RetryPolicyTable {
    /// Built-in table
    ///
    /// - timeouts and network errors: up to `max_retries`
    /// - rate limited: 5s floor; quota exceeded: 10s floor
    /// - generic server errors: half of `max_retries`
    /// - expired bearer token: one retry (which fetches a new token)
    /// - everything else: never
    pub fn defaults(max_retries: u32) -> Self {
        let mut rules: HashMap<ErrorKind, KindPolicy> =
            ErrorKind::ALL.into_iter().map(|kind| (kind, KindPolicy::never())).collect();

        rules.insert(ErrorKind::Timeout, KindPolicy::always());
        rules.insert(ErrorKind::NetworkError, KindPolicy::always());
        rules.insert(
            ErrorKind::RateLimited,
            KindPolicy::always().with_min_delay(Duration::from_secs(RATE_LIMITED_MIN_DELAY_SECS)),
        );
        rules.insert(
            ErrorKind::QuotaExceeded,
            KindPolicy::always().with_min_delay(Duration::from_secs(QUOTA_EXCEEDED_MIN_DELAY_SECS)),
        );
        rules.insert(ErrorKind::ApiError, KindPolicy::always().with_max_retries(max_retries / 2));
        rules.insert(ErrorKind::TokenExpired, KindPolicy::always().with_max_retries(1));

        Self { rules: RwLock::new(rules) }
    }

    pub fn get(&self, kind: ErrorKind) -> KindPolicy {
        self.rules.read().get(&kind).copied().unwrap_or_else(KindPolicy::never)
    }

    /// Override the rule for one kind
    pub fn set(&self, kind: ErrorKind, policy: KindPolicy) {
        self.rules.write().insert(kind, policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = RetryPolicyTable::defaults(4);

        assert!(table.get(ErrorKind::Timeout).allows(3));
        assert!(table.get(ErrorKind::NetworkError).allows(0));
        assert_eq!(table.get(ErrorKind::RateLimited).min_delay, Some(Duration::from_secs(5)));
        assert_eq!(table.get(ErrorKind::QuotaExceeded).min_delay, Some(Duration::from_secs(10)));

        let api = table.get(ErrorKind::ApiError);
        assert!(api.allows(1));
        assert!(!api.allows(2));

        let expired = table.get(ErrorKind::TokenExpired);
        assert!(expired.allows(0));
        assert!(!expired.allows(1));

        for kind in [
            ErrorKind::AuthenticationFailed,
            ErrorKind::EntityNotFound,
            ErrorKind::InvalidRequest,
            ErrorKind::ValidationError,
            ErrorKind::CircuitOpen,
            ErrorKind::SyncConflict,
        ] {
            assert!(!table.get(kind).allows(0), "{kind} must not retry");
        }
    }

    #[test]
    fn test_override() {
        let table = RetryPolicyTable::defaults(3);
        table.set(ErrorKind::EntityNotFound, KindPolicy::always().with_max_retries(2));
        assert!(table.get(ErrorKind::EntityNotFound).allows(1));
        assert!(!table.get(ErrorKind::EntityNotFound).allows(2));
    }
}
