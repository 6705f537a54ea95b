//! Ledger configuration.
//!
//! Values come from the environment with safe fallbacks; a bad value is
//! logged and replaced by the default rather than failing startup.

use std::time::Duration;

use stockledger_inventory::ReservationDeletePolicy;

pub const ENV_LOCK_TIMEOUT_MS: &str = "STOCKLEDGER_LOCK_TIMEOUT_MS";
pub const ENV_LOW_STOCK_THRESHOLD: &str = "STOCKLEDGER_LOW_STOCK_THRESHOLD";
pub const ENV_DELETE_POLICY: &str = "STOCKLEDGER_DELETE_POLICY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Longest a mutation waits for its record's serialization point.
    pub lock_timeout: Duration,
    /// Threshold used by `low_stock_default`.
    pub default_low_stock_threshold: i64,
    pub reservation_delete_policy: ReservationDeletePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(1_000),
            default_low_stock_threshold: 10,
            reservation_delete_policy: ReservationDeletePolicy::Reject,
        }
    }
}

impl LedgerConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let lock_timeout = parse_or(&lookup, ENV_LOCK_TIMEOUT_MS, |v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.lock_timeout);

        let default_low_stock_threshold =
            parse_or(&lookup, ENV_LOW_STOCK_THRESHOLD, |v| v.parse::<i64>().ok())
                .unwrap_or(defaults.default_low_stock_threshold);

        let reservation_delete_policy =
            parse_or(&lookup, ENV_DELETE_POLICY, |v| v.parse::<ReservationDeletePolicy>().ok())
                .unwrap_or(defaults.reservation_delete_policy);

        Self {
            lock_timeout,
            default_low_stock_threshold,
            reservation_delete_policy,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_delete_policy(mut self, policy: ReservationDeletePolicy) -> Self {
        self.reservation_delete_policy = policy;
        self
    }

    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.default_low_stock_threshold = threshold;
        self
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting; using default");
    }
    parsed
}
