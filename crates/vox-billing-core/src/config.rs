//! Ledger policy configuration.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Default lifetime of purchased and granted credits, in years.
pub const DEFAULT_CREDITS_EXPIRATION_YEARS: u32 = 2;

/// Default free monthly grant, in credits (10% of the starter package).
pub const DEFAULT_FREE_MONTHLY_CREDITS: i64 = 1_000;

/// Default and maximum page size for transaction listings.
pub const DEFAULT_MAX_TRANSACTIONS_PER_PAGE: u32 = 10;

/// Policy knobs for the credit ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// How long purchased/granted credits remain valid.
    pub credits_expiration_years: u32,

    /// Credits granted for free each calendar month.
    pub free_monthly_credits: i64,

    /// Server-side cap on transaction page size. Also the default page
    /// size when the caller does not supply one.
    pub max_transactions_per_page: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            credits_expiration_years: DEFAULT_CREDITS_EXPIRATION_YEARS,
            free_monthly_credits: DEFAULT_FREE_MONTHLY_CREDITS,
            max_transactions_per_page: DEFAULT_MAX_TRANSACTIONS_PER_PAGE,
        }
    }
}

impl LedgerConfig {
    /// Expiration date for credits granted at `now`.
    ///
    /// Falls back to `now` itself in the astronomically unlikely case the
    /// date cannot be represented.
    #[must_use]
    pub fn expiration_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_months(Months::new(self.credits_expiration_years * 12))
            .unwrap_or(now)
    }

    /// The free-grant idempotency key for the month containing `now`.
    ///
    /// One grant per user per calendar month: replaying the grant within
    /// the same month is a no-op.
    #[must_use]
    pub fn free_grant_key(now: DateTime<Utc>) -> String {
        now.format("free:%Y-%m").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_match_policy() {
        let config = LedgerConfig::default();
        assert_eq!(config.credits_expiration_years, 2);
        assert_eq!(config.free_monthly_credits, 1_000);
        assert_eq!(config.max_transactions_per_page, 10);
    }

    #[test]
    fn expiration_adds_years() {
        let config = LedgerConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        let expires = config.expiration_from(now);
        assert_eq!(expires, Utc.with_ymd_and_hms(2028, 8, 26, 12, 0, 0).unwrap());
    }

    #[test]
    fn grant_key_is_per_month() {
        let in_august = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let late_august = Utc.with_ymd_and_hms(2026, 8, 31, 23, 59, 59).unwrap();
        let in_september = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();

        assert_eq!(LedgerConfig::free_grant_key(in_august), "free:2026-08");
        assert_eq!(
            LedgerConfig::free_grant_key(in_august),
            LedgerConfig::free_grant_key(late_august)
        );
        assert_ne!(
            LedgerConfig::free_grant_key(in_august),
            LedgerConfig::free_grant_key(in_september)
        );
    }
}
