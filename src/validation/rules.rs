//! Business rules and record-shape checks
//!
//! The per-user and daily caps are computed from the stake list the client
//! has at hand, which may be stale. They are advisory; the canister is the
//! authority.

use super::{format_btc, ValidationResult, Validator};
use crate::backend::{Pool, Portfolio, Stake};
use chrono::{DateTime, Local};

impl Validator {
    /// Check a new stake of `amount_sats` against the user's existing stakes
    pub fn validate_staking_rules(
        &self,
        amount_sats: u64,
        pool_id: &str,
        user_stakes: &[Stake],
    ) -> ValidationResult {
        self.validate_staking_rules_at(amount_sats, pool_id, user_stakes, Local::now())
    }

    /// Same as `validate_staking_rules` with an explicit "now" for the daily window
    pub fn validate_staking_rules_at(
        &self,
        amount_sats: u64,
        pool_id: &str,
        user_stakes: &[Stake],
        now: DateTime<Local>,
    ) -> ValidationResult {
        let limits = self.limits();
        let mut result = ValidationResult::ok();

        if amount_sats == 0 {
            result.push("Amount must be greater than 0");
        } else if amount_sats < limits.min_stake_sats {
            result.push(format!(
                "Minimum stake amount is {} ckBTC",
                format_btc(limits.min_stake_sats)
            ));
        } else if amount_sats > limits.max_stake_sats {
            result.push(format!(
                "Maximum stake amount is {} ckBTC",
                format_btc(limits.max_stake_sats)
            ));
        }
        result.merge(self.validate_pool_id(pool_id));

        let outstanding: u64 = user_stakes
            .iter()
            .filter(|s| s.is_active)
            .map(|s| s.amount)
            .fold(0u64, u64::saturating_add);
        if outstanding.saturating_add(amount_sats) > limits.max_total_per_user_sats {
            result.push(format!(
                "Total staked amount cannot exceed {} ckBTC per user",
                format_btc(limits.max_total_per_user_sats)
            ));
        }

        let today = now.date_naive();
        let staked_today: u64 = user_stakes
            .iter()
            .filter(|s| {
                s.started_at_local()
                    .map(|at| at.date_naive() == today)
                    .unwrap_or(false)
            })
            .map(|s| s.amount)
            .fold(0u64, u64::saturating_add);
        if staked_today.saturating_add(amount_sats) > limits.max_daily_sats {
            result.push(format!(
                "Daily stake limit exceeded ({} ckBTC per day)",
                format_btc(limits.max_daily_sats)
            ));
        }

        result
    }

    pub fn validate_pool(&self, pool: &Pool) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if pool.id.trim().is_empty() {
            result.push("Pool must have a valid ID");
        }
        if pool.name.trim().is_empty() {
            result.push("Pool must have a name");
        }
        if !pool.apy.is_finite() {
            result.push("Pool APY must be a valid number");
        } else if !(0.0..=100.0).contains(&pool.apy) {
            result.push("Pool APY must be between 0 and 100");
        }
        result
    }

    pub fn validate_stake(&self, stake: &Stake) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if stake.user_id.as_str().is_empty() {
            result.push("Stake must have a user ID");
        }
        if stake.pool_id.trim().is_empty() {
            result.push("Stake must have a pool ID");
        }
        if stake.last_claim_time < stake.start_time {
            result.push("Stake last claim time cannot precede its start time");
        }
        result
    }

    pub fn validate_portfolio(&self, portfolio: &Portfolio) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if portfolio.user_id.as_str().is_empty() {
            result.push("Portfolio must have a user ID");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{to_nanos, Principal, SATS_PER_BTC};
    use chrono::{Duration, TimeZone, Utc};

    fn stake_at(amount: u64, at: DateTime<Local>, active: bool) -> Stake {
        let nanos = to_nanos(at.with_timezone(&Utc));
        Stake {
            id: 1,
            user_id: Principal::new("alice-principal"),
            amount,
            pool_id: "stable".to_string(),
            start_time: nanos,
            last_claim_time: nanos,
            is_active: active,
        }
    }

    fn noon() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .single()
            .unwrap_or_else(|| Local::now())
    }

    #[test]
    fn test_first_stake_passes() {
        let v = Validator::default();
        let result = v.validate_staking_rules_at(SATS_PER_BTC / 2, "balanced", &[], noon());
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn test_daily_cap_counts_only_today() {
        let v = Validator::default();
        let now = noon();
        let stakes = vec![
            stake_at(SATS_PER_BTC * 8 / 10, now - Duration::hours(1), true),
            stake_at(SATS_PER_BTC, now - Duration::days(2), true),
        ];

        let ok = v.validate_staking_rules_at(SATS_PER_BTC / 10, "stable", &stakes, now);
        assert!(ok.is_valid, "{:?}", ok.errors);

        let over = v.validate_staking_rules_at(SATS_PER_BTC * 3 / 10, "stable", &stakes, now);
        assert_eq!(over.errors, vec!["Daily stake limit exceeded (1 ckBTC per day)"]);
    }

    #[test]
    fn test_total_cap_ignores_inactive() {
        let v = Validator::default();
        let now = noon();
        let old = now - Duration::days(10);
        let stakes = vec![
            stake_at(SATS_PER_BTC * 9, old, true),
            stake_at(SATS_PER_BTC * 5, old, false),
        ];

        assert!(v
            .validate_staking_rules_at(SATS_PER_BTC / 2, "stable", &stakes, now)
            .is_valid);
        let over = v.validate_staking_rules_at(SATS_PER_BTC + 1, "stable", &stakes, now);
        assert!(over
            .errors
            .contains(&"Total staked amount cannot exceed 10 ckBTC per user".to_string()));
    }

    #[test]
    fn test_record_checks() {
        let v = Validator::default();
        let mut pool = Pool {
            id: "stable".into(),
            name: "Stable Pool".into(),
            apy: 5.0,
            total_staked: 0,
            max_capacity: 1,
            is_active: true,
        };
        assert!(v.validate_pool(&pool).is_valid);
        pool.apy = 150.0;
        pool.name = String::new();
        assert_eq!(v.validate_pool(&pool).errors.len(), 2);

        let portfolio = Portfolio {
            user_id: Principal::new(""),
            total_staked: 0,
            total_earned: 0,
            active_stakes: vec![],
        };
        assert!(!v.validate_portfolio(&portfolio).is_valid);

        let stake = stake_at(1, noon(), true);
        assert!(v.validate_stake(&stake).is_valid);
    }
}
