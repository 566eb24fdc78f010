//! Records exchanged with the staking canister
//!
//! Amounts are unsigned satoshis (1e-8 ckBTC); timestamps are nanoseconds
//! since the Unix epoch, as the canister reports them.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest units per whole ckBTC
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Opaque user identifier issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// The well-known anonymous principal
    pub const ANONYMOUS: &'static str = "2vxsx-fae";

    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened `abcdef...uvwxyz` form for display
    pub fn to_display_short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated identity handed out by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub principal: Principal,
    /// When the provider's delegation stops being valid, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub apy: f64,
    pub total_staked: u64,
    pub max_capacity: u64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    pub id: u64,
    pub user_id: Principal,
    pub amount: u64,
    pub pool_id: String,
    pub start_time: u64,
    pub last_claim_time: u64,
    pub is_active: bool,
}

impl Stake {
    /// Start time in the local timezone, used for per-day accounting
    pub fn started_at_local(&self) -> Option<DateTime<Local>> {
        let secs = (self.start_time / 1_000_000_000) as i64;
        let nanos = (self.start_time % 1_000_000_000) as u32;
        Local.timestamp_opt(secs, nanos).single()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub user_id: Principal,
    pub total_staked: u64,
    pub total_earned: u64,
    pub active_stakes: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub owner: Principal,
    pub is_initialized: bool,
    pub total_stakes: u64,
}

/// The canister's `{ok} | {err}` answer
pub type RemoteResult<T> = Result<T, String>;

/// Render satoshis as a fixed 8-decimal ckBTC amount
pub fn format_sats(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}

/// Nanoseconds since the epoch for a wall-clock instant
pub fn to_nanos(at: DateTime<Utc>) -> u64 {
    at.timestamp_nanos_opt().map(|n| n.max(0) as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sats() {
        assert_eq!(format_sats(50_000_000), "0.50000000");
        assert_eq!(format_sats(100_000_000_000), "1000.00000000");
        assert_eq!(format_sats(1), "0.00000001");
    }

    #[test]
    fn test_principal_display_short() {
        let short = Principal::new("aaaaa-aa");
        assert_eq!(short.to_display_short(), "aaaaa-aa");

        let long = Principal::new("rdmx6-jaaaa-aaaaa-aaadq-cai");
        assert_eq!(long.to_display_short(), "rdmx6-...dq-cai");
    }

    #[test]
    fn test_stake_start_time_local() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let stake = Stake {
            id: 1,
            user_id: Principal::new("user-principal-1"),
            amount: 1,
            pool_id: "stable".to_string(),
            start_time: to_nanos(at),
            last_claim_time: to_nanos(at),
            is_active: true,
        };
        let local = stake.started_at_local().unwrap();
        assert_eq!(local.with_timezone(&Utc), at);
    }
}
