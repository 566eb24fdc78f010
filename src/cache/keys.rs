//! Cache key namespacing
//!
//! Per-user data is always keyed by the user's principal; a missing
//! qualifier would serve one user's stakes to another.

pub const POOLS: &str = "pools";
pub const SYSTEM_INFO: &str = "system:info";

pub fn portfolio(user_id: &str) -> String {
    format!("portfolio:{}", user_id)
}

pub fn user_stakes(user_id: &str) -> String {
    format!("stakes:{}", user_id)
}

pub fn pool(pool_id: &str) -> String {
    format!("pool:{}", pool_id)
}

pub fn stake(stake_id: u64) -> String {
    format!("stake:{}", stake_id)
}

pub fn whoami(principal: &str) -> String {
    format!("whoami:{}", principal)
}

/// Substrings selecting whole families of keys
pub mod patterns {
    pub const ALL_POOLS: &str = "pool";
    pub const ALL_PORTFOLIOS: &str = "portfolio";
    pub const ALL_STAKES: &str = "stakes";
    pub const ALL_SYSTEM: &str = "system";
}
