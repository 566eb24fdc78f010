//! Per-dataset response caches
//!
//! One `DataCache` per kind of backend data, each with its own TTL and
//! capacity. The set is owned by the application context and shared by
//! reference; there are no module-level singletons.

mod config;
pub mod keys;
mod manager;

pub use config::CacheConfig;
pub use manager::{CacheMetrics, CacheStats, DataCache, InvalidationPattern};

use crate::backend::{Pool, Portfolio, Principal, Stake, SystemInfo};
use crate::config::CacheSettings;
use crate::logger::{self, LogTag};
use std::sync::Arc;

/// The dataset caches used by the client
pub struct CacheSet {
    pub pools: Arc<DataCache<Vec<Pool>>>,
    pub portfolio: Arc<DataCache<Portfolio>>,
    pub stakes: Arc<DataCache<Vec<Stake>>>,
    pub system_info: Arc<DataCache<SystemInfo>>,
    pub whoami: Arc<DataCache<Principal>>,
}

impl CacheSet {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            pools: Arc::new(DataCache::new("pools", (&settings.pools).into())),
            portfolio: Arc::new(DataCache::new("portfolio", (&settings.portfolio).into())),
            stakes: Arc::new(DataCache::new("stakes", (&settings.stakes).into())),
            system_info: Arc::new(DataCache::new("system_info", (&settings.system_info).into())),
            whoami: Arc::new(DataCache::new("whoami", (&settings.whoami).into())),
        }
    }

    /// Drop everything cached for one user
    pub fn invalidate_user(&self, user_id: &str) -> usize {
        // Exact keys: a substring match on "stakes:al" would also hit "stakes:alice"
        let removed = self.stakes.delete(&keys::user_stakes(user_id)) as usize
            + self.portfolio.delete(&keys::portfolio(user_id)) as usize;
        logger::debug(
            LogTag::Cache,
            &format!("Invalidated {} cached entries for {}", removed, user_id),
        );
        removed
    }

    pub fn clear_all(&self) {
        self.pools.clear();
        self.portfolio.clear();
        self.stakes.clear();
        self.system_info.clear();
        self.whoami.clear();
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        vec![
            self.pools.stats(),
            self.portfolio.stats(),
            self.stakes.stats(),
            self.system_info.stats(),
            self.whoami.stats(),
        ]
    }
}

impl Default for CacheSet {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Principal;

    fn portfolio_for(user: &str) -> Portfolio {
        Portfolio {
            user_id: Principal::new(user),
            total_staked: 1,
            total_earned: 0,
            active_stakes: vec![1],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_user_is_scoped() {
        let caches = CacheSet::default();
        caches.stakes.set(keys::user_stakes("alice"), Vec::new());
        caches.stakes.set(keys::user_stakes("bob"), Vec::new());
        caches.stakes.set(keys::user_stakes("alice2"), Vec::new());
        caches.portfolio.set(keys::portfolio("alice"), portfolio_for("alice"));

        assert_eq!(caches.invalidate_user("alice"), 2);
        assert!(caches.stakes.has(&keys::user_stakes("bob")));
        assert!(caches.stakes.has(&keys::user_stakes("alice2")));
        assert!(!caches.portfolio.has(&keys::portfolio("alice")));
    }

    #[test]
    fn test_settings_flow_into_caches() {
        let caches = CacheSet::default();
        assert_eq!(caches.pools.config().max_size, 10);
        assert_eq!(caches.stakes.config().ttl.as_secs(), 30);
        assert_eq!(caches.system_info.config().max_size, 1);
    }
}
