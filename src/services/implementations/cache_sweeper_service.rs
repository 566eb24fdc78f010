use crate::cache::CacheSet;
use crate::services::{Service, ServiceHealth};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sweeps expired entries out of every dataset cache
pub struct CacheSweeperService {
    caches: Arc<CacheSet>,
}

impl CacheSweeperService {
    pub fn new(caches: Arc<CacheSet>) -> Self {
        Self { caches }
    }
}

#[async_trait]
impl Service for CacheSweeperService {
    fn name(&self) -> &'static str {
        "cache_sweeper"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn start(&mut self, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>, String> {
        Ok(vec![
            self.caches.pools.spawn_sweeper(shutdown.clone()),
            self.caches.portfolio.spawn_sweeper(shutdown.clone()),
            self.caches.stakes.spawn_sweeper(shutdown.clone()),
            self.caches.system_info.spawn_sweeper(shutdown.clone()),
            self.caches.whoami.spawn_sweeper(shutdown),
        ])
    }

    async fn stop(&mut self) -> Result<(), String> {
        self.caches.clear_all();
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        let full: Vec<String> = self
            .caches
            .stats()
            .into_iter()
            .filter(|stats| stats.max_size > 1 && stats.size >= stats.max_size)
            .map(|stats| stats.name)
            .collect();
        if full.is_empty() {
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Degraded(format!("evicting at capacity: {}", full.join(", ")))
        }
    }
}
