//! Application context: owns every component and wires them together
//!
//! Caches, limiters, monitor and session are constructed once here and
//! handed out as `Arc`s. Tests build their own context instead of touching
//! shared globals.

use crate::backend::testing::{InMemoryCanister, InMemoryConnector, ScriptedIdentityProvider};
use crate::backend::{BackendConnector, IdentityProvider, Principal};
use crate::cache::CacheSet;
use crate::client::XonoraClient;
use crate::config::Config;
use crate::logger::{self, LogTag};
use crate::monitoring::Monitor;
use crate::rate_limiter::RateLimiters;
use crate::services::implementations::{
    CacheSweeperService, MonitoringPruneService, RateLimitCleanupService, SessionResyncService,
};
use crate::services::{ServiceHealth, ServiceManager};
use crate::session::SessionManager;
use crate::validation::Validator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AppContext {
    pub config: Config,
    pub caches: Arc<CacheSet>,
    pub limiters: Arc<RateLimiters>,
    pub monitor: Arc<Monitor>,
    pub session: Arc<SessionManager>,
    pub client: Arc<XonoraClient>,
    services: ServiceManager,
    shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
        connector: Arc<dyn BackendConnector>,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let caches = Arc::new(CacheSet::new(&config.cache));
        let limiters = Arc::new(RateLimiters::new(&config.rate_limits));
        let monitor = Arc::new(Monitor::new(config.monitoring.clone()));
        let session = Arc::new(SessionManager::new(
            config.session.clone(),
            provider,
            connector,
            limiters.auth.clone(),
            shutdown.child_token(),
        ));
        let client = Arc::new(XonoraClient::new(
            session.clone(),
            caches.clone(),
            limiters.clone(),
            monitor.clone(),
            Validator::new(config.staking.clone()),
        ));

        let mut services = ServiceManager::new(config.clone(), shutdown.child_token());
        services.register(Box::new(CacheSweeperService::new(caches.clone())));
        services.register(Box::new(RateLimitCleanupService::new(limiters.clone())));
        services.register(Box::new(MonitoringPruneService::new(monitor.clone())));
        services.register(Box::new(SessionResyncService::new(session.clone())));

        Self {
            config,
            caches,
            limiters,
            monitor,
            session,
            client,
            services,
            shutdown,
        }
    }

    /// Context wired to the in-memory canister, signed in as `principal`
    pub fn offline(config: Config, principal: Principal) -> (Self, InMemoryCanister) {
        let canister = InMemoryCanister::new();
        let provider = Arc::new(ScriptedIdentityProvider::with_session(principal));
        let connector = Arc::new(InMemoryConnector::new(canister.clone()));
        (Self::new(config, provider, connector), canister)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn start_services(&mut self) -> Result<(), String> {
        self.services.start_all().await
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.services.running_services()
    }

    pub async fn service_health(&self) -> HashMap<&'static str, ServiceHealth> {
        self.services.get_health().await
    }

    /// Stop background work, drop session and cached data
    pub async fn shutdown(&mut self) {
        logger::info(LogTag::System, "Shutting down");
        if let Err(e) = self.services.stop_all().await {
            logger::warning(LogTag::System, &format!("Service shutdown error: {}", e));
        }
        self.session.shutdown();
        self.caches.clear_all();
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn alice() -> Principal {
        Principal::new("alice-principal-0001")
    }

    #[tokio::test(start_paused = true)]
    async fn test_services_start_and_stop() {
        let (mut ctx, _canister) = AppContext::offline(Config::default(), alice());
        ctx.start_services().await.unwrap();
        assert_eq!(
            ctx.running_services(),
            vec![
                "cache_sweeper",
                "monitoring_prune",
                "rate_limit_cleanup",
                "session_resync"
            ]
        );

        ctx.shutdown().await;
        assert!(ctx.running_services().is_empty());
        assert!(ctx.shutdown_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_disabled_by_config() {
        let mut config = Config::default();
        config.session.resync_enabled = false;
        let (mut ctx, _canister) = AppContext::offline(config, alice());
        ctx.start_services().await.unwrap();
        assert!(!ctx.running_services().contains(&"session_resync"));
        ctx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_resync_picks_up_session() {
        let (mut ctx, _canister) = AppContext::offline(Config::default(), alice());
        ctx.start_services().await.unwrap();
        assert_eq!(ctx.session.state(), SessionState::Disconnected);

        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        assert!(ctx.session.state().is_connected());
        ctx.shutdown().await;
    }
}
