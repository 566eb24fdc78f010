mod cache_sweeper_service;
mod monitoring_prune_service;
mod rate_limit_cleanup_service;
mod session_resync_service;

pub use cache_sweeper_service::CacheSweeperService;
pub use monitoring_prune_service::MonitoringPruneService;
pub use rate_limit_cleanup_service::RateLimitCleanupService;
pub use session_resync_service::SessionResyncService;
