use crate::config_struct;
use std::time::Duration;

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

config_struct! {
    /// Root configuration structure containing all sub-configurations
    pub struct Config {
        /// Per-dataset cache tuning
        cache: CacheSettings = CacheSettings::default(),

        /// Per-operation rate limit policies
        rate_limits: RateLimitSettings = RateLimitSettings::default(),

        /// Session / authentication behaviour
        session: SessionConfig = SessionConfig::default(),

        /// Diagnostic ring buffers and health thresholds
        monitoring: MonitoringConfig = MonitoringConfig::default(),

        /// Stake amount and business limits
        staking: StakingConfig = StakingConfig::default(),

        /// Backend host and identity provider
        network: NetworkConfig = NetworkConfig::default(),

        /// Log output
        logging: LoggingConfig = LoggingConfig::default(),
    }
}

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

config_struct! {
    /// TTL, capacity and sweep interval for a single cache instance
    pub struct CacheSection {
        ttl_secs: u64 = 300,
        max_size: usize = 1000,
        cleanup_interval_secs: u64 = 60,
    }
}

config_struct! {
    /// Cache tuning per dataset
    ///
    /// Pools change rarely, portfolios and stakes often, system info and
    /// identities almost never.
    pub struct CacheSettings {
        pools: CacheSection = CacheSection {
            ttl_secs: 120,
            max_size: 10,
            cleanup_interval_secs: 30,
        },

        portfolio: CacheSection = CacheSection {
            ttl_secs: 60,
            max_size: 1000,
            cleanup_interval_secs: 30,
        },

        stakes: CacheSection = CacheSection {
            ttl_secs: 30,
            max_size: 1000,
            cleanup_interval_secs: 15,
        },

        system_info: CacheSection = CacheSection {
            ttl_secs: 300,
            max_size: 1,
            cleanup_interval_secs: 60,
        },

        /// Caller principal as reported by the canister
        whoami: CacheSection = CacheSection {
            ttl_secs: 300,
            max_size: 10,
            cleanup_interval_secs: 60,
        },
    }
}

// ============================================================================
// RATE LIMIT CONFIGURATION
// ============================================================================

config_struct! {
    /// One sliding-window policy
    pub struct RateLimitPolicy {
        /// Window length in seconds
        window_secs: u64 = 60,

        /// Requests admitted per window
        max_requests: usize = 100,

        /// Key windows by `identifier:operation` instead of `operation`
        per_user: bool = true,

        /// Do not count successful requests
        skip_successful: bool = false,

        /// Do not count failed requests
        skip_failed: bool = false,
    }
}

config_struct! {
    /// Rate limit policies per operation class
    pub struct RateLimitSettings {
        stake: RateLimitPolicy = RateLimitPolicy {
            window_secs: 60,
            max_requests: 10,
            per_user: true,
            skip_successful: false,
            skip_failed: true,
        },

        unstake: RateLimitPolicy = RateLimitPolicy {
            window_secs: 60,
            max_requests: 5,
            per_user: true,
            skip_successful: false,
            skip_failed: true,
        },

        query: RateLimitPolicy = RateLimitPolicy {
            window_secs: 60,
            max_requests: 100,
            per_user: true,
            skip_successful: true,
            skip_failed: false,
        },

        auth: RateLimitPolicy = RateLimitPolicy {
            window_secs: 60,
            max_requests: 5,
            per_user: true,
            skip_successful: true,
            skip_failed: false,
        },

        /// Cross-user ceiling
        global: RateLimitPolicy = RateLimitPolicy {
            window_secs: 60,
            max_requests: 1000,
            per_user: false,
            skip_successful: true,
            skip_failed: false,
        },
    }
}

// ============================================================================
// SESSION CONFIGURATION
// ============================================================================

config_struct! {
    /// Session manager behaviour
    pub struct SessionConfig {
        /// Connection attempts made by one retry run
        max_retry_attempts: u32 = 3,

        /// Delay before the first retry; doubles each attempt
        retry_base_delay_ms: u64 = 1000,

        /// Upper bound for a single retry delay
        retry_max_delay_ms: u64 = 4000,

        /// Reconcile local state with the identity provider periodically
        resync_enabled: bool = true,

        resync_interval_secs: u64 = 30,

        /// Give up on the interactive login flow after this long
        login_timeout_secs: u64 = 300,
    }
}

impl SessionConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

// ============================================================================
// MONITORING CONFIGURATION
// ============================================================================

config_struct! {
    /// Monitoring ring buffers and health thresholds
    pub struct MonitoringConfig {
        max_performance_samples: usize = 1000,
        max_error_records: usize = 500,

        /// Records older than this are dropped by the pruning task
        max_record_age_secs: u64 = 86_400,
        prune_interval_secs: u64 = 3600,

        /// Average latency thresholds (ms)
        latency_pass_ms: f64 = 1000.0,
        latency_warn_ms: f64 = 3000.0,

        /// Error rate thresholds (%)
        error_rate_pass_pct: f64 = 1.0,
        error_rate_warn_pct: f64 = 5.0,

        /// Success rate thresholds (%)
        success_rate_pass_pct: f64 = 95.0,
        success_rate_warn_pct: f64 = 90.0,
    }
}

// ============================================================================
// STAKING CONFIGURATION
// ============================================================================

config_struct! {
    /// Local stake limits. Amounts are in satoshis (1e-8 ckBTC).
    pub struct StakingConfig {
        min_stake_sats: u64 = 100_000,
        max_stake_sats: u64 = 100_000_000_000,
        max_decimals: u32 = 8,

        /// Cap on total outstanding stake per user (10 ckBTC)
        max_total_per_user_sats: u64 = 1_000_000_000,

        /// Cap on new stakes per calendar day (1 ckBTC)
        max_daily_sats: u64 = 100_000_000,

        pool_ids: Vec<String> = vec![
            "stable".to_string(),
            "balanced".to_string(),
            "aggressive".to_string(),
        ],
    }
}

// ============================================================================
// NETWORK CONFIGURATION
// ============================================================================

config_struct! {
    /// Backend host and identity provider endpoints
    pub struct NetworkConfig {
        host: String = "https://ic0.app".to_string(),
        identity_provider: String = "https://identity.ic0.app".to_string(),
        backend_canister_id: String = String::new(),
    }
}

config_struct! {
    pub struct LoggingConfig {
        /// Mirror log lines into this file when set
        file_path: Option<String> = None,
    }
}
