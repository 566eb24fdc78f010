use super::schemas::Config;
/// Configuration utilities - loading, validation, and access helpers
///
/// Library components receive their config sections by value; the global
/// `CONFIG` cell exists for the binary and for code that only needs a quick
/// read.
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::path::Path;

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Load a configuration file without touching global state
///
/// A missing file yields the defaults; a malformed one is an error.
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<Config, String> {
    let path = path.as_ref();
    let config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        toml::from_str::<Config>(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?
    } else {
        Config::default()
    };

    validate_config(&config)?;
    Ok(config)
}

/// Load configuration and install it as the global CONFIG
///
/// Calling this twice replaces the previous configuration.
pub fn init_config(path: impl AsRef<Path>) -> Result<Config, String> {
    let config = load_config_from_path(path)?;
    install_config(config.clone());
    Ok(config)
}

pub fn install_config(config: Config) {
    match CONFIG.get() {
        Some(lock) => *lock.write() = config,
        None => {
            if let Err(rejected) = CONFIG.set(RwLock::new(config)) {
                // Lost an initialization race; overwrite with our value
                if let Some(lock) = CONFIG.get() {
                    *lock.write() = rejected.into_inner();
                }
            }
        }
    }
}

/// Execute a function with read access to the configuration
///
/// Falls back to defaults when nothing was loaded.
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    let lock = CONFIG.get_or_init(|| RwLock::new(Config::default()));
    let config = lock.read();
    f(&config)
}

/// Get a clone of the entire configuration
///
/// Useful when values must be held across await points.
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Write a configuration to disk as pretty TOML
pub fn save_config(config: &Config, path: impl AsRef<Path>) -> Result<(), String> {
    let path = path.as_ref();
    let contents = toml::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
        }
    }

    std::fs::write(path, contents)
        .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))
}

/// Reject configurations the components cannot run with
pub fn validate_config(config: &Config) -> Result<(), String> {
    let caches = [
        ("cache.pools", &config.cache.pools),
        ("cache.portfolio", &config.cache.portfolio),
        ("cache.stakes", &config.cache.stakes),
        ("cache.system_info", &config.cache.system_info),
        ("cache.whoami", &config.cache.whoami),
    ];
    for (name, section) in caches {
        if section.max_size == 0 {
            return Err(format!("{}.max_size must be at least 1", name));
        }
        if section.cleanup_interval_secs == 0 {
            return Err(format!("{}.cleanup_interval_secs must be positive", name));
        }
    }

    let limits = [
        ("rate_limits.stake", &config.rate_limits.stake),
        ("rate_limits.unstake", &config.rate_limits.unstake),
        ("rate_limits.query", &config.rate_limits.query),
        ("rate_limits.auth", &config.rate_limits.auth),
        ("rate_limits.global", &config.rate_limits.global),
    ];
    for (name, policy) in limits {
        if policy.window_secs == 0 {
            return Err(format!("{}.window_secs must be positive", name));
        }
        if policy.max_requests == 0 {
            return Err(format!("{}.max_requests must be at least 1", name));
        }
    }

    if config.session.max_retry_attempts == 0 {
        return Err("session.max_retry_attempts must be at least 1".to_string());
    }
    if config.session.resync_enabled && config.session.resync_interval_secs == 0 {
        return Err("session.resync_interval_secs must be positive".to_string());
    }

    let staking = &config.staking;
    if staking.min_stake_sats == 0 || staking.min_stake_sats > staking.max_stake_sats {
        return Err("staking.min_stake_sats must be positive and <= max_stake_sats".to_string());
    }
    if staking.max_decimals > 8 {
        return Err("staking.max_decimals cannot exceed 8".to_string());
    }
    if staking.pool_ids.is_empty() {
        return Err("staking.pool_ids cannot be empty".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.pools.ttl_secs, 120);
        assert_eq!(config.rate_limits.unstake.max_requests, 5);
        assert_eq!(config.session.max_retry_attempts, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rate_limits.stake]\nmax_requests = 3\n\n[session]\nresync_interval_secs = 10"
        )
        .unwrap();

        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.rate_limits.stake.max_requests, 3);
        assert_eq!(config.rate_limits.stake.window_secs, 60);
        assert_eq!(config.session.resync_interval_secs, 10);
        assert_eq!(config.cache.stakes.ttl_secs, 30);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache.pools\nttl_secs = ").unwrap();
        let err = load_config_from_path(file.path()).unwrap_err();
        assert!(err.contains("Failed to parse"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.cache.system_info.max_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("cache.system_info.max_size"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.network.backend_canister_id = "uxrrr-q7777-77774-qaaaq-cai".to_string();
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.network.backend_canister_id, "uxrrr-q7777-77774-qaaaq-cai");
    }
}
