/// Logger configuration derived from command-line flags
use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Messages above this level are dropped
    pub min_level: LogLevel,
    /// Tags with --debug-<tag> enabled
    pub debug_tags: HashSet<String>,
    /// Tags with --verbose-<tag> enabled
    pub verbose_tags: HashSet<String>,
    /// When non-empty, only these tags log at info level
    pub enabled_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

/// Build the logger configuration from raw arguments
///
/// Recognized flags:
/// - `--debug-<tag>` / `--debug-all`
/// - `--verbose` / `--verbose-<tag>`
/// - `--quiet` (warnings and errors only)
/// - `--only-<tag>` (restrict info output to the given tags)
pub fn init_from_args(args: &[String]) {
    set_logger_config(parse_args(args));
}

pub(crate) fn parse_args(args: &[String]) -> LoggerConfig {
    let mut config = LoggerConfig::default();

    for arg in args {
        if arg == "--verbose" {
            config.min_level = LogLevel::Verbose;
        } else if arg == "--quiet" {
            config.min_level = LogLevel::Warning;
        } else if arg == "--debug-all" {
            for tag in LogTag::ALL {
                config.debug_tags.insert(tag.to_debug_key());
            }
            if config.min_level < LogLevel::Debug {
                config.min_level = LogLevel::Debug;
            }
        } else if let Some(key) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(key.to_string());
            if config.min_level < LogLevel::Debug {
                config.min_level = LogLevel::Debug;
            }
        } else if let Some(key) = arg.strip_prefix("--verbose-") {
            config.verbose_tags.insert(key.to_string());
            config.debug_tags.insert(key.to_string());
            config.min_level = LogLevel::Verbose;
        } else if let Some(key) = arg.strip_prefix("--only-") {
            config.enabled_tags.insert(key.to_string());
        }
    }

    config
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().debug_tags.contains(&tag.to_debug_key())
}

pub fn is_verbose_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().verbose_tags.contains(&tag.to_debug_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_debug_flag_enables_tag() {
        let config = parse_args(&args(&["xonora", "--debug-session"]));
        assert!(config.debug_tags.contains("session"));
        assert!(!config.debug_tags.contains("cache"));
        assert_eq!(config.min_level, LogLevel::Debug);
    }

    #[test]
    fn test_quiet_raises_threshold() {
        let config = parse_args(&args(&["xonora", "--quiet"]));
        assert_eq!(config.min_level, LogLevel::Warning);
    }

    #[test]
    fn test_debug_all_covers_every_tag() {
        let config = parse_args(&args(&["--debug-all"]));
        for tag in LogTag::ALL {
            assert!(config.debug_tags.contains(&tag.to_debug_key()));
        }
    }
}
