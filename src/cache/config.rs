/// Cache configuration per dataset
///
/// Built from the `[cache.<dataset>]` sections of the config file; see
/// `CacheSettings` for the per-dataset defaults.
use crate::config::CacheSection;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Default time-to-live for entries
    pub ttl: Duration,

    /// Maximum number of entries (eviction when exceeded)
    pub max_size: usize,

    /// How often the sweeper drops expired entries
    pub cleanup_interval: Duration,
}

impl CacheConfig {
    /// Custom configuration; capacity is clamped to at least one entry
    pub fn custom(ttl_secs: u64, max_size: usize, cleanup_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            max_size: max_size.max(1),
            cleanup_interval: Duration::from_secs(cleanup_secs.max(1)),
        }
    }
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        Self::custom(section.ttl_secs, section.max_size, section.cleanup_interval_secs)
    }
}
