/// Subsystem tags attached to every log line

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Cache,
    RateLimit,
    Validation,
    Session,
    Backend,
    Monitor,
    Service,
}

impl LogTag {
    /// All tags, in display order
    pub const ALL: [LogTag; 9] = [
        LogTag::System,
        LogTag::Config,
        LogTag::Cache,
        LogTag::RateLimit,
        LogTag::Validation,
        LogTag::Session,
        LogTag::Backend,
        LogTag::Monitor,
        LogTag::Service,
    ];

    /// Key used by `--debug-<key>` / `--verbose-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Cache => "cache",
            LogTag::RateLimit => "rate-limit",
            LogTag::Validation => "validation",
            LogTag::Session => "session",
            LogTag::Backend => "backend",
            LogTag::Monitor => "monitor",
            LogTag::Service => "service",
        }
        .to_string()
    }

    /// Uppercase label without color, used for file output
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Cache => "CACHE",
            LogTag::RateLimit => "RATELIMIT",
            LogTag::Validation => "VALIDATE",
            LogTag::Session => "SESSION",
            LogTag::Backend => "BACKEND",
            LogTag::Monitor => "MONITOR",
            LogTag::Service => "SERVICE",
        }
        .to_string()
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
