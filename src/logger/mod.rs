//! Structured logging for the Xonora client
//!
//! This module provides a small, ergonomic logging API with:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-subsystem debug control via --debug-<tag> flags
//! - Dual output: colored console + optional file persistence
//!
//! ## Usage
//!
//! ```rust
//! use xonora::logger::{self, LogTag};
//!
//! logger::error(LogTag::Session, "Login popup closed by user");
//! logger::warning(LogTag::RateLimit, "stake budget exhausted for user");
//! logger::info(LogTag::Cache, "Cache sweeper started");
//! logger::debug(LogTag::Backend, "getPools returned 3 pools"); // Only if --debug-backend
//! ```
//!
//! ## Initialization
//!
//! Call once at startup, before any logging occurs:
//! ```rust
//! xonora::logger::init();
//! ```

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

use std::path::Path;

/// Initialize the logger from the process command line
///
/// Scans arguments for `--debug-<tag>`, `--verbose[-<tag>]` and `--quiet`.
pub fn init() {
    let args: Vec<String> = std::env::args().collect();
    config::init_from_args(&args);
}

/// Initialize the logger and mirror every line into `path`
///
/// A file that cannot be opened is reported on stderr and console logging
/// continues.
pub fn init_with_file(path: &Path) {
    init();
    file::init_file_logging(path);
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
///
/// Warnings remain visible with --quiet; only info and below are suppressed.
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level
///
/// Only shown when the matching `--debug-<tag>` flag was passed.
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (only with --verbose or --verbose-<tag>)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush pending file writes
pub fn flush() {
    file::flush_file_logging();
}
