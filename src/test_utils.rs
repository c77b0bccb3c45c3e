//! Test utilities for pledge.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Virtual-clock runtime constructors
//! - An environment lock for tests that mutate `PLEDGE_*` variables

use crate::host::ClockMode;
use crate::runtime::{Runtime, RuntimeConfig};
use std::sync::{Mutex, Once};

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the global environment lock for tests that mutate env vars.
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Default configuration with a virtual clock.
pub(crate) fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        clock: ClockMode::Virtual,
        ..RuntimeConfig::default()
    }
}

/// Create an isolated runtime driven by a virtual clock.
pub(crate) fn test_runtime() -> Runtime {
    Runtime::with_config(test_config())
}
