#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! #[macro_use]
//! mod common;
//! use common::*;
//! ```

use pledge::{
    ClockMode, HostCapabilities, Promise, Runtime, RuntimeBuilder, StrategyKind,
    UnhandledRejection, Value,
};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "PLEDGE_PROPTEST_SEED";

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// Runtime with a virtual clock and every host primitive.
#[must_use]
pub fn test_runtime() -> Runtime {
    RuntimeBuilder::new()
        .virtual_clock()
        .build()
        .expect("failed to build test runtime")
}

/// Runtime with a virtual clock whose host only exposes `caps`.
#[must_use]
pub fn runtime_with_host(caps: HostCapabilities) -> Runtime {
    RuntimeBuilder::new()
        .clock(ClockMode::Virtual)
        .host_capabilities(caps)
        .build()
        .expect("failed to build test runtime")
}

/// Runtime with a virtual clock using exactly one deferral strategy.
#[must_use]
pub fn runtime_with_strategy(kind: StrategyKind) -> Runtime {
    let caps = match kind {
        StrategyKind::Immediate => HostCapabilities {
            set_immediate: true,
            ..HostCapabilities::TIMERS_ONLY
        },
        StrategyKind::MessageChannel => HostCapabilities {
            message_channel: true,
            ..HostCapabilities::TIMERS_ONLY
        },
        StrategyKind::PostMessage => HostCapabilities {
            post_message: true,
            ..HostCapabilities::TIMERS_ONLY
        },
        StrategyKind::Timeout => HostCapabilities::TIMERS_ONLY,
    };
    runtime_with_host(caps)
}

/// Shared, append-only log for ordering assertions.
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
}

/// Subscribes to unhandled-rejection reports on `rt` and collects them.
#[must_use]
pub fn collect_unhandled(rt: &Runtime) -> Rc<RefCell<Vec<UnhandledRejection>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    rt.rejections()
        .subscribe(move |event| sink.borrow_mut().push(event.clone()));
    seen
}

/// A promise fulfilled with `value` after `ms` milliseconds of loop time.
#[must_use]
pub fn resolve_after(rt: &Runtime, ms: u64, value: impl Into<Value>) -> Promise {
    let value = value.into();
    let timers = rt.clone();
    Promise::new(rt, move |resolve, _| {
        timers.set_timeout(Duration::from_millis(ms), move || {
            resolve.call(value);
        });
        Ok(())
    })
}

/// A promise rejected with `reason` after `ms` milliseconds of loop time.
#[must_use]
pub fn reject_after(rt: &Runtime, ms: u64, reason: impl Into<Value>) -> Promise {
    let reason = reason.into();
    let timers = rt.clone();
    Promise::new(rt, move |_, reject| {
        timers.set_timeout(Duration::from_millis(ms), move || {
            reject.call(reason);
        });
        Ok(())
    })
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}
