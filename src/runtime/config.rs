//! Runtime configuration types.

use std::time::Duration;

use crate::host::{ClockMode, HostCapabilities};
use crate::scheduler::StrategyKind;
use crate::tracker::DEFAULT_GRACE_TICKS;

/// Default delay of the timer fallback strategy.
pub const DEFAULT_MIN_TIMER_DELAY: Duration = Duration::from_millis(1);

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Primitives exposed by the host (default: all of them).
    pub host: HostCapabilities,
    /// Deferral strategy to use instead of the preference table, if the
    /// host supports it.
    pub forced_strategy: Option<StrategyKind>,
    /// Scheduler ticks before an unhandled rejection is reported.
    pub unhandled_grace_ticks: u32,
    /// Delay used by the timer fallback strategy.
    pub min_timer_delay: Duration,
    /// Clock driving the event loop.
    pub clock: ClockMode,
    /// Turn budget for `run_until_idle` and `block_on` (None = unlimited).
    ///
    /// `Some(0)` is normalized to `None`. The env and TOML layers reject 0
    /// instead.
    pub max_turns: Option<u64>,
    /// Log every unhandled rejection at warn level.
    pub log_unhandled_rejections: bool,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.unhandled_grace_ticks == 0 {
            self.unhandled_grace_ticks = 1;
        }
        if self.min_timer_delay.is_zero() {
            self.min_timer_delay = DEFAULT_MIN_TIMER_DELAY;
        }
        if self.max_turns == Some(0) {
            self.max_turns = None;
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: HostCapabilities::ALL,
            forced_strategy: None,
            unhandled_grace_ticks: DEFAULT_GRACE_TICKS,
            min_timer_delay: DEFAULT_MIN_TIMER_DELAY,
            clock: ClockMode::System,
            max_turns: None,
            log_unhandled_rejections: true,
        }
    }
}
