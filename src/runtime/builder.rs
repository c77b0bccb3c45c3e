//! Runtime builder.

use std::time::Duration;

use crate::error::Error;
use crate::host::{ClockMode, HostCapabilities};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::env_config;
use crate::runtime::Runtime;
use crate::scheduler::StrategyKind;

/// Builder for constructing a runtime with custom configuration.
///
/// Later calls override earlier ones, so configuration sources are layered
/// by calling them in order: file, then environment, then explicit setters.
///
/// ```
/// use pledge::runtime::RuntimeBuilder;
/// use pledge::StrategyKind;
///
/// let rt = RuntimeBuilder::new()
///     .virtual_clock()
///     .force_strategy(StrategyKind::PostMessage)
///     .grace_ticks(2)
///     .build()
///     .unwrap();
/// assert_eq!(rt.strategy(), StrategyKind::PostMessage);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub fn from_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Start from the defaults plus `PLEDGE_*` environment overrides.
    pub fn from_env() -> Result<Self, Error> {
        Self::new().with_env_overrides()
    }

    /// Apply `PLEDGE_*` environment variables on top of the current values.
    pub fn with_env_overrides(mut self) -> Result<Self, Error> {
        env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Start from a TOML config file.
    #[cfg(feature = "config-file")]
    pub fn from_toml(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let toml = env_config::parse_toml_file(path.as_ref())?;
        let mut config = RuntimeConfig::default();
        env_config::apply_toml_config(&mut config, &toml)?;
        Ok(Self { config })
    }

    /// Start from TOML text.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(toml: &str) -> Result<Self, Error> {
        let parsed = env_config::parse_toml_str(toml)?;
        let mut config = RuntimeConfig::default();
        env_config::apply_toml_config(&mut config, &parsed)?;
        Ok(Self { config })
    }

    /// Set the primitives the host exposes.
    #[must_use]
    pub fn host_capabilities(mut self, caps: HostCapabilities) -> Self {
        self.config.host = caps;
        self
    }

    /// Use `kind` instead of the preference table when the host supports it.
    #[must_use]
    pub fn force_strategy(mut self, kind: StrategyKind) -> Self {
        self.config.forced_strategy = Some(kind);
        self
    }

    /// Set the unhandled-rejection grace window in scheduler ticks.
    #[must_use]
    pub fn grace_ticks(mut self, ticks: u32) -> Self {
        self.config.unhandled_grace_ticks = ticks;
        self
    }

    /// Set the delay of the timer fallback strategy.
    #[must_use]
    pub fn min_timer_delay(mut self, delay: Duration) -> Self {
        self.config.min_timer_delay = delay;
        self
    }

    /// Choose the clock driving the event loop.
    #[must_use]
    pub fn clock(mut self, clock: ClockMode) -> Self {
        self.config.clock = clock;
        self
    }

    /// Shorthand for `clock(ClockMode::Virtual)`.
    #[must_use]
    pub fn virtual_clock(self) -> Self {
        self.clock(ClockMode::Virtual)
    }

    /// Bound the number of turns `run_until_idle` and `block_on` may run.
    ///
    /// A budget of 0 means unlimited.
    #[must_use]
    pub fn max_turns(mut self, turns: u64) -> Self {
        self.config.max_turns = Some(turns);
        self
    }

    /// Enable or disable warn-level logging of unhandled rejections.
    #[must_use]
    pub fn log_unhandled_rejections(mut self, enable: bool) -> Self {
        self.config.log_unhandled_rejections = enable;
        self
    }

    /// The configuration built so far.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build a runtime from this configuration.
    pub fn build(self) -> Result<Runtime, Error> {
        Ok(Runtime::with_config(self.config))
    }
}
