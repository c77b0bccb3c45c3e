//! Environment variable and config file support for
//! [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods (`grace_ticks(2)`)
//! 2. **Environment variables**: values from `PLEDGE_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`RuntimeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PLEDGE_HOST_CAPABILITIES` | comma list | `host` |
//! | `PLEDGE_DEFER_STRATEGY` | strategy name | `forced_strategy` |
//! | `PLEDGE_UNHANDLED_GRACE_TICKS` | `u32` | `unhandled_grace_ticks` |
//! | `PLEDGE_MIN_TIMER_DELAY_MS` | `u64` | `min_timer_delay` |
//! | `PLEDGE_CLOCK` | `system`/`virtual` | `clock` |
//! | `PLEDGE_MAX_TURNS` | `u64` | `max_turns` |
//! | `PLEDGE_LOG_UNHANDLED` | `bool` | `log_unhandled_rejections` |

use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::host::{ClockMode, HostCapabilities};
use crate::runtime::config::RuntimeConfig;
use crate::scheduler::StrategyKind;

/// Environment variable name for the host capability list.
pub const ENV_HOST_CAPABILITIES: &str = "PLEDGE_HOST_CAPABILITIES";
/// Environment variable name for the forced deferral strategy.
pub const ENV_DEFER_STRATEGY: &str = "PLEDGE_DEFER_STRATEGY";
/// Environment variable name for the unhandled-rejection grace window.
pub const ENV_UNHANDLED_GRACE_TICKS: &str = "PLEDGE_UNHANDLED_GRACE_TICKS";
/// Environment variable name for the timer fallback delay in milliseconds.
pub const ENV_MIN_TIMER_DELAY_MS: &str = "PLEDGE_MIN_TIMER_DELAY_MS";
/// Environment variable name for the clock mode.
pub const ENV_CLOCK: &str = "PLEDGE_CLOCK";
/// Environment variable name for the event loop turn budget.
pub const ENV_MAX_TURNS: &str = "PLEDGE_MAX_TURNS";
/// Environment variable name for unhandled-rejection logging.
pub const ENV_LOG_UNHANDLED: &str = "PLEDGE_LOG_UNHANDLED";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable or key was set to an unparseable value.
    #[error("invalid value for {name}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable or key name.
        name: String,
        /// Description of the accepted values.
        expected: &'static str,
        /// The rejected input.
        value: String,
    },
    /// The config file could not be read.
    #[error("failed to read config file {path}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse TOML config: {0}")]
    Parse(String),
}

impl ConfigError {
    fn invalid(name: &str, expected: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            expected,
            value: value.to_string(),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::InvalidConfig)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, read_env)
}

/// Apply overrides from an arbitrary variable source.
///
/// `lookup` returns the value of a variable, or `None` if it is unset.
pub fn apply_overrides_from<F>(config: &mut RuntimeConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_HOST_CAPABILITIES) {
        config.host = parse_capabilities(ENV_HOST_CAPABILITIES, &val)?;
    }
    if let Some(val) = lookup(ENV_DEFER_STRATEGY) {
        config.forced_strategy = Some(parse_strategy(ENV_DEFER_STRATEGY, &val)?);
    }
    if let Some(val) = lookup(ENV_UNHANDLED_GRACE_TICKS) {
        config.unhandled_grace_ticks = parse_u32(ENV_UNHANDLED_GRACE_TICKS, &val)?;
    }
    if let Some(val) = lookup(ENV_MIN_TIMER_DELAY_MS) {
        config.min_timer_delay = Duration::from_millis(parse_u64(ENV_MIN_TIMER_DELAY_MS, &val)?);
    }
    if let Some(val) = lookup(ENV_CLOCK) {
        config.clock = parse_clock(ENV_CLOCK, &val)?;
    }
    if let Some(val) = lookup(ENV_MAX_TURNS) {
        config.max_turns = Some(parse_turn_budget(ENV_MAX_TURNS, &val)?);
    }
    if let Some(val) = lookup(ENV_LOG_UNHANDLED) {
        config.log_unhandled_rejections = parse_bool(ENV_LOG_UNHANDLED, &val)?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_u32(name: &str, val: &str) -> Result<u32, ConfigError> {
    val.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::invalid(name, "u32", val))
}

fn parse_u64(name: &str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(name, "unsigned integer", val))
}

/// Accepts positive turn budgets only. 0 is an error, not "unlimited".
fn parse_turn_budget(name: &str, val: &str) -> Result<u64, ConfigError> {
    match val.trim().parse::<u64>() {
        Ok(turns) if turns > 0 => Ok(turns),
        _ => Err(ConfigError::invalid(name, "positive integer", val)),
    }
}

fn parse_bool(name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            name,
            "bool (true/false/1/0/yes/no)",
            val,
        )),
    }
}

fn parse_strategy(name: &str, val: &str) -> Result<StrategyKind, ConfigError> {
    StrategyKind::parse(val).ok_or_else(|| {
        ConfigError::invalid(
            name,
            "immediate, message-channel, post-message or timeout",
            val,
        )
    })
}

fn parse_clock(name: &str, val: &str) -> Result<ClockMode, ConfigError> {
    ClockMode::parse(val).ok_or_else(|| ConfigError::invalid(name, "system or virtual", val))
}

fn parse_capabilities(name: &str, val: &str) -> Result<HostCapabilities, ConfigError> {
    HostCapabilities::parse_list(val).map_err(|_| {
        ConfigError::invalid(
            name,
            "comma list of immediate, message-channel, post-message, or a lone all or none",
            val,
        )
    })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable runtime configuration.
///
/// Fields are grouped into TOML tables:
///
/// ```toml
/// [scheduler]
/// host_capabilities = ["message-channel", "post-message"]
/// strategy = "post-message"
/// min_timer_delay_ms = 4
///
/// [tracker]
/// grace_ticks = 2
/// log_unhandled = false
///
/// [event_loop]
/// clock = "virtual"
/// max_turns = 100000
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct RuntimeTomlConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerToml,
    /// Unhandled-rejection tracker settings.
    #[serde(default)]
    pub tracker: TrackerToml,
    /// Event loop settings.
    #[serde(default)]
    pub event_loop: EventLoopToml,
}

/// Scheduler section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SchedulerToml {
    /// Primitives exposed by the host.
    pub host_capabilities: Option<Vec<String>>,
    /// Forced deferral strategy.
    pub strategy: Option<String>,
    /// Timer fallback delay in milliseconds.
    pub min_timer_delay_ms: Option<u64>,
}

/// Tracker section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct TrackerToml {
    /// Grace window in scheduler ticks.
    pub grace_ticks: Option<u32>,
    /// Log unhandled rejections.
    pub log_unhandled: Option<bool>,
}

/// Event loop section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct EventLoopToml {
    /// `system` or `virtual`.
    pub clock: Option<String>,
    /// Turn budget.
    pub max_turns: Option<u64>,
}

/// Apply a parsed TOML config to a [`RuntimeConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(
    config: &mut RuntimeConfig,
    toml: &RuntimeTomlConfig,
) -> Result<(), ConfigError> {
    if let Some(ref names) = toml.scheduler.host_capabilities {
        config.host = parse_capabilities("scheduler.host_capabilities", &names.join(","))?;
    }
    if let Some(ref v) = toml.scheduler.strategy {
        config.forced_strategy = Some(parse_strategy("scheduler.strategy", v)?);
    }
    if let Some(v) = toml.scheduler.min_timer_delay_ms {
        config.min_timer_delay = Duration::from_millis(v);
    }
    if let Some(v) = toml.tracker.grace_ticks {
        config.unhandled_grace_ticks = v;
    }
    if let Some(v) = toml.tracker.log_unhandled {
        config.log_unhandled_rejections = v;
    }
    if let Some(ref v) = toml.event_loop.clock {
        config.clock = parse_clock("event_loop.clock", v)?;
    }
    if let Some(v) = toml.event_loop.max_turns {
        if v == 0 {
            return Err(ConfigError::invalid("event_loop.max_turns", "positive integer", "0"));
        }
        config.max_turns = Some(v);
    }
    Ok(())
}

/// Parse a TOML string into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<RuntimeTomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Read and parse a TOML file into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<RuntimeTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml_str(&content)
}

// =========================================================================
// Tests
// =========================================================================
