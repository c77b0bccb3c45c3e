//! The promise runtime.
//!
//! A [`Runtime`] bundles the services every promise depends on:
//!
//! - the [`Host`] event loop and its clock
//! - the deferred [`Scheduler`] that delivers reactions
//! - the [`RejectionTracker`] and its notification sink
//! - promise identifier allocation
//!
//! It is a cheap, clonable handle. Each runtime is isolated, so tests can
//! build their own with a virtual clock and a private tracker, while
//! [`Runtime::global`] offers a lazily created per-thread default.
//!
//! # Runtime Builder
//!
//! The runtime is configured with a fluent, move-based builder. Each builder
//! method consumes `self` and returns an updated builder.
//!
//! ```
//! use pledge::runtime::RuntimeBuilder;
//! use pledge::{Promise, Value};
//!
//! let rt = RuntimeBuilder::new().virtual_clock().build().unwrap();
//! let p = Promise::resolve(&rt, "ready");
//! assert_eq!(rt.block_on(&p), Ok(Value::from("ready")));
//! ```
//!
//! ## Config File + Environment Overrides
//!
//! ```ignore
//! use pledge::runtime::RuntimeBuilder;
//!
//! // Requires the `config-file` feature.
//! let runtime = RuntimeBuilder::from_toml("config/pledge.toml")?
//!     .with_env_overrides()?
//!     .build()?;
//! ```
//!
//! # Configuration Reference (Defaults + Notes)
//!
//! - `host`: default = every primitive. Restricting it changes which
//!   deferral strategy the scheduler selects.
//! - `forced_strategy`: default = None. Honoured only when the host has the
//!   primitive; otherwise a warning is logged and the table decides.
//! - `unhandled_grace_ticks`: default = 1. Larger windows tolerate handlers
//!   attached later, at the cost of later reports.
//! - `min_timer_delay`: default = 1 ms. Only used by the timer fallback.
//! - `clock`: default = system. `virtual` makes timers instant.
//! - `max_turns`: default = None. Bounds `run_until_idle` and `block_on`.
//! - `log_unhandled_rejections`: default = true.

pub mod builder;
pub mod config;
pub mod env_config;

pub use builder::RuntimeBuilder;
pub use config::RuntimeConfig;
pub use env_config::ConfigError;

use core::fmt;
use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::error::Error;
use crate::host::{Host, TimerId};
use crate::promise::{Promise, PromiseId, PromiseState};
use crate::scheduler::{Scheduler, StrategyKind};
use crate::tracing_compat::debug;
use crate::tracker::{RejectionEvents, RejectionTracker};
use crate::value::Value;

struct RuntimeInner {
    config: RuntimeConfig,
    host: Host,
    scheduler: Scheduler,
    tracker: RejectionTracker,
    next_promise_id: Cell<u64>,
}

/// Handle to a promise runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning runtime handle, held by promises.
///
/// The runtime's host owns queued tasks and timers, and those own promises.
/// Promises must not own the runtime in turn.
#[derive(Clone)]
pub(crate) struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

thread_local! {
    static GLOBAL: Runtime = Runtime::new();
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime from an explicit configuration.
    #[must_use]
    pub fn with_config(mut config: RuntimeConfig) -> Self {
        config.normalize();
        let host = Host::new(config.host, config.clock);
        let scheduler =
            Scheduler::new(host.clone(), config.forced_strategy, config.min_timer_delay);
        let tracker =
            RejectionTracker::new(config.unhandled_grace_ticks, config.log_unhandled_rejections);
        debug!(
            clock = ?config.clock,
            grace_ticks = config.unhandled_grace_ticks,
            "runtime created"
        );
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                host,
                scheduler,
                tracker,
                next_promise_id: Cell::new(0),
            }),
        }
    }

    /// Returns a builder with the default configuration.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from the defaults plus `PLEDGE_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        RuntimeBuilder::from_env()?.build()
    }

    /// The calling thread's default runtime, created on first use.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.with(Self::clone)
    }

    /// The normalized configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The host event loop.
    #[must_use]
    pub fn host(&self) -> &Host {
        &self.inner.host
    }

    /// The deferred scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// The unhandled-rejection tracker.
    #[must_use]
    pub fn tracker(&self) -> &RejectionTracker {
        &self.inner.tracker
    }

    /// The unhandled-rejection notification sink.
    #[must_use]
    pub fn rejections(&self) -> &RejectionEvents {
        self.inner.tracker.events()
    }

    /// The deferral strategy in use, selecting it now if needed.
    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.inner.scheduler.strategy_kind()
    }

    /// Current event loop time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.host.now()
    }

    /// Runs `task` on a later scheduler tick.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.inner.scheduler.schedule(task);
    }

    /// Runs `task` once `delay` has elapsed.
    pub fn set_timeout(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        self.inner.host.set_timeout().call(delay, task)
    }

    /// Cancels a timer that has not fired. Returns false if it was unknown.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.inner.host.clear_timeout(id)
    }

    /// Runs one event loop callback. Returns false if the loop is idle.
    pub fn turn(&self) -> bool {
        self.inner.host.turn()
    }

    /// Runs the event loop until it is idle, within the configured turn budget.
    pub fn run_until_idle(&self) -> Result<u64, Error> {
        self.inner.host.run_until_idle(self.inner.config.max_turns)
    }

    /// Drives the event loop until `promise` settles.
    ///
    /// Returns the fulfillment value, or the rejection reason as `Err`. The
    /// caller takes over the rejection, so the promise is marked handled.
    /// If the loop goes idle first the reason is a `Stalled` error; if the
    /// turn budget runs out it is a `TurnLimitExceeded` error.
    pub fn block_on(&self, promise: &Promise) -> Result<Value, Value> {
        promise.mark_handled();
        let mut ran = 0_u64;
        loop {
            match promise.state() {
                PromiseState::Fulfilled(value) => return Ok(value),
                PromiseState::Rejected(reason) => return Err(reason),
                PromiseState::Pending => {}
            }
            if let Some(limit) = self.inner.config.max_turns {
                if ran >= limit {
                    return Err(Error::turn_limit_exceeded(limit).into());
                }
            }
            if !self.turn() {
                return Err(Error::stalled(promise.id()).into());
            }
            ran += 1;
        }
    }

    /// Returns true if both handles refer to the same runtime.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn next_promise_id(&self) -> PromiseId {
        let id = self.inner.next_promise_id.get();
        self.inner.next_promise_id.set(id + 1);
        PromiseId::new(id)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("host", &self.inner.host)
            .field("scheduler", &self.inner.scheduler)
            .field("promises", &self.inner.next_promise_id.get())
            .finish()
    }
}
