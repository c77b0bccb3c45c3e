//! Deferred scheduler.
//!
//! Exposes one operation, [`Scheduler::schedule`], with a fixed contract:
//!
//! - the callback runs later than the current synchronous execution, never
//!   inline, even when scheduled from inside another deferred callback
//! - callbacks run in the order they were scheduled (FIFO)
//! - every call fires exactly once; calls are never coalesced
//!
//! The primitive behind it is chosen from [`STRATEGY_TABLE`], an ordered list
//! of probe-and-construct entries evaluated once, on first use, and cached:
//!
//! 1. [`StrategyKind::Immediate`]: true deferred task
//! 2. [`StrategyKind::MessageChannel`]: message round-trip through the event queue
//! 3. [`StrategyKind::PostMessage`]: broadcast post-and-listen
//! 4. [`StrategyKind::Timeout`]: minimal-delay timer (always available)
//!
//! Each fallback costs more latency than the one before it.

pub mod strategy;

pub use strategy::{
    ImmediateStrategy, MessageChannelStrategy, PostMessageStrategy, TimeoutStrategy,
    DEFER_MESSAGE,
};

use crate::host::{Host, Task};
use crate::tracing_compat::{debug, warn};
use core::fmt;
use std::cell::{Cell, OnceCell};
use std::time::Duration;

/// The deferral primitive behind a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// The host's true deferred-task primitive.
    Immediate,
    /// A message channel round-trip.
    MessageChannel,
    /// A broadcast post-and-listen round-trip.
    PostMessage,
    /// A minimal-delay timer.
    Timeout,
}

impl StrategyKind {
    /// Stable name used in configuration and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::MessageChannel => "message-channel",
            Self::PostMessage => "post-message",
            Self::Timeout => "timeout",
        }
    }

    /// Parses a strategy name (see [`StrategyKind::name`]).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "immediate" | "set-immediate" => Some(Self::Immediate),
            "message-channel" => Some(Self::MessageChannel),
            "post-message" => Some(Self::PostMessage),
            "timeout" | "set-timeout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A "run this callback later" capability.
pub trait DeferStrategy {
    /// Which primitive this strategy uses.
    fn kind(&self) -> StrategyKind;

    /// Arranges for `task` to run on a later turn, after every task deferred before it.
    fn defer(&self, task: Task);
}

/// One entry of the capability table.
pub struct StrategyEntry {
    /// The strategy this entry builds.
    pub kind: StrategyKind,
    /// Probes the host and constructs the strategy, or returns `None` if the
    /// primitive is missing.
    pub build: fn(&Host, Duration) -> Option<Box<dyn DeferStrategy>>,
}

/// Strategies in order of preference.
pub const STRATEGY_TABLE: [StrategyEntry; 4] = [
    StrategyEntry {
        kind: StrategyKind::Immediate,
        build: build_immediate,
    },
    StrategyEntry {
        kind: StrategyKind::MessageChannel,
        build: build_message_channel,
    },
    StrategyEntry {
        kind: StrategyKind::PostMessage,
        build: build_post_message,
    },
    StrategyEntry {
        kind: StrategyKind::Timeout,
        build: build_timeout,
    },
];

fn build_immediate(host: &Host, _: Duration) -> Option<Box<dyn DeferStrategy>> {
    let api = host.set_immediate()?;
    Some(Box::new(ImmediateStrategy::new(api)))
}

fn build_message_channel(host: &Host, _: Duration) -> Option<Box<dyn DeferStrategy>> {
    let api = host.message_channel()?;
    Some(Box::new(MessageChannelStrategy::new(api)))
}

fn build_post_message(host: &Host, _: Duration) -> Option<Box<dyn DeferStrategy>> {
    let window = host.window()?;
    Some(Box::new(PostMessageStrategy::new(window)))
}

fn build_timeout(host: &Host, delay: Duration) -> Option<Box<dyn DeferStrategy>> {
    Some(Box::new(TimeoutStrategy::new(host.set_timeout(), delay)))
}

/// Picks the cheapest strategy the host supports.
///
/// A `forced` kind wins when the host supports it; otherwise a warning is
/// logged and the table decides.
#[must_use]
pub fn select_strategy(
    host: &Host,
    forced: Option<StrategyKind>,
    min_timer_delay: Duration,
) -> Box<dyn DeferStrategy> {
    if let Some(kind) = forced {
        let entry = STRATEGY_TABLE.iter().find(|e| e.kind == kind);
        if let Some(strategy) = entry.and_then(|e| (e.build)(host, min_timer_delay)) {
            debug!(strategy = kind.name(), "forced deferred strategy selected");
            return strategy;
        }
        warn!(
            strategy = kind.name(),
            "forced deferred strategy unavailable on this host, falling back"
        );
    }

    let strategy: Box<dyn DeferStrategy> = match STRATEGY_TABLE
        .iter()
        .find_map(|e| (e.build)(host, min_timer_delay))
    {
        Some(strategy) => strategy,
        None => Box::new(TimeoutStrategy::new(host.set_timeout(), min_timer_delay)),
    };
    debug!(strategy = strategy.kind().name(), "deferred strategy selected");
    strategy
}

/// The deferred scheduler: a lazily selected, cached strategy.
pub struct Scheduler {
    host: Host,
    forced: Option<StrategyKind>,
    min_timer_delay: Duration,
    strategy: OnceCell<Box<dyn DeferStrategy>>,
    scheduled: Cell<u64>,
}

impl Scheduler {
    /// Creates a scheduler over `host`. Nothing is probed until first use.
    #[must_use]
    pub fn new(host: Host, forced: Option<StrategyKind>, min_timer_delay: Duration) -> Self {
        Self {
            host,
            forced,
            min_timer_delay,
            strategy: OnceCell::new(),
            scheduled: Cell::new(0),
        }
    }

    /// Runs `task` on a later turn.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.scheduled.set(self.scheduled.get() + 1);
        self.strategy().defer(Box::new(task));
    }

    /// The selected strategy, selecting it now if this is the first use.
    #[must_use]
    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy().kind()
    }

    /// Returns true once a strategy has been selected.
    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.strategy.get().is_some()
    }

    /// Total callbacks scheduled.
    #[must_use]
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled.get()
    }

    /// The host this scheduler defers onto.
    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    fn strategy(&self) -> &dyn DeferStrategy {
        self.strategy
            .get_or_init(|| select_strategy(&self.host, self.forced, self.min_timer_delay))
            .as_ref()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("strategy", &self.strategy.get().map(|s| s.kind()))
            .field("scheduled", &self.scheduled.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClockMode, HostCapabilities};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn host(caps: HostCapabilities) -> Host {
        Host::new(caps, ClockMode::Virtual)
    }

    fn only(kind: StrategyKind) -> HostCapabilities {
        let mut caps = HostCapabilities::TIMERS_ONLY;
        match kind {
            StrategyKind::Immediate => caps.set_immediate = true,
            StrategyKind::MessageChannel => caps.message_channel = true,
            StrategyKind::PostMessage => caps.post_message = true,
            StrategyKind::Timeout => {}
        }
        caps
    }

    const ALL_KINDS: [StrategyKind; 4] = [
        StrategyKind::Immediate,
        StrategyKind::MessageChannel,
        StrategyKind::PostMessage,
        StrategyKind::Timeout,
    ];

    #[test]
    fn table_prefers_cheapest_primitive() {
        let none = Duration::from_millis(1);
        assert_eq!(
            select_strategy(&host(HostCapabilities::ALL), None, none).kind(),
            StrategyKind::Immediate
        );
        let caps = HostCapabilities {
            set_immediate: false,
            ..HostCapabilities::ALL
        };
        assert_eq!(
            select_strategy(&host(caps), None, none).kind(),
            StrategyKind::MessageChannel
        );
        assert_eq!(
            select_strategy(&host(only(StrategyKind::PostMessage)), None, none).kind(),
            StrategyKind::PostMessage
        );
        assert_eq!(
            select_strategy(&host(HostCapabilities::TIMERS_ONLY), None, none).kind(),
            StrategyKind::Timeout
        );
    }

    #[test]
    fn forced_strategy_falls_back_when_unsupported() {
        let delay = Duration::from_millis(1);
        let h = host(HostCapabilities::ALL);
        assert_eq!(
            select_strategy(&h, Some(StrategyKind::PostMessage), delay).kind(),
            StrategyKind::PostMessage
        );
        let h = host(HostCapabilities::TIMERS_ONLY);
        assert_eq!(
            select_strategy(&h, Some(StrategyKind::MessageChannel), delay).kind(),
            StrategyKind::Timeout
        );
    }

    #[test]
    fn every_strategy_fires_once_per_call_in_order() {
        for kind in ALL_KINDS {
            let h = host(only(kind));
            let sched = Scheduler::new(h.clone(), None, Duration::from_millis(1));
            assert_eq!(sched.strategy_kind(), kind);

            let log = Rc::new(RefCell::new(Vec::new()));
            for n in 0..3 {
                let log = Rc::clone(&log);
                sched.schedule(move || log.borrow_mut().push(n));
            }
            assert!(log.borrow().is_empty(), "{kind} ran a task inline");
            h.run_until_idle(Some(100)).unwrap();
            assert_eq!(*log.borrow(), vec![0, 1, 2], "{kind} order");
            assert_eq!(sched.scheduled_count(), 3);
        }
    }

    #[test]
    fn nested_schedule_is_not_inline() {
        for kind in ALL_KINDS {
            let h = host(only(kind));
            let sched = Rc::new(Scheduler::new(h.clone(), None, Duration::from_millis(1)));
            let log = Rc::new(RefCell::new(Vec::new()));

            let inner_sched = Rc::clone(&sched);
            let outer_log = Rc::clone(&log);
            sched.schedule(move || {
                let inner_log = Rc::clone(&outer_log);
                inner_sched.schedule(move || inner_log.borrow_mut().push("inner"));
                outer_log.borrow_mut().push("outer-end");
            });
            let sibling_log = Rc::clone(&log);
            sched.schedule(move || sibling_log.borrow_mut().push("sibling"));

            h.run_until_idle(Some(100)).unwrap();
            assert_eq!(
                *log.borrow(),
                vec!["outer-end", "sibling", "inner"],
                "{kind}"
            );
        }
    }

    #[test]
    fn selection_is_lazy_and_cached() {
        let h = host(HostCapabilities::ALL);
        let sched = Scheduler::new(h, None, Duration::from_millis(1));
        assert!(!sched.is_selected());
        sched.schedule(|| {});
        assert!(sched.is_selected());
        assert_eq!(sched.strategy_kind(), StrategyKind::Immediate);
    }

    #[test]
    fn message_strategies_clean_up_after_firing() {
        let h = host(only(StrategyKind::PostMessage));
        let sched = Scheduler::new(h.clone(), None, Duration::from_millis(1));
        sched.schedule(|| {});
        sched.schedule(|| {});
        let window = h.window().unwrap();
        assert_eq!(window.listener_count(), 2);
        h.run_until_idle(None).unwrap();
        assert_eq!(window.listener_count(), 0);
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in ALL_KINDS {
            assert_eq!(StrategyKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(StrategyKind::parse("set_immediate"), Some(StrategyKind::Immediate));
        assert_eq!(StrategyKind::parse("smoke-signal"), None);
    }
}
