//! Unhandled-rejection tracking.
//!
//! Every rejection schedules a check through the deferred scheduler. If the
//! rejected promise has been marked handled by the time the check runs, the
//! check is dropped silently; otherwise an [`UnhandledRejection`] is
//! published on the runtime's [`RejectionEvents`] sink.
//!
//! The grace window is measured in scheduler ticks ([`DEFAULT_GRACE_TICKS`]
//! by default). One tick is enough for a handler attached in the same
//! synchronous turn, or further down a chain that is still being built, to
//! mark the promise before the check runs. A report is final: attaching a
//! handler afterwards does not retract it.
//!
//! ```
//! use pledge::{Promise, Runtime};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let rt = Runtime::builder().virtual_clock().build().unwrap();
//! let reports = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&reports);
//! rt.rejections().subscribe(move |event| sink.borrow_mut().push(event.reason.clone()));
//!
//! let _ = Promise::reject(&rt, "lost");
//! rt.run_until_idle().unwrap();
//! assert_eq!(reports.borrow().len(), 1);
//! ```

use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::promise::{Promise, PromiseId};
use crate::tracing_compat::{trace, warn};
use crate::value::Value;

/// Scheduler ticks between a rejection and its unhandled check.
pub const DEFAULT_GRACE_TICKS: u32 = 1;

/// Notification published for a rejection nobody handled in time.
#[derive(Debug, Clone, PartialEq)]
pub struct UnhandledRejection {
    /// The rejected promise.
    pub promise: PromiseId,
    /// The rejection reason.
    pub reason: Value,
}

/// Handle returned by [`RejectionEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Rc<dyn Fn(&UnhandledRejection)>;

/// The unhandled-rejection notification sink.
#[derive(Default)]
pub struct RejectionEvents {
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    next_id: Cell<u64>,
}

impl RejectionEvents {
    /// Creates a sink with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber.
    pub fn subscribe(&self, subscriber: impl Fn(&UnhandledRejection) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers
            .borrow_mut()
            .push((id, Rc::new(subscriber)));
        id
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Delivers `event` to a snapshot of the current subscribers.
    pub(crate) fn publish(&self, event: &UnhandledRejection) -> usize {
        let snapshot: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, s)| Rc::clone(s))
            .collect();
        for subscriber in &snapshot {
            subscriber(event);
        }
        snapshot.len()
    }
}

impl fmt::Debug for RejectionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectionEvents")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Reconciles rejections with handler attachment.
#[derive(Debug)]
pub struct RejectionTracker {
    grace_ticks: u32,
    log_reports: bool,
    events: RejectionEvents,
    observed: Cell<u64>,
    reported: Cell<u64>,
    pending_checks: Cell<usize>,
}

impl RejectionTracker {
    /// Creates a tracker with the given grace window (at least one tick).
    #[must_use]
    pub fn new(grace_ticks: u32, log_reports: bool) -> Self {
        Self {
            grace_ticks: grace_ticks.max(1),
            log_reports,
            events: RejectionEvents::new(),
            observed: Cell::new(0),
            reported: Cell::new(0),
            pending_checks: Cell::new(0),
        }
    }

    /// The notification sink.
    #[must_use]
    pub fn events(&self) -> &RejectionEvents {
        &self.events
    }

    /// Grace window in scheduler ticks.
    #[must_use]
    pub fn grace_ticks(&self) -> u32 {
        self.grace_ticks
    }

    /// Rejections seen so far.
    #[must_use]
    pub fn observed(&self) -> u64 {
        self.observed.get()
    }

    /// Rejections reported as unhandled so far.
    #[must_use]
    pub fn reported(&self) -> u64 {
        self.reported.get()
    }

    /// Checks scheduled but not yet run.
    #[must_use]
    pub fn pending_checks(&self) -> usize {
        self.pending_checks.get()
    }

    /// Starts the grace window for a promise that just rejected.
    pub(crate) fn track(&self, promise: &Promise) {
        self.observed.set(self.observed.get() + 1);
        self.pending_checks.set(self.pending_checks.get() + 1);
        schedule_check(promise.clone(), self.grace_ticks);
    }

    fn check(&self, promise: Promise, remaining: u32) {
        if promise.is_handled() {
            self.pending_checks.set(self.pending_checks.get() - 1);
            trace!(promise = %promise.id(), "rejection handled within grace window");
            return;
        }
        if remaining > 1 {
            schedule_check(promise, remaining - 1);
            return;
        }
        self.pending_checks.set(self.pending_checks.get() - 1);
        self.reported.set(self.reported.get() + 1);

        let event = UnhandledRejection {
            promise: promise.id(),
            reason: promise.state().value().cloned().unwrap_or_default(),
        };
        if self.log_reports {
            warn!(
                promise = %event.promise,
                reason = %event.reason,
                "unhandled promise rejection"
            );
        }
        let delivered = self.events.publish(&event);
        trace!(promise = %event.promise, subscribers = delivered, "unhandled rejection published");
    }
}

fn schedule_check(promise: Promise, remaining: u32) {
    let Some(runtime) = promise.runtime() else {
        return;
    };
    runtime.schedule(move || {
        if let Some(runtime) = promise.runtime() {
            runtime.tracker().check(promise, remaining);
        }
    });
}
