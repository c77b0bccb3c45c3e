//! The promise state machine.
//!
//! A [`Promise`] starts pending and settles exactly once, either fulfilled
//! with a value or rejected with a reason. Continuations registered with
//! [`Promise::then`] and friends are always delivered through the runtime's
//! deferred scheduler, never inline, even when the promise is already
//! settled at registration time.
//!
//! # Handled marking
//!
//! Registering any reaction marks a promise as handled. A reaction that has
//! no rejection handler forwards the reason to its derived promise, which is
//! tracked on its own, so a rejection handler attached several links down a
//! chain still accounts for the original rejection.
//!
//! # Example
//!
//! ```
//! use pledge::{Promise, Runtime, Value};
//!
//! let rt = Runtime::builder().virtual_clock().build().unwrap();
//! let doubled = Promise::resolve(&rt, 21).then(|v| match v {
//!     Value::Int(n) => Ok(Value::Int(n * 2)),
//!     other => Err(other),
//! });
//! assert_eq!(rt.block_on(&doubled), Ok(Value::Int(42)));
//! ```

mod reaction;
mod resolve;
mod settle;

pub use reaction::Handler;
pub use settle::Settle;

use core::fmt;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{panic_message, Error};
use crate::runtime::{Runtime, WeakRuntime};
use crate::tracing_compat::{debug, trace};
use crate::value::Value;
use reaction::{Reaction, Settlement};

/// Identifier of a promise, unique within its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    /// Identifier of promises derived after their runtime was dropped.
    pub const DETACHED: Self = Self(u64::MAX);

    pub(crate) const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}

/// Snapshot of a promise's state.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled(Value),
    /// Settled with a reason.
    Rejected(Value),
}

impl PromiseState {
    /// Returns true if the promise has not settled.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true if the promise fulfilled.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Returns true if the promise rejected.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns true once the promise is fulfilled or rejected.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The fulfillment value or rejection reason, once settled.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Pending => None,
            Self::Fulfilled(v) | Self::Rejected(v) => Some(v),
        }
    }
}

struct PromiseRecord {
    state: PromiseState,
    reactions: SmallVec<[Reaction; 1]>,
    handled: bool,
}

struct PromiseInner {
    id: PromiseId,
    runtime: WeakRuntime,
    record: RefCell<PromiseRecord>,
}

/// A deferred value.
///
/// Cloning yields another handle to the same promise.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<PromiseInner>,
}

impl Promise {
    /// Creates a promise and runs `producer` synchronously.
    ///
    /// The producer receives the resolve and reject functions. Returning
    /// `Err` or panicking before either was called rejects the promise;
    /// after settlement, both are ignored.
    pub fn new<F>(runtime: &Runtime, producer: F) -> Self
    where
        F: FnOnce(Settle, Settle) -> Result<(), Value>,
    {
        let promise = Self::pending(runtime);
        let (resolve, reject) = Settle::pair(&promise);
        let guard = reject.clone();
        let outcome = match catch_unwind(AssertUnwindSafe(|| producer(resolve, reject))) {
            Ok(result) => result,
            Err(payload) => Err(Error::handler_panicked(panic_message(payload.as_ref())).into()),
        };
        if let Err(reason) = outcome {
            guard.call(reason);
        }
        promise
    }

    /// Returns `value` itself when it is a native promise, otherwise a new
    /// promise resolved with it (thenables are adopted).
    pub fn resolve(runtime: &Runtime, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Value::Promise(p) = value {
            return p;
        }
        let promise = Self::pending(runtime);
        promise.resolve_with(value);
        promise
    }

    /// Returns a promise rejected with `reason`; the reason is never unwrapped.
    pub fn reject(runtime: &Runtime, reason: impl Into<Value>) -> Self {
        let promise = Self::pending(runtime);
        promise.reject_with(reason.into());
        promise
    }

    pub(crate) fn pending(runtime: &Runtime) -> Self {
        Self::with_id(runtime.next_promise_id(), runtime.downgrade())
    }

    fn with_id(id: PromiseId, runtime: WeakRuntime) -> Self {
        Self {
            inner: Rc::new(PromiseInner {
                id,
                runtime,
                record: RefCell::new(PromiseRecord {
                    state: PromiseState::Pending,
                    reactions: SmallVec::new(),
                    handled: false,
                }),
            }),
        }
    }

    /// Returns this promise's identifier.
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    /// Returns the runtime this promise was created on.
    ///
    /// A promise does not keep its runtime alive. Once every [`Runtime`]
    /// handle is dropped this returns `None`, and the promise is inert:
    /// new reactions are discarded and never run.
    #[must_use]
    pub fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade()
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        self.inner.record.borrow().state.clone()
    }

    /// Returns true if the promise has not settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.record.borrow().state.is_pending()
    }

    /// Returns true once any reaction has been registered.
    ///
    /// Any reaction counts, not only one with a rejection handler. A
    /// reaction without one forwards the reason to its derived promise, so
    /// for `p.then(f)` on a rejecting `p` the unhandled report names the
    /// promise returned by `then`, not `p`.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.inner.record.borrow().handled
    }

    /// Number of reactions waiting for settlement.
    #[must_use]
    pub fn pending_reactions(&self) -> usize {
        self.inner.record.borrow().reactions.len()
    }

    /// Returns true if both handles refer to the same promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers a fulfillment handler.
    ///
    /// Rejections pass through to the returned promise unchanged.
    pub fn then<F>(&self, on_fulfilled: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.then_with(Some(Box::new(on_fulfilled)), None)
    }

    /// Registers a fulfillment handler and a rejection handler.
    pub fn then_or_else<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Self
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
        R: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.then_with(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    /// Registers a rejection handler.
    ///
    /// Fulfillment values pass through to the returned promise unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Self
    where
        R: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.then_with(None, Some(Box::new(on_rejected)))
    }

    /// Registers a handler that runs on settlement regardless of outcome.
    ///
    /// The handler receives the value or reason. The returned promise
    /// settles like this one, unless the handler fails, in which case it
    /// rejects with the handler's error.
    pub fn finally<F>(&self, on_settled: F) -> Self
    where
        F: FnOnce(Value) -> Result<(), Value> + 'static,
    {
        let shared = Rc::new(RefCell::new(Some(on_settled)));
        let on_rejected_slot = Rc::clone(&shared);
        self.then_or_else(
            move |value| {
                run_finally(&shared, value.clone())?;
                Ok(value)
            },
            move |reason| {
                run_finally(&on_rejected_slot, reason.clone())?;
                Err(reason)
            },
        )
    }

    /// Registers optional handlers, the general form behind `then`/`catch`.
    ///
    /// A missing handler forwards the matching outcome unchanged. The
    /// handler runs on a later scheduler tick even if this promise is
    /// already settled.
    pub fn then_with(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Self {
        let Some(runtime) = self.runtime() else {
            debug!(promise = %self.inner.id, "runtime dropped, reaction discarded");
            return Self::with_id(PromiseId::DETACHED, self.inner.runtime.clone());
        };
        let downstream = Self::pending(&runtime);
        let reaction = Reaction::new(on_fulfilled, on_rejected, downstream.clone());
        let settled = {
            let mut record = self.inner.record.borrow_mut();
            record.handled = true;
            let settled = match &record.state {
                PromiseState::Pending => None,
                PromiseState::Fulfilled(v) => Some(Settlement::Fulfilled(v.clone())),
                PromiseState::Rejected(r) => Some(Settlement::Rejected(r.clone())),
            };
            match settled {
                Some(settled) => settled,
                None => {
                    record.reactions.push(reaction);
                    return downstream;
                }
            }
        };
        runtime.schedule(move || reaction.run(settled));
        downstream
    }

    pub(crate) fn mark_handled(&self) {
        self.inner.record.borrow_mut().handled = true;
    }

    /// Transitions to fulfilled and schedules every registered reaction.
    pub(crate) fn fulfill(&self, value: Value) {
        self.settle(Settlement::Fulfilled(value));
    }

    /// Transitions to rejected, schedules reactions and notifies the tracker.
    pub(crate) fn reject_with(&self, reason: Value) {
        if self.settle(Settlement::Rejected(reason)) {
            if let Some(runtime) = self.runtime() {
                runtime.tracker().track(self);
            }
        }
    }

    fn settle(&self, settlement: Settlement) -> bool {
        let reactions = {
            let mut record = self.inner.record.borrow_mut();
            if !record.state.is_pending() {
                return false;
            }
            record.state = settlement.to_state();
            std::mem::take(&mut record.reactions)
        };
        trace!(
            promise = %self.inner.id,
            outcome = settlement.label(),
            reactions = reactions.len(),
            "promise settled"
        );
        let Some(runtime) = self.runtime() else {
            return true;
        };
        for reaction in reactions {
            let settled = settlement.clone();
            runtime.schedule(move || reaction.run(settled));
        }
        true
    }
}

fn run_finally<F>(slot: &RefCell<Option<F>>, arg: Value) -> Result<(), Value>
where
    F: FnOnce(Value) -> Result<(), Value>,
{
    let handler = slot.borrow_mut().take();
    match handler {
        Some(handler) => handler(arg),
        None => Ok(()),
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Promise");
        s.field("id", &self.inner.id);
        match self.inner.record.try_borrow() {
            Ok(record) => s
                .field("state", &record.state)
                .field("handled", &record.handled),
            Err(_) => s.field("state", &"<settling>"),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{init_test_logging, test_runtime};
    use std::cell::Cell;

    #[test]
    fn producer_runs_synchronously() {
        init_test_logging();
        let rt = test_runtime();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let p = Promise::new(&rt, move |resolve, _| {
            flag.set(true);
            resolve.call("done");
            Ok(())
        });
        assert!(ran.get());
        assert_eq!(p.state(), PromiseState::Fulfilled(Value::from("done")));
    }

    #[test]
    fn settles_once() {
        init_test_logging();
        let rt = test_runtime();
        let p = Promise::new(&rt, |resolve, reject| {
            resolve.call(1);
            reject.call("late");
            resolve.call(2);
            Ok(())
        });
        assert_eq!(p.state(), PromiseState::Fulfilled(Value::Int(1)));
        p.fulfill(Value::Int(3));
        p.reject_with(Value::from("ignored"));
        assert_eq!(p.state(), PromiseState::Fulfilled(Value::Int(1)));
    }

    #[test]
    fn producer_error_rejects() {
        init_test_logging();
        let rt = test_runtime();
        let p = Promise::new(&rt, |_, _| Err(Value::from("boom")));
        assert_eq!(p.state(), PromiseState::Rejected(Value::from("boom")));
        p.mark_handled();
    }

    #[test]
    fn producer_error_after_settlement_is_ignored() {
        init_test_logging();
        let rt = test_runtime();
        let p = Promise::new(&rt, |resolve, _| {
            resolve.call("ok");
            Err(Value::from("boom"))
        });
        assert_eq!(p.state(), PromiseState::Fulfilled(Value::from("ok")));
    }

    #[test]
    fn producer_panic_becomes_handler_error() {
        init_test_logging();
        let rt = test_runtime();
        let p = Promise::new(&rt, |_, _| panic!("kaput"));
        p.mark_handled();
        let reason = p.state().value().cloned().unwrap_or_default();
        let err = reason.as_error().expect("error reason");
        assert_eq!(err.kind(), ErrorKind::HandlerError);
        assert!(err.to_string().contains("kaput"));
    }

    #[test]
    fn then_is_never_inline() {
        init_test_logging();
        let rt = test_runtime();
        let called = Rc::new(Cell::new(false));
        let flag = Rc::clone(&called);
        let p = Promise::resolve(&rt, 1);
        let _ = p.then(move |v| {
            flag.set(true);
            Ok(v)
        });
        assert!(!called.get());
        rt.run_until_idle().expect("idle");
        assert!(called.get());
    }

    #[test]
    fn missing_handler_forwards_outcome() {
        init_test_logging();
        let rt = test_runtime();
        let fulfilled = Promise::resolve(&rt, "v").catch(|_| Ok(Value::from("caught")));
        let rejected = Promise::reject(&rt, "e").then(|_| Ok(Value::from("ran")));
        assert_eq!(rt.block_on(&fulfilled), Ok(Value::from("v")));
        assert_eq!(rt.block_on(&rejected), Err(Value::from("e")));
    }

    #[test]
    fn handler_result_settles_downstream() {
        init_test_logging();
        let rt = test_runtime();
        let ok = Promise::resolve(&rt, 1).then(|_| Ok(Value::Int(2)));
        let err = Promise::resolve(&rt, 1).then(|_| Err(Value::from("raised")));
        let recovered = Promise::reject(&rt, "e").catch(Ok);
        assert_eq!(rt.block_on(&ok), Ok(Value::Int(2)));
        assert_eq!(rt.block_on(&err), Err(Value::from("raised")));
        assert_eq!(rt.block_on(&recovered), Ok(Value::from("e")));
    }

    #[test]
    fn handler_panic_rejects_downstream() {
        init_test_logging();
        let rt = test_runtime();
        let p = Promise::resolve(&rt, 1).then(|_| panic!("handler blew up"));
        let reason = rt.block_on(&p).expect_err("rejected");
        assert_eq!(
            reason.as_error().map(Error::kind),
            Some(ErrorKind::HandlerError)
        );
    }

    #[test]
    fn finally_passes_outcome_through() {
        init_test_logging();
        let rt = test_runtime();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let ok = Promise::resolve(&rt, "v").finally(move |v| {
            log.borrow_mut().push(v);
            Ok(())
        });
        let log = Rc::clone(&seen);
        let err = Promise::reject(&rt, "E").finally(move |r| {
            log.borrow_mut().push(r);
            Ok(())
        });
        assert_eq!(rt.block_on(&ok), Ok(Value::from("v")));
        assert_eq!(rt.block_on(&err), Err(Value::from("E")));
        assert_eq!(*seen.borrow(), vec![Value::from("v"), Value::from("E")]);
    }

    #[test]
    fn finally_error_rejects_downstream() {
        init_test_logging();
        let rt = test_runtime();
        let p = Promise::resolve(&rt, "v").finally(|_| Err(Value::from("cleanup failed")));
        assert_eq!(rt.block_on(&p), Err(Value::from("cleanup failed")));
    }

    #[test]
    fn registering_reactions_marks_handled() {
        init_test_logging();
        let rt = test_runtime();
        let p = Promise::new(&rt, |_, _| Ok(()));
        assert!(!p.is_handled());
        let _ = p.then(Ok);
        assert!(p.is_handled());
        assert_eq!(p.pending_reactions(), 1);
    }

    #[test]
    fn ids_are_monotonic_and_displayed() {
        let rt = test_runtime();
        let a = Promise::resolve(&rt, 1);
        let b = Promise::resolve(&rt, 2);
        assert!(a.id() < b.id());
        assert_eq!(PromiseId::new(7).to_string(), "promise#7");
    }

    #[test]
    fn resolve_returns_native_promise_unchanged() {
        let rt = test_runtime();
        let p = Promise::resolve(&rt, 1);
        let q = Promise::resolve(&rt, p.clone());
        assert!(p.ptr_eq(&q));
    }
}
