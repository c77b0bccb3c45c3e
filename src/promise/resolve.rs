//! The resolution procedure.
//!
//! Resolving a promise with a value first runs the thenable capability test.
//! Plain values fulfill directly. A thenable is adopted: its `then` receives
//! a fresh resolve/reject pair for the promise, so the promise follows the
//! thenable's eventual outcome, unwrapping nested thenables one step at a
//! time. A promise resolved with itself rejects with
//! [`ErrorKind::CyclicResolution`](crate::error::ErrorKind::CyclicResolution).
//!
//! A foreign `then` is never called inline. It runs as its own scheduler
//! task, so each level of a nested thenable chain costs one tick and no
//! stack depth.
//!
//! Only the direct self-reference is detected. Longer cycles through native
//! promises leave every member pending without looping. A foreign thenable
//! that keeps resolving with fresh thenables keeps the loop busy until the
//! turn budget runs out.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{Promise, Settle};
use crate::error::{panic_message, Error};
use crate::tracing_compat::trace;
use crate::value::{Thenable, ThenableRef, Value};

impl Promise {
    /// Resolves this promise with `value`, adopting thenables.
    pub(crate) fn resolve_with(&self, value: Value) {
        if !self.is_pending() {
            return;
        }
        match value.as_thenable() {
            None => self.fulfill(value),
            Some(ThenableRef::Native(other)) if other.ptr_eq(self) => {
                trace!(promise = %self.id(), "self resolution rejected");
                self.reject_with(Error::cyclic_resolution(self.id()).into());
            }
            Some(thenable) => self.adopt(thenable),
        }
    }

    fn adopt(&self, thenable: ThenableRef) {
        let (resolve, reject) = Settle::pair(self);
        match thenable {
            ThenableRef::Native(source) => {
                trace!(promise = %self.id(), source = %source.id(), "adopting promise");
                let _ = source.then_with(Some(resolve.into_handler()), Some(reject.into_handler()));
            }
            ThenableRef::Foreign(thenable) => {
                let Some(runtime) = self.runtime() else {
                    return;
                };
                trace!(promise = %self.id(), "adopting foreign thenable");
                runtime.schedule(move || {
                    let guard = reject.clone();
                    if let Err(reason) = call_then(thenable.as_ref(), resolve, reject) {
                        guard.call(reason);
                    }
                });
            }
        }
    }
}

fn call_then(thenable: &dyn Thenable, resolve: Settle, reject: Settle) -> Result<(), Value> {
    match catch_unwind(AssertUnwindSafe(|| thenable.then(resolve, reject))) {
        Ok(result) => result,
        Err(payload) => Err(Error::handler_panicked(panic_message(payload.as_ref())).into()),
    }
}
