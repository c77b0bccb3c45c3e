//! Reaction records and their delivery.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{Promise, PromiseState};
use crate::error::{panic_message, Error};
use crate::tracing_compat::trace;
use crate::value::Value;

/// A boxed continuation: receives the value or reason, returns the
/// downstream value or raises a reason.
pub type Handler = Box<dyn FnOnce(Value) -> Result<Value, Value>>;

/// Terminal outcome delivered to a reaction.
#[derive(Debug, Clone)]
pub(super) enum Settlement {
    Fulfilled(Value),
    Rejected(Value),
}

impl Settlement {
    pub(super) fn to_state(&self) -> PromiseState {
        match self {
            Self::Fulfilled(v) => PromiseState::Fulfilled(v.clone()),
            Self::Rejected(r) => PromiseState::Rejected(r.clone()),
        }
    }

    pub(super) const fn label(&self) -> &'static str {
        match self {
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Handlers registered on a promise plus the promise they settle.
pub(super) struct Reaction {
    on_fulfilled: Option<Handler>,
    on_rejected: Option<Handler>,
    downstream: Promise,
}

impl Reaction {
    pub(super) fn new(
        on_fulfilled: Option<Handler>,
        on_rejected: Option<Handler>,
        downstream: Promise,
    ) -> Self {
        Self {
            on_fulfilled,
            on_rejected,
            downstream,
        }
    }

    /// Runs the handler matching `settlement`, or forwards it unchanged.
    pub(super) fn run(self, settlement: Settlement) {
        let Self {
            on_fulfilled,
            on_rejected,
            downstream,
        } = self;
        let (handler, arg) = match settlement {
            Settlement::Fulfilled(value) => match on_fulfilled {
                Some(handler) => (handler, value),
                None => return downstream.fulfill(value),
            },
            Settlement::Rejected(reason) => match on_rejected {
                Some(handler) => (handler, reason),
                None => return downstream.reject_with(reason),
            },
        };
        trace!(downstream = %downstream.id(), "running reaction handler");
        match invoke(handler, arg) {
            Ok(value) => downstream.resolve_with(value),
            Err(reason) => downstream.reject_with(reason),
        }
    }
}

fn invoke(handler: Handler, arg: Value) -> Result<Value, Value> {
    match catch_unwind(AssertUnwindSafe(move || handler(arg))) {
        Ok(result) => result,
        Err(payload) => Err(Error::handler_panicked(panic_message(payload.as_ref())).into()),
    }
}
