//! Settlement functions handed to producers and thenables.

use core::fmt;
use std::cell::Cell;
use std::rc::Rc;

use super::{Handler, Promise};
use crate::value::{Function, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettleKind {
    Resolve,
    Reject,
}

/// One half of a resolve/reject pair.
///
/// Both halves of a pair share a single "already resolved" flag: the first
/// call on either half wins and every later call is ignored. Resolving runs
/// the resolution procedure, so a thenable argument is adopted; rejecting
/// uses the reason as-is.
#[derive(Clone)]
pub struct Settle {
    target: Promise,
    kind: SettleKind,
    resolved: Rc<Cell<bool>>,
}

impl Settle {
    pub(crate) fn pair(target: &Promise) -> (Self, Self) {
        let resolved = Rc::new(Cell::new(false));
        let resolve = Self {
            target: target.clone(),
            kind: SettleKind::Resolve,
            resolved: Rc::clone(&resolved),
        };
        let reject = Self {
            target: target.clone(),
            kind: SettleKind::Reject,
            resolved,
        };
        (resolve, reject)
    }

    /// Settles the target promise. Returns false if the pair was already used.
    pub fn call(&self, value: impl Into<Value>) -> bool {
        if self.resolved.replace(true) {
            return false;
        }
        match self.kind {
            SettleKind::Resolve => self.target.resolve_with(value.into()),
            SettleKind::Reject => self.target.reject_with(value.into()),
        }
        true
    }

    /// Returns true once either half of the pair has been called.
    #[must_use]
    pub fn is_called(&self) -> bool {
        self.resolved.get()
    }

    /// Returns true for the rejecting half.
    #[must_use]
    pub fn is_reject(&self) -> bool {
        self.kind == SettleKind::Reject
    }

    /// Wraps this settlement function as a callable value taking one argument.
    #[must_use]
    pub fn into_function(self) -> Function {
        Function::new(move |args| {
            self.call(args.first().cloned().unwrap_or_default());
            Ok(Value::Undefined)
        })
    }

    pub(crate) fn into_handler(self) -> Handler {
        Box::new(move |value| {
            self.call(value);
            Ok(Value::Undefined)
        })
    }
}

impl fmt::Debug for Settle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("target", &self.target.id())
            .field("kind", &self.kind)
            .field("called", &self.resolved.get())
            .finish()
    }
}
