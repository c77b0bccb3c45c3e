//! Sequential mapping.
//!
//! `f` is called for one item at a time: the call for index `i + 1` waits
//! until the promise produced for index `i` has fulfilled. The first call
//! happens synchronously inside [`map_series`]. A rejection at any index
//! stops the sequence and rejects the result.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{panic_message, Error};
use crate::promise::Promise;
use crate::runtime::Runtime;
use crate::tracing_compat::trace;
use crate::value::Value;

struct Series<F> {
    items: Vec<Value>,
    results: RefCell<Vec<Value>>,
    f: RefCell<F>,
    output: Promise,
}

impl<F> Series<F>
where
    F: FnMut(Value, usize) -> Result<Value, Value> + 'static,
{
    fn step(self: Rc<Self>, index: usize) {
        let Some(item) = self.items.get(index).cloned() else {
            let results = self.results.take();
            self.output.fulfill(Value::list(results));
            return;
        };

        let produced = {
            let mut f = self.f.borrow_mut();
            catch_unwind(AssertUnwindSafe(|| (*f)(item, index)))
        };
        let value = match produced {
            Ok(Ok(value)) => value,
            Ok(Err(reason)) => return self.stop(index, reason),
            Err(payload) => {
                let reason = Error::handler_panicked(panic_message(payload.as_ref()));
                return self.stop(index, reason.into());
            }
        };

        let Some(runtime) = self.output.runtime() else {
            return;
        };
        let current = Promise::resolve(&runtime, value);
        let on_reason = Rc::clone(&self);
        let _ = current.then_or_else(
            move |value| {
                self.results.borrow_mut().push(value);
                self.step(index + 1);
                Ok(Value::Undefined)
            },
            move |reason| {
                on_reason.stop(index, reason);
                Ok(Value::Undefined)
            },
        );
    }

    fn stop(&self, index: usize, reason: Value) {
        trace!(index, remaining = self.items.len() - index - 1, "series stopped");
        self.output.reject_with(reason);
    }
}

/// Maps `items` through `f` strictly in sequence.
///
/// `f` receives the item and its index and may return a plain value or a
/// thenable. Fulfills with the results in input order.
pub fn map_series<I, F>(runtime: &Runtime, items: I, f: F) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
    F: FnMut(Value, usize) -> Result<Value, Value> + 'static,
{
    let items: Vec<Value> = items.into_iter().map(Into::into).collect();
    let output = Promise::pending(runtime);
    let series = Rc::new(Series {
        results: RefCell::new(Vec::with_capacity(items.len())),
        items,
        f: RefCell::new(f),
        output: output.clone(),
    });
    series.step(0);
    output
}
