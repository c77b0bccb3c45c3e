//! Parallel aggregation.
//!
//! Every element is subscribed to immediately; elements settle in any order
//! but results are stored by input index.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::promise::Promise;
use crate::runtime::Runtime;
use crate::value::Value;

/// Status tag of a fulfilled [`all_settled`] record.
pub const FULFILLED: &str = "fulfilled";
/// Status tag of a rejected [`all_settled`] record.
pub const REJECTED: &str = "rejected";

/// Results collected by index until every slot is filled.
struct Collector {
    slots: RefCell<Vec<Option<Value>>>,
    remaining: Cell<usize>,
    output: Promise,
}

impl Collector {
    fn new(len: usize, output: Promise) -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(vec![None; len]),
            remaining: Cell::new(len),
            output,
        })
    }

    fn fill(&self, index: usize, value: Value) {
        self.slots.borrow_mut()[index] = Some(value);
        let remaining = self.remaining.get() - 1;
        self.remaining.set(remaining);
        if remaining == 0 {
            let values = self
                .slots
                .take()
                .into_iter()
                .map(Option::unwrap_or_default);
            self.output.fulfill(Value::list(values));
        }
    }
}

/// Fulfills with every element's value, in input order, once all fulfill.
///
/// Rejects with the first rejection reason; later settlements are ignored.
/// An empty input fulfills immediately with an empty list.
pub fn all<I>(runtime: &Runtime, items: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let items: Vec<Value> = items.into_iter().map(Into::into).collect();
    let output = Promise::pending(runtime);
    if items.is_empty() {
        output.fulfill(Value::list([]));
        return output;
    }

    let collector = Collector::new(items.len(), output.clone());
    for (index, item) in items.into_iter().enumerate() {
        let element = Promise::resolve(runtime, item);
        let on_value = Rc::clone(&collector);
        let on_reason = output.clone();
        let _ = element.then_or_else(
            move |value| {
                on_value.fill(index, value);
                Ok(Value::Undefined)
            },
            move |reason| {
                on_reason.reject_with(reason);
                Ok(Value::Undefined)
            },
        );
    }
    output
}

/// Fulfills once every element settles, with one `[status, value]` record
/// per element in input order. Never rejects.
pub fn all_settled<I>(runtime: &Runtime, items: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let items: Vec<Value> = items.into_iter().map(Into::into).collect();
    let output = Promise::pending(runtime);
    if items.is_empty() {
        output.fulfill(Value::list([]));
        return output;
    }

    let collector = Collector::new(items.len(), output.clone());
    for (index, item) in items.into_iter().enumerate() {
        let element = Promise::resolve(runtime, item);
        let on_value = Rc::clone(&collector);
        let on_reason = Rc::clone(&collector);
        let _ = element.then_or_else(
            move |value| {
                on_value.fill(index, record(FULFILLED, value));
                Ok(Value::Undefined)
            },
            move |reason| {
                on_reason.fill(index, record(REJECTED, reason));
                Ok(Value::Undefined)
            },
        );
    }
    output
}

fn record(status: &str, value: Value) -> Value {
    Value::list([Value::from(status), value])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::PromiseState;
    use crate::test_utils::{init_test_logging, test_runtime};

    fn strs(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| Value::from(*s)))
    }

    #[test]
    fn empty_input_fulfills_synchronously() {
        let rt = test_runtime();
        assert_eq!(
            all(&rt, Vec::<Value>::new()).state(),
            PromiseState::Fulfilled(Value::list([]))
        );
        assert_eq!(
            all_settled(&rt, Vec::<Value>::new()).state(),
            PromiseState::Fulfilled(Value::list([]))
        );
    }

    #[test]
    fn results_follow_input_order() {
        init_test_logging();
        let rt = test_runtime();
        let late = Promise::resolve(&rt, "first");
        let slow = {
            let rt2 = rt.clone();
            Promise::new(&rt, move |resolve, _| {
                rt2.set_timeout(std::time::Duration::from_millis(20), move || {
                    resolve.call("slow");
                });
                Ok(())
            })
        };
        let p = all(&rt, [Value::Promise(slow), Value::Promise(late), Value::from("plain")]);
        assert_eq!(rt.block_on(&p), Ok(strs(&["slow", "first", "plain"])));
    }

    #[test]
    fn first_rejection_wins() {
        init_test_logging();
        let rt = test_runtime();
        let p = all(
            &rt,
            [
                Value::Promise(Promise::resolve(&rt, "a")),
                Value::Promise(Promise::reject(&rt, "E1")),
                Value::Promise(Promise::reject(&rt, "E2")),
            ],
        );
        assert_eq!(rt.block_on(&p), Err(Value::from("E1")));
    }

    #[test]
    fn all_settled_records_every_outcome() {
        init_test_logging();
        let rt = test_runtime();
        let p = all_settled(
            &rt,
            [
                Value::Promise(Promise::reject(&rt, "E")),
                Value::from("v"),
            ],
        );
        let expected = Value::list([
            record(REJECTED, Value::from("E")),
            record(FULFILLED, Value::from("v")),
        ]);
        assert_eq!(rt.block_on(&p), Ok(expected));
        assert_eq!(rt.tracker().reported(), 0);
    }
}
