//! Race combinator: the first element to settle decides the outcome.
//!
//! Losing elements keep running; their settlements are ignored. An empty
//! input never settles.

use crate::promise::Promise;
use crate::runtime::Runtime;
use crate::value::Value;

/// Settles like the first element to settle.
pub fn race<I>(runtime: &Runtime, items: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let output = Promise::pending(runtime);
    for item in items {
        let element = Promise::resolve(runtime, item);
        let on_value = output.clone();
        let on_reason = output.clone();
        let _ = element.then_or_else(
            move |value| {
                on_value.fulfill(value);
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
