//! Callback adaptation.

use crate::promise::{Promise, Settle};
use crate::runtime::Runtime;
use crate::value::Value;

/// Runs `f` synchronously with a one-shot callback.
///
/// The returned promise resolves with the value the callback is first
/// invoked with. If `f` fails (or panics) before the callback is invoked,
/// the promise rejects with that error instead.
///
/// ```
/// use pledge::combinator::from_callback;
/// use pledge::{Runtime, Value};
///
/// let rt = Runtime::builder().virtual_clock().build().unwrap();
/// let p = from_callback(&rt, |done| {
///     done.call("foo");
///     Ok(())
/// });
/// assert_eq!(rt.block_on(&p), Ok(Value::from("foo")));
/// ```
pub fn from_callback<F>(runtime: &Runtime, f: F) -> Promise
where
    F: FnOnce(Settle) -> Result<(), Value>,
{
    Promise::new(runtime, move |resolve, _reject| f(resolve))
}
