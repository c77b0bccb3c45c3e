//! Dynamic constructor surface.
//!
//! [`PromiseConstructor`] mirrors how a scripting host binds the promise
//! type: arguments arrive as [`Value`]s, the producer is an arbitrary
//! callable, and calling the constructor without constructing is an error.
//! These are the only failures that surface synchronously to a caller.

use crate::error::Error;
use crate::promise::Promise;
use crate::runtime::Runtime;
use crate::value::Value;

/// Host binding for constructing promises from dynamic arguments.
#[derive(Debug, Clone)]
pub struct PromiseConstructor {
    runtime: Runtime,
}

impl PromiseConstructor {
    /// Creates a constructor bound to `runtime`.
    #[must_use]
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
        }
    }

    /// Constructs a promise from `args[0]`, the producer.
    ///
    /// The producer is called synchronously with the resolve and reject
    /// functions. If it raises before either is called, the promise
    /// rejects with the raised value.
    pub fn construct(&self, args: &[Value]) -> Result<Promise, Error> {
        let producer = match args.first() {
            Some(Value::Function(f)) => f.clone(),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "producer must be a function, got {}",
                    other.type_name()
                )))
            }
            None => return Err(Error::invalid_argument("producer must be a function")),
        };
        Ok(Promise::new(&self.runtime, move |resolve, reject| {
            let args = [
                Value::Function(resolve.into_function()),
                Value::Function(reject.into_function()),
            ];
            producer.call(&args).map(drop)
        }))
    }

    /// Invokes the constructor as a plain call, which always fails.
    pub fn call(&self, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::constructor_misuse())
    }

    /// The runtime new promises are created on.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}
