//! Pledge: deferred-value promises with async-always continuations.
//!
//! # Overview
//!
//! A [`Promise`] is a value that settles exactly once, fulfilled or
//! rejected. Continuations attached with `then`, `catch` and `finally` are
//! never run inline: they are delivered through a deferred scheduler on a
//! later turn of the host event loop, in registration order. Rejections that
//! nobody handles within a short grace window are published as
//! [`UnhandledRejection`] notifications.
//!
//! # Core Guarantees
//!
//! - **Settle-once**: the first settlement wins; later attempts are no-ops
//! - **Async-always**: a handler never runs in the turn that registered it
//! - **Ordered delivery**: reactions on one promise run in registration order
//! - **Thenable adoption**: resolving with a thenable follows its outcome,
//!   and resolving a promise with itself rejects with
//!   [`ErrorKind::CyclicResolution`]
//! - **No escaping errors**: failures in producers, handlers and combinator
//!   callbacks become rejections, panics included
//!
//! # Module Structure
//!
//! - [`host`]: In-process host environment, its event loop and deferral primitives
//! - [`scheduler`]: Capability-table selection of the deferral strategy
//! - [`promise`]: The promise state machine and resolution procedure
//! - [`combinator`]: `all`, `all_settled`, `race`, `map_series`, `from_callback`
//! - [`tracker`]: Unhandled-rejection tracking and notification
//! - [`runtime`]: The runtime service object, configuration and builder
//! - [`constructor`]: Dynamic constructor binding
//! - [`value`]: Dynamic values and the thenable capability
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```
//! use pledge::{combinator, Promise, Runtime, Value};
//!
//! let rt = Runtime::builder().virtual_clock().build().unwrap();
//! let p = combinator::all(&rt, [Value::Promise(Promise::resolve(&rt, "a")), Value::from("b")]);
//! let expected = Value::list([Value::from("a"), Value::from("b")]);
//! assert_eq!(rt.block_on(&p), Ok(expected));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod constructor;
pub mod error;
pub mod host;
pub mod promise;
pub mod runtime;
pub mod scheduler;
pub mod tracing_compat;
pub mod tracker;
pub mod value;

#[cfg(test)]
pub(crate) mod test_utils;

pub use constructor::PromiseConstructor;
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use host::{ClockMode, Host, HostCapabilities, TimerId};
pub use promise::{Handler, Promise, PromiseId, PromiseState, Settle};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
pub use scheduler::{Scheduler, StrategyKind};
pub use tracker::{RejectionEvents, SubscriptionId, UnhandledRejection, DEFAULT_GRACE_TICKS};
pub use value::{Function, Thenable, ThenableRef, Value};
