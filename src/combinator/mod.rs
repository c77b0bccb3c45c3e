//! Combinators built on the promise core's public contract.
//!
//! This module provides:
//!
//! - [`all`]: wait for every element, first rejection wins
//! - [`all_settled`]: wait for every element, collecting outcome records
//! - [`race`]: settle like the first element to settle
//! - [`map_series`]: map items to promises strictly one after another
//! - [`from_callback`]: adapt a callback-taking function
//!
//! `resolve` and `reject` live on [`Promise`](crate::Promise) itself.
//!
//! Elements that are not promises are resolved first, so plain values pass
//! through as fulfilled and thenables are adopted. Results are returned as
//! [`Value::List`](crate::Value::List) in input order.

pub mod all;
pub mod from_callback;
pub mod map_series;
pub mod race;

pub use all::{all, all_settled, FULFILLED, REJECTED};
pub use from_callback::from_callback;
pub use map_series::map_series;
pub use race::race;
