//! Dynamic values carried by promises.
//!
//! A promise fulfills with a [`Value`] and rejects with a [`Value`] reason.
//! Reasons are opaque: user-supplied values travel as-is, while errors raised
//! by the runtime itself travel as [`Value::Error`].
//!
//! # Thenables
//!
//! A thenable is any value exposing a callable `then`. Native promises are
//! thenables; foreign objects opt in by implementing [`Thenable`] and being
//! wrapped in [`Value::Thenable`]. The capability test is
//! [`Value::as_thenable`], performed once per resolution step.

use core::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::promise::{Promise, Settle};

/// A callable value: receives positional arguments, returns a value or raises one.
#[derive(Clone)]
pub struct Function(Rc<dyn Fn(&[Value]) -> Result<Value, Value>>);

impl Function {
    /// Wraps a closure as a callable value.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Value> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Invokes the function.
    pub fn call(&self, args: &[Value]) -> Result<Value, Value> {
        (self.0)(args)
    }

    /// Returns true if both handles refer to the same function.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// A foreign object exposing a callable `then`.
///
/// `then` receives the two settlement functions of the promise adopting this
/// thenable. Returning `Err` models an error thrown while accessing or
/// calling `then`; it rejects the adopting promise unless one of the
/// settlement functions was already called.
pub trait Thenable {
    /// Subscribes the adopting promise's settlement functions.
    fn then(&self, resolve: Settle, reject: Settle) -> Result<(), Value>;
}

/// The result of the thenable capability test.
pub enum ThenableRef {
    /// A promise of this implementation.
    Native(Promise),
    /// Any other value exposing a callable `then`.
    Foreign(Rc<dyn Thenable>),
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(Rc<str>),
    /// An ordered sequence.
    List(Rc<[Value]>),
    /// A runtime error used as a rejection reason.
    Error(Error),
    /// A callable.
    Function(Function),
    /// A native promise.
    Promise(Promise),
    /// A foreign thenable.
    Thenable(Rc<dyn Thenable>),
}

impl Value {
    /// Builds a list value.
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Wraps a foreign thenable.
    #[must_use]
    pub fn thenable(t: impl Thenable + 'static) -> Self {
        Self::Thenable(Rc::new(t))
    }

    /// Returns the thenable capability of this value, if any.
    #[must_use]
    pub fn as_thenable(&self) -> Option<ThenableRef> {
        match self {
            Self::Promise(p) => Some(ThenableRef::Native(p.clone())),
            Self::Thenable(t) => Some(ThenableRef::Foreign(Rc::clone(t))),
            _ => None,
        }
    }

    /// Returns true if this value is callable.
    #[must_use]
    pub const fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Returns the string contents, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the runtime error, if this is an error value.
    #[must_use]
    pub const fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the native promise, if this is one.
    #[must_use]
    pub const fn as_promise(&self) -> Option<&Promise> {
        match self {
            Self::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Error(_) => "error",
            Self::Function(_) => "function",
            Self::Promise(_) => "promise",
            Self::Thenable(_) => "thenable",
        }
    }
}

/// Identity for callables, promises and thenables; structural otherwise.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Promise(a), Self::Promise(b)) => a.ptr_eq(b),
            (Self::Thenable(a), Self::Thenable(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Float(n) => write!(f, "Float({n})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Error(e) => write!(f, "Error({e})"),
            Self::Function(_) => f.write_str("Function"),
            Self::Promise(p) => write!(f, "Promise({})", p.id()),
            Self::Thenable(_) => f.write_str("Thenable"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Error(e) => write!(f, "{e}"),
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Undefined
    }
}

impl From<Error> for Value {
    fn from(e: Error) -> Self {
        Self::Error(e)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Self::Promise(p)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn structural_equality_for_plain_values() {
        assert_eq!(Value::from("a"), Value::from(String::from("a")));
        assert_eq!(Value::from(3), Value::Int(3));
        assert_ne!(Value::from(3), Value::from("3"));
        assert_eq!(
            Value::list([Value::from("a"), Value::from(1)]),
            Value::from(vec![Value::from("a"), Value::from(1)])
        );
        assert_eq!(
            Value::from(Error::new(ErrorKind::Stalled)),
            Value::Error(Error::new(ErrorKind::Stalled))
        );
    }

    #[test]
    fn functions_compare_by_identity() {
        let f = Function::new(|_| Ok(Value::Undefined));
        let g = Function::new(|_| Ok(Value::Undefined));
        assert_eq!(Value::from(f.clone()), Value::from(f.clone()));
        assert_ne!(Value::from(f), Value::from(g));
    }

    #[test]
    fn capability_test() {
        struct Never;
        impl Thenable for Never {
            fn then(&self, _resolve: Settle, _reject: Settle) -> Result<(), Value> {
                Ok(())
            }
        }
        assert!(Value::from("x").as_thenable().is_none());
        assert!(Value::Undefined.as_thenable().is_none());
        assert!(matches!(
            Value::thenable(Never).as_thenable(),
            Some(ThenableRef::Foreign(_))
        ));
    }

    #[test]
    fn display_and_accessors() {
        assert_eq!(Value::from("foo").to_string(), "foo");
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::from("foo").as_str(), Some("foo"));
        assert_eq!(Value::from(vec![Value::Null]).as_list().map(<[Value]>::len), Some(1));
        assert_eq!(Value::Float(1.5).type_name(), "float");
        assert!(Value::from(Function::new(|_| Ok(Value::Null))).is_callable());
    }
}
