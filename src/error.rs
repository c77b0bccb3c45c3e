//! Error types and error handling strategy for pledge.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors raised inside producers, handlers and combinator callbacks never
//!   escape synchronously; they become rejections of the owning promise
//! - Panics inside user callbacks are caught at the callback boundary and
//!   converted to [`ErrorKind::HandlerError`] rejections
//! - Only constructor misuse surfaces synchronously to a direct caller
//!
//! # Error Categories
//!
//! - **Promise**: bad constructor input, constructor misuse, cyclic
//!   resolution, handler failures
//! - **Runtime**: event loop stalls and turn budget exhaustion
//! - **Config**: invalid configuration values
//!
//! Errors that travel as rejection reasons are wrapped in
//! [`Value::Error`](crate::value::Value::Error).

use core::fmt;
use std::sync::Arc;

use crate::promise::PromiseId;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Promise ===
    /// The constructor was given no producer, or a producer that is not callable.
    InvalidArgument,
    /// The constructor was invoked as a plain call instead of constructing.
    ConstructorMisuse,
    /// A promise was resolved with itself.
    CyclicResolution,
    /// User-supplied producer or handler code failed (panicked).
    HandlerError,

    // === Runtime ===
    /// The event loop went idle while a promise was still pending.
    Stalled,
    /// The configured turn budget was exhausted before the loop went idle.
    TurnLimitExceeded,

    // === Config ===
    /// A configuration value could not be parsed or is out of range.
    InvalidConfig,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument
            | Self::ConstructorMisuse
            | Self::CyclicResolution
            | Self::HandlerError => ErrorCategory::Promise,
            Self::Stalled | Self::TurnLimitExceeded => ErrorCategory::Runtime,
            Self::InvalidConfig => ErrorCategory::Config,
        }
    }

    /// Returns true if this kind can surface synchronously from a constructor call.
    #[must_use]
    pub const fn is_synchronous(&self) -> bool {
        matches!(self, Self::InvalidArgument | Self::ConstructorMisuse)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Promise construction and resolution failures.
    Promise,
    /// Event loop failures.
    Runtime,
    /// Configuration failures.
    Config,
}

/// The main error type for pledge operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Creates an invalid-argument error for a missing or non-callable producer.
    #[must_use]
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument).with_message(detail)
    }

    /// Creates a constructor-misuse error.
    #[must_use]
    pub fn constructor_misuse() -> Self {
        Self::new(ErrorKind::ConstructorMisuse)
            .with_message("Promise constructor must be invoked with `new`")
    }

    /// Creates a cyclic-resolution error for a promise resolved with itself.
    #[must_use]
    pub fn cyclic_resolution(promise: PromiseId) -> Self {
        Self::new(ErrorKind::CyclicResolution)
            .with_message(format!("{promise} cannot be resolved with itself"))
    }

    /// Creates a handler error from a caught panic message.
    #[must_use]
    pub fn handler_panicked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandlerError)
            .with_message(format!("handler panicked: {}", message.into()))
    }

    /// Creates a stalled error for a promise that can no longer settle.
    #[must_use]
    pub fn stalled(promise: PromiseId) -> Self {
        Self::new(ErrorKind::Stalled)
            .with_message(format!("event loop idle while {promise} is pending"))
    }

    /// Creates a turn-limit error.
    #[must_use]
    pub fn turn_limit_exceeded(limit: u64) -> Self {
        Self::new(ErrorKind::TurnLimitExceeded)
            .with_message(format!("event loop exceeded {limit} turns"))
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// A specialized Result type for pledge operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
