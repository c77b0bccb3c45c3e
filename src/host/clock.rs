//! Event loop clocks.
//!
//! Time is measured as a [`Duration`] since the clock's origin. The system
//! clock follows the monotonic wall clock and sleeps to reach a deadline; the
//! virtual clock jumps straight to it, which keeps timer-driven tests instant
//! and deterministic.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Which clock drives the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Monotonic wall-clock time.
    #[default]
    System,
    /// Virtual time advanced only by the event loop.
    Virtual,
}

impl ClockMode {
    /// Parses a clock mode name (`system` or `virtual`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "system" | "wall" => Some(Self::System),
            "virtual" | "lab" => Some(Self::Virtual),
            _ => None,
        }
    }
}

/// The clock backing a host.
#[derive(Debug)]
pub(crate) enum Clock {
    System { origin: Instant },
    Virtual { now: Cell<Duration> },
}

impl Clock {
    pub(crate) fn new(mode: ClockMode) -> Self {
        match mode {
            ClockMode::System => Self::System {
                origin: Instant::now(),
            },
            ClockMode::Virtual => Self::Virtual {
                now: Cell::new(Duration::ZERO),
            },
        }
    }

    pub(crate) fn mode(&self) -> ClockMode {
        match self {
            Self::System { .. } => ClockMode::System,
            Self::Virtual { .. } => ClockMode::Virtual,
        }
    }

    /// Time elapsed since the clock's origin.
    pub(crate) fn now(&self) -> Duration {
        match self {
            Self::System { origin } => origin.elapsed(),
            Self::Virtual { now } => now.get(),
        }
    }

    /// Blocks (system) or jumps (virtual) until `deadline` has been reached.
    pub(crate) fn advance_to(&self, deadline: Duration) {
        match self {
            Self::System { origin } => {
                let elapsed = origin.elapsed();
                if deadline > elapsed {
                    std::thread::sleep(deadline - elapsed);
                }
            }
            Self::Virtual { now } => {
                if deadline > now.get() {
                    now.set(deadline);
                }
            }
        }
    }
}
