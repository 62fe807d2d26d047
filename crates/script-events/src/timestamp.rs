//! Simulation Timestamp Types
//!
//! The orchestration core runs on a fixed-step tick clock. A timestamp carries
//! the tick counter, the elapsed simulation seconds derived from it, and the
//! in-game day used for rollover.
//!
//! # Example
//!
//! ```
//! use script_events::SimTimestamp;
//!
//! let mut ts = SimTimestamp::start();
//! ts.advance_tick(0.5);
//! ts.advance_tick(0.5);
//! assert_eq!(ts.tick, 2);
//! assert_eq!(ts.seconds, 1.0);
//! ```

use serde::{Deserialize, Serialize};

/// Default fixed step, in seconds (50 ticks per second).
pub const DEFAULT_TICK_SECONDS: f32 = 0.02;

/// A point in simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimTimestamp {
    /// Monotonically increasing simulation tick.
    pub tick: u64,
    /// Simulation seconds elapsed since the session started.
    pub seconds: f64,
    /// In-game day, starting at 1.
    pub day: u32,
}

impl SimTimestamp {
    /// Creates a new SimTimestamp.
    pub fn new(tick: u64, seconds: f64, day: u32) -> Self {
        Self { tick, seconds, day }
    }

    /// Creates a timestamp for the start of a session.
    pub fn start() -> Self {
        Self {
            tick: 0,
            seconds: 0.0,
            day: 1,
        }
    }

    /// Advances one tick of `step_seconds`.
    pub fn advance_tick(&mut self, step_seconds: f32) {
        self.tick += 1;
        self.seconds += f64::from(step_seconds);
    }

    /// Moves to the next in-game day. Ticks and seconds keep running.
    pub fn advance_day(&mut self) {
        self.day += 1;
    }
}

impl Default for SimTimestamp {
    fn default() -> Self {
        Self::start()
    }
}
