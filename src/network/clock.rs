//! Clock Offset Estimator
//!
//! Converts a server (tick, wall time) pair and the local receipt time into
//! an estimate of the current authoritative tick. This is a one-shot offset
//! estimate, not a filtered clock: repeated observations overwrite rather
//! than average, an explicit simplification.

use crate::{Tick, TICK_DURATION_MS};

/// Estimate the current authoritative tick from a TimeSync reading.
///
/// `server_tick + round((local_receipt - server_wall) / tick_duration)`,
/// clamped to the valid tick range (a local clock behind the server's can
/// otherwise push the estimate negative).
pub fn estimate_current_tick(server_tick: Tick, server_time_ms: f64, local_time_ms: f64) -> Tick {
    let elapsed_ticks = ((local_time_ms - server_time_ms) / TICK_DURATION_MS).round() as i64;
    (server_tick as i64 + elapsed_ticks).clamp(0, Tick::MAX as i64) as Tick
}

/// Holder for the most recent estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSync {
    estimate: Option<Tick>,
}

impl ClockSync {
    /// No observation yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a TimeSync observation, overwriting any previous estimate.
    /// Returns the new estimate.
    pub fn observe(&mut self, server_tick: Tick, server_time_ms: f64, local_time_ms: f64) -> Tick {
        let estimate = estimate_current_tick(server_tick, server_time_ms, local_time_ms);
        self.estimate = Some(estimate);
        estimate
    }

    /// The latest estimate, if any observation arrived.
    pub fn estimate(&self) -> Option<Tick> {
        self.estimate
    }
}

// =============================================================================
// TESTS
// =============================================================================
