//! Trace Replay Verification
//!
//! Re-runs the step function over the input traces the server recorded and
//! returns the final state row plus its frame hash. If the replay hash
//! matches the live timeline's hash, the authoritative simulation was
//! deterministic and the traces are sufficient to reproduce it offline.
//!
//! Replay assumes the roster was stable over the replayed span; join/leave
//! churn mid-span shows up as a hash mismatch, which is the diagnostic
//! signal, not a crash.

use crate::core::hash::FrameHash;
use crate::game::input::{InputSlot, InputTrace};
use crate::game::state::{frame_hash, Roster, StateRow};
use crate::game::step::step;
use crate::{Tick, MAX_PARTICIPANTS};

/// Replay `tick_count` ticks of recorded traces from an initial state row.
///
/// Returns the final state row and the frame hash for the tick after the
/// last replayed one (the tick the state is "current at", matching the
/// engines' snapshot convention).
pub fn replay_session(
    roster: &Roster,
    initial: StateRow,
    traces: &[InputTrace; MAX_PARTICIPANTS],
    start_tick: Tick,
    tick_count: u32,
) -> (StateRow, FrameHash) {
    let mut live = initial;

    for tick in start_tick..start_tick + tick_count {
        let mut row = [InputSlot::default(); MAX_PARTICIPANTS];
        for (lane, slot) in row.iter_mut().enumerate() {
            if roster.lane_active(lane) {
                *slot = InputSlot::confirmed(tick, traces[lane].frame_at(tick));
            }
        }
        live = step(roster, &live, &row);
    }

    let hash = frame_hash(start_tick + tick_count, roster, &live);
    (live, hash)
}

// =============================================================================
// TESTS
// =============================================================================
