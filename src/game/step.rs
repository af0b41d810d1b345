//! Deterministic Step Function
//!
//! The pure per-tick state transition applied identically by client and
//! server. Both sides independently resimulate the same history and are
//! expected to converge bit-for-bit.

use crate::core::vec3::Vec3;
use crate::game::input::InputSlot;
use crate::game::state::{Roster, StateRow};
use crate::MAX_PARTICIPANTS;

/// Distance moved per tick at full input.
pub const MOVE_SPEED: f32 = 0.0625;

/// Apply one tick of simulation.
///
/// # Arguments
///
/// * `roster` - active participant mask; inactive lanes carry through
///   untouched
/// * `states` - state row the inputs apply to
/// * `inputs` - the tick's input row, one slot per lane
///
/// # Determinism
///
/// Bit-reproducible given identical arguments:
/// - Lanes are processed in index order
/// - Every float operation happens in a fixed sequence; the only
///   non-elementary operation is `sqrt`, which IEEE-754 rounds correctly
/// - No unordered containers, no RNG, no system time
///
/// Movement combines the directional flags into an X/Z vector, normalizes it
/// when non-zero (diagonals are not faster), scales by [`MOVE_SPEED`], and
/// integrates into position. Orientation is currently carried through
/// unchanged; it is part of the signature so an orientation model can be
/// added later without changing the replay contract.
pub fn step(roster: &Roster, states: &StateRow, inputs: &[InputSlot]) -> StateRow {
    debug_assert_eq!(inputs.len(), MAX_PARTICIPANTS);

    let mut next = *states;
    for lane in 0..MAX_PARTICIPANTS {
        if !roster.lane_active(lane) {
            continue;
        }

        let dir = inputs[lane].frame.move_direction();
        if dir.length_squared() > 0.0 {
            let velocity = dir.normalize_or_zero().scale(MOVE_SPEED);
            next[lane].position = states[lane].position.add(velocity);
        }
    }
    next
}

// =============================================================================
// TESTS
// =============================================================================
