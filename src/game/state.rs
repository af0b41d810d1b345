//! Simulation State Definitions
//!
//! Participant identity, roster membership, and per-participant state.
//! Storage is dense by participant index with an explicit active bitmask;
//! no sentinel values circulate inside the core.

use serde::{Deserialize, Serialize};

use crate::core::hash::{hash_frame, FrameHash};
use crate::core::quat::Quat;
use crate::core::vec3::Vec3;
use crate::MAX_PARTICIPANTS;

// =============================================================================
// PARTICIPANT ID
// =============================================================================

/// Participant identifier, valid over `1..=MAX_PARTICIPANTS`.
///
/// Assigned at handshake from the transport's stable connection identifier.
/// The raw value 0 is the wire-level "no participant" and is rejected here;
/// window lanes are addressed through [`ParticipantId::index`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParticipantId(u8);

impl ParticipantId {
    /// Validate a raw wire id.
    pub const fn new(raw: u8) -> Option<Self> {
        if raw >= 1 && raw as usize <= MAX_PARTICIPANTS {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Build from a dense lane index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < MAX_PARTICIPANTS {
            Some(Self(index as u8 + 1))
        } else {
            None
        }
    }

    /// Raw wire value.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Dense lane index (`id - 1`).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// =============================================================================
// ROSTER
// =============================================================================

/// Which participant lanes are currently active.
///
/// A lane activates on a roster-join event and deactivates on leave; the
/// backing storage is never compacted, so indices stay stable for the whole
/// session. Inactive lanes are skipped by the step function and excluded
/// from resimulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    active: [bool; MAX_PARTICIPANTS],
}

impl Roster {
    /// Empty roster.
    pub const fn new() -> Self {
        Self {
            active: [false; MAX_PARTICIPANTS],
        }
    }

    /// Rebuild from handshake presence flags.
    pub const fn from_flags(active: [bool; MAX_PARTICIPANTS]) -> Self {
        Self { active }
    }

    /// Presence flags in lane order, as carried by the handshake.
    pub const fn flags(&self) -> [bool; MAX_PARTICIPANTS] {
        self.active
    }

    /// Activate a participant. Returns false if it was already active.
    pub fn join(&mut self, id: ParticipantId) -> bool {
        let was = self.active[id.index()];
        self.active[id.index()] = true;
        !was
    }

    /// Deactivate a participant. Returns false if it was already inactive.
    pub fn leave(&mut self, id: ParticipantId) -> bool {
        let was = self.active[id.index()];
        self.active[id.index()] = false;
        was
    }

    /// Whether a participant is active.
    #[inline]
    pub fn is_active(&self, id: ParticipantId) -> bool {
        self.active[id.index()]
    }

    /// Whether a lane is active.
    #[inline]
    pub fn lane_active(&self, lane: usize) -> bool {
        lane < MAX_PARTICIPANTS && self.active[lane]
    }

    /// Number of active participants.
    pub fn count(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    /// Iterate active participants in id order.
    pub fn iter_active(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter(|(_, a)| **a)
            .map(|(lane, _)| ParticipantId::from_index(lane).expect("lane in range"))
    }
}

// =============================================================================
// PARTICIPANT STATE
// =============================================================================

/// Simulation state of one participant at one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    /// World position
    pub position: Vec3,
    /// Orientation (unit quaternion)
    pub orientation: Quat,
}

impl ParticipantState {
    /// Exact bit-level equality of both fields.
    #[inline]
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.position.bits_eq(other.position) && self.orientation.bits_eq(other.orientation)
    }
}

/// One tick's state for every lane, dense by participant index.
pub type StateRow = [ParticipantState; MAX_PARTICIPANTS];

/// Hash a simulation frame: tick, roster flags, then each active lane's
/// id, position, and orientation in lane order.
pub fn frame_hash(tick: u32, roster: &Roster, states: &StateRow) -> FrameHash {
    hash_frame(tick, |h| {
        for lane in 0..MAX_PARTICIPANTS {
            h.update_bool(roster.lane_active(lane));
        }
        for (lane, state) in states.iter().enumerate() {
            if roster.lane_active(lane) {
                h.update_u8(lane as u8 + 1);
                h.update_vec3(state.position);
                h.update_quat(state.orientation);
            }
        }
    })
}

// =============================================================================
// TESTS
// =============================================================================
