//! Input Frames, Records, and Traces
//!
//! The four directional action flags pack into one byte with accessor
//! methods. Window storage ([`InputSlot`]) carries no participant id — the
//! lane implies it — while the wire/API type ([`InputRecord`]) is a
//! confirmed record by construction; prediction status lives only in slots.

use serde::{Deserialize, Serialize};

use crate::core::vec3::Vec3;
use crate::game::state::ParticipantId;
use crate::Tick;

// =============================================================================
// INPUT FRAME
// =============================================================================

/// One tick's boolean action flags, packed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Action flags (packed bits):
    /// - Bit 0: forward
    /// - Bit 1: left
    /// - Bit 2: back
    /// - Bit 3: right
    /// - Bit 4-7: Reserved
    pub flags: u8,
}

impl InputFrame {
    /// Forward flag bit
    pub const FLAG_FORWARD: u8 = 0x01;

    /// Left flag bit
    pub const FLAG_LEFT: u8 = 0x02;

    /// Back flag bit
    pub const FLAG_BACK: u8 = 0x04;

    /// Right flag bit
    pub const FLAG_RIGHT: u8 = 0x08;

    /// Neutral frame, no flags held.
    pub const fn neutral() -> Self {
        Self { flags: 0 }
    }

    /// Build from individual flags.
    pub const fn from_flags(forward: bool, left: bool, back: bool, right: bool) -> Self {
        let mut flags = 0u8;
        if forward {
            flags |= Self::FLAG_FORWARD;
        }
        if left {
            flags |= Self::FLAG_LEFT;
        }
        if back {
            flags |= Self::FLAG_BACK;
        }
        if right {
            flags |= Self::FLAG_RIGHT;
        }
        Self { flags }
    }

    /// Forward held.
    #[inline]
    pub const fn forward(&self) -> bool {
        self.flags & Self::FLAG_FORWARD != 0
    }

    /// Left held.
    #[inline]
    pub const fn left(&self) -> bool {
        self.flags & Self::FLAG_LEFT != 0
    }

    /// Back held.
    #[inline]
    pub const fn back(&self) -> bool {
        self.flags & Self::FLAG_BACK != 0
    }

    /// Right held.
    #[inline]
    pub const fn right(&self) -> bool {
        self.flags & Self::FLAG_RIGHT != 0
    }

    /// No flags held.
    #[inline]
    pub const fn is_neutral(&self) -> bool {
        self.flags == 0
    }

    /// Combine the directional flags into an X/Z plane vector (not yet
    /// normalized). Right is +X, forward is +Z.
    #[inline]
    pub fn move_direction(&self) -> Vec3 {
        let mut dir = Vec3::ZERO;
        if self.forward() {
            dir.z += 1.0;
        }
        if self.back() {
            dir.z -= 1.0;
        }
        if self.right() {
            dir.x += 1.0;
        }
        if self.left() {
            dir.x -= 1.0;
        }
        dir
    }
}

// =============================================================================
// WINDOW SLOT AND WIRE RECORD
// =============================================================================

/// One (tick, lane) cell of an input window.
///
/// `predicted` distinguishes synthesized values from confirmed ones; a fresh
/// slot is neutral and predicted until something confirms it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSlot {
    /// Tick this slot currently describes
    pub tick: Tick,
    /// The action flags
    pub frame: InputFrame,
    /// True when the value was synthesized by prediction
    pub predicted: bool,
}

impl Default for InputSlot {
    fn default() -> Self {
        Self {
            tick: 0,
            frame: InputFrame::neutral(),
            predicted: true,
        }
    }
}

impl InputSlot {
    /// A confirmed slot for a tick.
    pub const fn confirmed(tick: Tick, frame: InputFrame) -> Self {
        Self {
            tick,
            frame,
            predicted: false,
        }
    }

    /// A predicted copy of `frame` for a tick.
    pub const fn predicted(tick: Tick, frame: InputFrame) -> Self {
        Self {
            tick,
            frame,
            predicted: true,
        }
    }
}

/// A confirmed input as exchanged between peers.
///
/// Re-ingesting the same record for the same (participant, tick) is
/// observationally a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Who pressed it
    pub participant: ParticipantId,
    /// Tick it was captured for
    pub tick: Tick,
    /// The action flags
    pub frame: InputFrame,
}

// =============================================================================
// INPUT TRACE
// =============================================================================

/// Delta-compressed recording of one participant's confirmed timeline.
///
/// Only stores ticks where the frame changed, which keeps a full session's
/// trace small enough to serialize for offline desync analysis. Replayed
/// through the step function to verify the authoritative timeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputTrace {
    /// Tick of the first recorded entry (0 until anything is recorded)
    pub start_tick: Tick,
    /// Tick of the last recorded entry
    pub end_tick: Tick,
    /// (tick, frame) pairs, stored only on change
    deltas: Vec<(Tick, InputFrame)>,
    #[serde(skip)]
    last_frame: InputFrame,
    #[serde(skip)]
    recorded_any: bool,
}

impl InputTrace {
    /// Empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the frame used for a tick. Ticks must be fed in order.
    pub fn record(&mut self, tick: Tick, frame: InputFrame) {
        if !self.recorded_any {
            self.start_tick = tick;
            self.recorded_any = true;
            self.deltas.push((tick, frame));
            self.last_frame = frame;
        } else if frame != self.last_frame {
            self.deltas.push((tick, frame));
            self.last_frame = frame;
        }
        self.end_tick = tick;
    }

    /// The frame in effect at a tick (neutral before the first delta).
    pub fn frame_at(&self, tick: Tick) -> InputFrame {
        let idx = self.deltas.partition_point(|(t, _)| *t <= tick);
        if idx == 0 {
            InputFrame::neutral()
        } else {
            self.deltas[idx - 1].1
        }
    }

    /// Number of stored deltas.
    pub fn delta_count(&self) -> usize {
        self.deltas.len()
    }

    /// Whether anything was recorded.
    pub fn is_empty(&self) -> bool {
        !self.recorded_any && self.deltas.is_empty()
    }

    /// Iterate every tick from `start_tick` to `end_tick` with the frame in
    /// effect.
    pub fn replay_iter(&self) -> ReplayIter<'_> {
        ReplayIter {
            trace: self,
            current_tick: self.start_tick,
            delta_idx: 0,
            current_frame: InputFrame::neutral(),
            done: self.deltas.is_empty(),
        }
    }

    /// Serialize to binary for offline analysis.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Iterator replaying a trace tick-by-tick.
pub struct ReplayIter<'a> {
    trace: &'a InputTrace,
    current_tick: Tick,
    delta_idx: usize,
    current_frame: InputFrame,
    done: bool,
}

impl<'a> Iterator for ReplayIter<'a> {
    type Item = (Tick, InputFrame);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.current_tick > self.trace.end_tick {
            return None;
        }

        while self.delta_idx < self.trace.deltas.len() {
            let (tick, frame) = self.trace.deltas[self.delta_idx];
            if tick <= self.current_tick {
                self.current_frame = frame;
                self.delta_idx += 1;
            } else {
                break;
            }
        }

        let result = (self.current_tick, self.current_frame);
        if self.current_tick == self.trace.end_tick {
            self.done = true;
        } else {
            self.current_tick += 1;
        }
        Some(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
