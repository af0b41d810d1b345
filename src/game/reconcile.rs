//! Server Reconciliation Engine
//!
//! Buffers future-dated client inputs per tick, decides when the oldest
//! unsimulated tick is ready, and advances the authoritative timeline. The
//! server never rewinds: unlike the client it has no rollback target, only a
//! bounded-wait policy for deciding *when* to move forward.

use thiserror::Error;
use tracing::{debug, info};

use crate::core::window::{TickWindow, WindowError};
use crate::game::input::{InputRecord, InputSlot, InputTrace};
use crate::game::state::{ParticipantId, ParticipantState, Roster, StateRow};
use crate::game::step::step;
use crate::{Tick, MAX_PARTICIPANTS, MAX_SIM_WAIT_TICKS, PENDING_WINDOW};

/// Errors from the reconciliation engine. As with the client engine, only
/// internal invariant violations surface; dropped network input is logged
/// and contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Pending-window access outside the offsets ingestion guarantees.
    #[error("pending window invariant violated: {0}")]
    Window(#[from] WindowError),
}

/// Server-side authoritative engine.
///
/// The pending window is forward-looking: the slot for tick `t` sits at
/// `offset = depth - 1 - (t - tick_awaiting)`, so the nearest-to-ready tick
/// occupies the highest offset, mirroring the client's age convention, and
/// the same `shift` primitive retires a simulated row while seeding the
/// farthest-future row neutral and predicted.
pub struct ReconciliationEngine {
    /// Oldest tick not yet simulated.
    tick_awaiting: Tick,
    pending: TickWindow<InputSlot>,
    roster: Roster,
    live: StateRow,
    /// Confirmed-or-predicted timeline actually simulated, per lane.
    traces: [InputTrace; MAX_PARTICIPANTS],
    depth: usize,
}

impl ReconciliationEngine {
    /// Create an engine whose first simulated tick will be `start_tick`.
    pub fn new(start_tick: Tick) -> Self {
        Self::with_depth(start_tick, PENDING_WINDOW)
    }

    /// Create with a custom pending window depth (tests use small windows).
    pub fn with_depth(start_tick: Tick, depth: usize) -> Self {
        Self {
            tick_awaiting: start_tick,
            pending: TickWindow::new(depth, MAX_PARTICIPANTS),
            roster: Roster::new(),
            live: Default::default(),
            traces: Default::default(),
            depth,
        }
    }

    /// The oldest tick still awaiting inputs.
    pub fn tick_awaiting(&self) -> Tick {
        self.tick_awaiting
    }

    /// Active/inactive flags.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Activate a participant; its lane state and trace restart clean.
    pub fn join(&mut self, id: ParticipantId) {
        if self.roster.join(id) {
            self.live[id.index()] = ParticipantState::default();
            self.traces[id.index()] = InputTrace::new();
            info!("participant {} joined", id);
        }
    }

    /// Deactivate a participant; its recorded trace is kept for replay.
    pub fn leave(&mut self, id: ParticipantId) {
        if self.roster.leave(id) {
            info!("participant {} left", id);
        }
    }

    /// Authoritative state of one participant, if active.
    pub fn state(&self, id: ParticipantId) -> Option<&ParticipantState> {
        self.roster.is_active(id).then(|| &self.live[id.index()])
    }

    /// Authoritative state row.
    pub fn states(&self) -> &StateRow {
        &self.live
    }

    /// Per-lane recordings of the simulated timeline.
    pub fn traces(&self) -> &[InputTrace; MAX_PARTICIPANTS] {
        &self.traces
    }

    /// Buffer arrived client inputs. A tick earlier than `tick_awaiting` is
    /// expired; a tick at or past `tick_awaiting + depth` is unreachable.
    /// Both are dropped with a log, never an error.
    pub fn ingest(&mut self, records: &[InputRecord]) -> Result<(), ReconcileError> {
        for record in records {
            if record.tick < self.tick_awaiting {
                debug!(
                    "input from {} for tick {} expired (awaiting {}); dropped",
                    record.participant, record.tick, self.tick_awaiting
                );
                continue;
            }
            let ahead = (record.tick - self.tick_awaiting) as usize;
            if ahead >= self.depth {
                debug!(
                    "input from {} for tick {} beyond pending window (awaiting {}); dropped",
                    record.participant, record.tick, self.tick_awaiting
                );
                continue;
            }

            let offset = self.depth - 1 - ahead;
            self.pending.set(
                offset,
                record.participant.index(),
                InputSlot::confirmed(record.tick, record.frame),
            )?;
        }
        Ok(())
    }

    /// Simulate the awaited tick if it is ready.
    ///
    /// Ready means every active lane holds a confirmed entry, or the
    /// realtime counter has run more than [`MAX_SIM_WAIT_TICKS`] ahead of
    /// the awaited tick (bounded wait — the server must not stall for a
    /// silent client; missing entries simulate as their current predicted
    /// content). Returns the simulated tick so the caller can broadcast a
    /// snapshot, or `None` when nothing was simulated this pass. A given
    /// tick is simulated exactly once.
    pub fn advance(&mut self, realtime_tick: Tick) -> Result<Option<Tick>, ReconcileError> {
        let ready_row = self.pending.row(self.depth - 1)?;

        let all_confirmed = ready_row
            .iter()
            .enumerate()
            .filter(|(lane, _)| self.roster.lane_active(*lane))
            .all(|(_, slot)| !slot.predicted);
        let waited_out =
            realtime_tick.saturating_sub(self.tick_awaiting) > MAX_SIM_WAIT_TICKS;

        if !all_confirmed && !waited_out {
            return Ok(None);
        }
        if !all_confirmed {
            debug!(
                "inputs missing for tick {}; simulating with predictions after bounded wait",
                self.tick_awaiting
            );
        }

        let simulated = self.tick_awaiting;
        for (lane, slot) in ready_row.iter().enumerate() {
            if self.roster.lane_active(lane) {
                self.traces[lane].record(simulated, slot.frame);
            }
        }

        self.live = step(&self.roster, &self.live, ready_row);
        self.pending.shift();
        self.tick_awaiting += 1;

        Ok(Some(simulated))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::InputFrame;
    use crate::game::step::MOVE_SPEED;

    fn pid(raw: u8) -> ParticipantId {
        ParticipantId::new(raw).unwrap()
    }

    fn record(raw: u8, tick: Tick, frame: InputFrame) -> InputRecord {
        InputRecord {
            participant: pid(raw),
            tick,
            frame,
        }
    }

    const FWD: InputFrame = InputFrame::from_flags(true, false, false, false);

    #[test]
    fn test_ready_when_all_confirmed() {
        let mut engine = ReconciliationEngine::with_depth(100, 8);
        engine.join(pid(1));
        engine.join(pid(2));

        // Nothing buffered: not ready, realtime well within the wait bound.
        assert_eq!(engine.advance(100).unwrap(), None);

        engine
            .ingest(&[record(1, 100, FWD), record(2, 100, FWD)])
            .unwrap();
        assert_eq!(engine.advance(100).unwrap(), Some(100));
        assert_eq!(engine.tick_awaiting(), 101);
    }

    #[test]
    fn test_offset_formula() {
        let mut engine = ReconciliationEngine::with_depth(100, 8);
        engine.join(pid(1));

        // The awaited tick lands on the highest offset (the ready row).
        engine.ingest(&[record(1, 100, FWD)]).unwrap();
        let slot = engine.pending.get(7, 0).unwrap();
        assert!(!slot.predicted);
        assert_eq!(slot.tick, 100);

        // The farthest ingestible tick lands on offset 0.
        engine.ingest(&[record(1, 107, FWD)]).unwrap();
        let slot = engine.pending.get(0, 0).unwrap();
        assert!(!slot.predicted);
        assert_eq!(slot.tick, 107);
    }

    #[test]
    fn test_expired_and_future_dropped() {
        let mut engine = ReconciliationEngine::with_depth(100, 8);
        engine.join(pid(1));

        engine.ingest(&[record(1, 99, FWD)]).unwrap(); // expired
        engine.ingest(&[record(1, 108, FWD)]).unwrap(); // one past the window

        for offset in 0..8 {
            assert!(
                engine.pending.get(offset, 0).unwrap().predicted,
                "offset {} should be untouched",
                offset
            );
        }
    }

    #[test]
    fn test_bounded_wait_simulates_exactly_once() {
        let mut engine = ReconciliationEngine::with_depth(50, 8);
        engine.join(pid(1));
        engine.join(pid(2));

        // Only participant 1 reports.
        engine.ingest(&[record(1, 50, FWD)]).unwrap();

        let mut simulated = Vec::new();
        // Drive realtime from 50 to 80; the first MAX_SIM_WAIT_TICKS passes
        // must produce nothing.
        for realtime in 50..=80u32 {
            if let Some(tick) = engine.advance(realtime).unwrap() {
                simulated.push((realtime, tick));
            }
        }

        // Nothing before the bound was exceeded.
        assert_eq!(simulated.first().unwrap().0, 50 + MAX_SIM_WAIT_TICKS + 1);
        // Each tick simulated exactly once, in order, no stall afterwards.
        let ticks: Vec<Tick> = simulated.iter().map(|(_, t)| *t).collect();
        let expected: Vec<Tick> = (50..50 + ticks.len() as Tick).collect();
        assert_eq!(ticks, expected);
    }

    #[test]
    fn test_silent_lane_simulates_neutral() {
        let mut engine = ReconciliationEngine::with_depth(10, 4);
        engine.join(pid(1));
        engine.join(pid(2));

        engine.ingest(&[record(1, 10, FWD)]).unwrap();
        // Force the bounded-wait path.
        let tick = engine.advance(10 + MAX_SIM_WAIT_TICKS + 1).unwrap();
        assert_eq!(tick, Some(10));

        // Participant 1 moved, the silent participant 2 did not.
        assert!((engine.state(pid(1)).unwrap().position.z - MOVE_SPEED).abs() < 1e-6);
        assert_eq!(engine.state(pid(2)).unwrap().position.z, 0.0);
    }

    #[test]
    fn test_advance_records_traces() {
        let mut engine = ReconciliationEngine::with_depth(10, 4);
        engine.join(pid(1));

        for tick in 10..14u32 {
            engine.ingest(&[record(1, tick, FWD)]).unwrap();
            assert_eq!(engine.advance(tick).unwrap(), Some(tick));
        }

        let trace = &engine.traces()[0];
        assert_eq!(trace.start_tick, 10);
        assert_eq!(trace.end_tick, 13);
        assert_eq!(trace.frame_at(12), FWD);
        // Constant input compresses to one delta.
        assert_eq!(trace.delta_count(), 1);
    }

    #[test]
    fn test_never_rewinds() {
        let mut engine = ReconciliationEngine::with_depth(10, 4);
        engine.join(pid(1));

        engine.ingest(&[record(1, 10, FWD)]).unwrap();
        engine.advance(10).unwrap();

        // A late duplicate for the already-simulated tick is expired.
        engine.ingest(&[record(1, 10, FWD)]).unwrap();
        assert_eq!(engine.advance(11).unwrap(), None);
        assert_eq!(engine.tick_awaiting(), 11);
    }
}
