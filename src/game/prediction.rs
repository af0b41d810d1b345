//! Client Prediction Engine
//!
//! Maintains the client's rollback window: merges arriving remote inputs,
//! predicts the missing ones, determines how far back newly-arrived
//! information invalidates history, and drives resimulation through the
//! deterministic step function.
//!
//! Canonical conventions (applied uniformly, both directions):
//! - Windows are addressed by age after the tick has advanced, so
//!   age `k` always maps to tick `current_tick - k`.
//! - The state snapshot stored at tick `t` is the state *before* tick `t`'s
//!   input row is applied; applying row `t` produces the snapshot for
//!   `t + 1`.

use thiserror::Error;
use tracing::{debug, info};

use crate::core::window::{TickWindow, WindowError};
use crate::game::input::{InputFrame, InputRecord, InputSlot};
use crate::game::state::{ParticipantId, ParticipantState, Roster, StateRow};
use crate::game::step::step;
use crate::{Tick, MAX_PARTICIPANTS, ROLLBACK_WINDOW};

/// Errors from the prediction engine.
///
/// Network-origin conditions (expired or future-dated inputs) are dropped at
/// ingestion and never surface here; anything that does is a programming
/// invariant violation, not an environmental condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PredictionError {
    /// Window access outside the ages ingestion filtering guarantees.
    #[error("rollback window invariant violated: {0}")]
    Window(#[from] WindowError),
}

/// Client-side prediction and rollback engine.
///
/// One instance per session, owned by the client session driver; all windows
/// are allocated at construction and never resized.
pub struct PredictionEngine {
    local: ParticipantId,
    current_tick: Tick,
    roster: Roster,
    /// Input window: age x lane, age 0 = `current_tick`.
    inputs: TickWindow<InputSlot>,
    /// Snapshot window, same depth and age convention as `inputs`.
    history: TickWindow<ParticipantState>,
    /// State after the most recent resimulation (the snapshot for
    /// `current_tick + 1`, not yet recorded).
    live: StateRow,
    /// Newest confirmed tick per lane.
    last_confirmed: [Tick; MAX_PARTICIPANTS],
    /// Rollback request queued by an authoritative snapshot.
    pending_rollback: Option<Tick>,
    depth: usize,
}

impl PredictionEngine {
    /// Create an engine for the local participant, starting at the tick
    /// handed out by the handshake.
    pub fn new(local: ParticipantId, start_tick: Tick) -> Self {
        Self::with_depth(local, start_tick, ROLLBACK_WINDOW)
    }

    /// Create with a custom rollback window depth (tests use small windows).
    pub fn with_depth(local: ParticipantId, start_tick: Tick, depth: usize) -> Self {
        let mut roster = Roster::new();
        roster.join(local);
        Self {
            local,
            current_tick: start_tick,
            roster,
            inputs: TickWindow::new(depth, MAX_PARTICIPANTS),
            history: TickWindow::new(depth, MAX_PARTICIPANTS),
            live: Default::default(),
            last_confirmed: [0; MAX_PARTICIPANTS],
            pending_rollback: None,
            depth,
        }
    }

    /// The tick most recently produced.
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// The local participant id assigned at handshake.
    pub fn local_id(&self) -> ParticipantId {
        self.local
    }

    /// Active/inactive flags, read-only for the presentation layer.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Activate a participant. Its lane state and watermark reset, so a
    /// reused id starts from a clean slate.
    pub fn join(&mut self, id: ParticipantId) {
        if self.roster.join(id) {
            self.live[id.index()] = ParticipantState::default();
            self.last_confirmed[id.index()] = 0;
            info!("participant {} joined", id);
        }
    }

    /// Deactivate a participant. Indices stay stable; the lane is skipped
    /// until someone joins with the same id.
    pub fn leave(&mut self, id: ParticipantId) {
        if self.roster.leave(id) {
            info!("participant {} left", id);
        }
    }

    /// Latest resimulated state for a participant, if active.
    pub fn state(&self, id: ParticipantId) -> Option<&ParticipantState> {
        self.roster.is_active(id).then(|| &self.live[id.index()])
    }

    /// Latest resimulated state row (inactive lanes hold stale data).
    pub fn states(&self) -> &StateRow {
        &self.live
    }

    /// Run one fixed simulation step.
    ///
    /// `arrived` is the batch of confirmed remote records decoded since the
    /// last step, in arrival order; `local_frame` is this tick's local
    /// capture. Returns the local confirmed record for transmission.
    pub fn advance(
        &mut self,
        arrived: &[InputRecord],
        local_frame: InputFrame,
    ) -> Result<InputRecord, PredictionError> {
        self.current_tick += 1;
        self.inputs.shift();
        self.history.shift();

        let input_target = self.ingest(arrived)?;

        // An authoritative snapshot supersedes everything older than it (the
        // server never revises a simulated tick), and replaying from it
        // covers every newer arrival, so its tick *is* the target whenever
        // one is queued and still reachable.
        let target = match self.pending_rollback.take() {
            Some(tick) if self.reachable(tick) => tick,
            Some(tick) => {
                debug!(
                    "queued snapshot for tick {} expired out of the window",
                    tick
                );
                input_target
            }
            None => input_target,
        };

        self.backfill()?;

        // Local capture: confirmed by definition.
        let local_lane = self.local.index();
        self.inputs
            .set(0, local_lane, InputSlot::confirmed(self.current_tick, local_frame))?;
        self.last_confirmed[local_lane] = self.current_tick;

        // Record the pre-step state as the snapshot for `current_tick`.
        self.history.row_mut(0)?.copy_from_slice(&self.live);

        self.resimulate(target)?;

        Ok(InputRecord {
            participant: self.local,
            tick: self.current_tick,
            frame: local_frame,
        })
    }

    /// Merge an authoritative state snapshot into the history window and
    /// queue a rollback from its tick on the next step.
    ///
    /// Entries outside the retained window are dropped (with a log) exactly
    /// like expired inputs; this is not an error.
    pub fn ingest_snapshot(
        &mut self,
        tick: Tick,
        entries: &[(ParticipantId, ParticipantState)],
    ) -> Result<(), PredictionError> {
        if tick > self.current_tick {
            debug!(
                "snapshot for tick {} is ahead of local tick {}; dropped",
                tick, self.current_tick
            );
            return Ok(());
        }
        let age = (self.current_tick - tick) as usize;
        if age >= self.depth {
            debug!("snapshot for tick {} expired; dropped", tick);
            return Ok(());
        }

        for (id, state) in entries {
            self.history.set(age, id.index(), *state)?;
        }
        self.pending_rollback = Some(match self.pending_rollback {
            Some(earlier) => earlier.min(tick),
            None => tick,
        });
        Ok(())
    }

    /// Jump forward to a clock-sync estimate. Never rewinds: an estimate at
    /// or behind the current tick is ignored. A jump past the window depth
    /// abandons the retained history (it is unreachable at the new tick).
    pub fn resync(&mut self, tick: Tick) {
        if tick <= self.current_tick {
            return;
        }
        let jump = (tick - self.current_tick) as usize;
        info!(
            "clock resync: {} -> {} ({} ticks forward)",
            self.current_tick, tick, jump
        );
        if jump >= self.depth {
            self.inputs = TickWindow::new(self.depth, MAX_PARTICIPANTS);
            self.history = TickWindow::new(self.depth, MAX_PARTICIPANTS);
            self.current_tick = tick;
            self.pending_rollback = None;
        } else {
            for _ in 0..jump {
                self.current_tick += 1;
                self.inputs.shift();
                self.history.shift();
                // Hold the live state across the skipped ticks so later
                // rollbacks restore something coherent.
                if let Ok(row) = self.history.row_mut(0) {
                    row.copy_from_slice(&self.live);
                }
            }
        }
    }

    /// Whether a tick can still be restored from the window.
    fn reachable(&self, tick: Tick) -> bool {
        tick <= self.current_tick && ((self.current_tick - tick) as usize) < self.depth
    }

    /// Write arrived confirmed records into the input window. Returns the
    /// rollback target: the minimum accepted tick, or `current_tick` when
    /// nothing new arrived.
    fn ingest(&mut self, arrived: &[InputRecord]) -> Result<Tick, PredictionError> {
        let mut target = self.current_tick;

        for record in arrived {
            if record.tick > self.current_tick {
                debug!(
                    "input from {} for future tick {} (local {}); dropped",
                    record.participant, record.tick, self.current_tick
                );
                continue;
            }
            let age = (self.current_tick - record.tick) as usize;
            if age >= self.depth {
                debug!(
                    "input from {} for tick {} expired (local {}); dropped",
                    record.participant, record.tick, self.current_tick
                );
                continue;
            }

            let lane = record.participant.index();
            self.inputs
                .set(age, lane, InputSlot::confirmed(record.tick, record.frame))?;
            if record.tick > self.last_confirmed[lane] {
                self.last_confirmed[lane] = record.tick;
            }
            target = target.min(record.tick);
        }

        Ok(target)
    }

    /// For every active remote lane, copy the most recent confirmed record
    /// forward over the unconfirmed span, marked predicted. When the gap
    /// exceeds the window, the oldest retained record covers everything
    /// (full-window fallback).
    fn backfill(&mut self) -> Result<(), PredictionError> {
        for lane in 0..MAX_PARTICIPANTS {
            if !self.roster.lane_active(lane) || lane == self.local.index() {
                continue;
            }

            let gap = (self.current_tick - self.last_confirmed[lane]) as usize;
            if gap == 0 {
                continue;
            }

            let (span, source_age) = if gap < self.depth {
                (gap, gap)
            } else {
                (self.depth, self.depth - 1)
            };
            let source = self.inputs.get(source_age, lane)?.frame;
            for age in 0..span {
                let tick = self.current_tick - age as Tick;
                self.inputs.set(age, lane, InputSlot::predicted(tick, source))?;
            }
        }
        Ok(())
    }

    /// Resimulate from the rollback target through the current tick.
    ///
    /// With no new information this is a single forward step with no state
    /// restoration. Otherwise the snapshot recorded at the target is
    /// restored and every tick's row is re-applied in order, rewriting the
    /// snapshots it invalidated along the way. Bounded by the window depth.
    fn resimulate(&mut self, target: Tick) -> Result<(), PredictionError> {
        if target == self.current_tick {
            let next = step(&self.roster, &self.live, self.inputs.row(0)?);
            self.live = next;
            return Ok(());
        }

        debug!(
            "rollback to tick {} ({} ticks deep)",
            target,
            self.current_tick - target
        );

        let restore_age = (self.current_tick - target) as usize;
        self.live.copy_from_slice(self.history.row(restore_age)?);

        for tick in target..=self.current_tick {
            let age = (self.current_tick - tick) as usize;
            let next = step(&self.roster, &self.live, self.inputs.row(age)?);
            if tick < self.current_tick {
                let snapshot_age = (self.current_tick - (tick + 1)) as usize;
                self.history.row_mut(snapshot_age)?.copy_from_slice(&next);
            }
            self.live = next;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec3::Vec3;
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
    const RIGHT: InputFrame = InputFrame::from_flags(false, false, false, true);

    #[test]
    fn test_backfill_concrete_scenario() {
        // Window depth 4, current tick reaches 10, participant 2's last
        // confirmed tick is 7. Ages 0..=2 (ticks 10, 9, 8) must hold
        // predicted copies of the tick-7 record; age 3 stays confirmed.
        let mut engine = PredictionEngine::with_depth(pid(1), 6, 4);
        engine.join(pid(2));

        engine.advance(&[record(2, 7, RIGHT)], FWD).unwrap(); // tick 7
        engine.advance(&[], FWD).unwrap(); // tick 8
        engine.advance(&[], FWD).unwrap(); // tick 9
        engine.advance(&[], FWD).unwrap(); // tick 10

        assert_eq!(engine.current_tick(), 10);
        let lane = pid(2).index();
        for age in 0..3 {
            let slot = engine.inputs.get(age, lane).unwrap();
            assert!(slot.predicted, "age {} should be predicted", age);
            assert_eq!(slot.frame, RIGHT);
        }
        let confirmed = engine.inputs.get(3, lane).unwrap();
        assert!(!confirmed.predicted);
        assert_eq!(confirmed.tick, 7);
        assert_eq!(confirmed.frame, RIGHT);
    }

    #[test]
    fn test_expired_input_never_mutates() {
        // Two identical engines; one is fed a record at exactly
        // current - depth (one past the oldest retained tick). Every window
        // slot, watermark, and live state must match the control.
        let mut fed = PredictionEngine::with_depth(pid(1), 100, 4);
        let mut control = PredictionEngine::with_depth(pid(1), 100, 4);
        fed.join(pid(2));
        control.join(pid(2));
        fed.advance(&[], InputFrame::neutral()).unwrap(); // tick 101
        control.advance(&[], InputFrame::neutral()).unwrap();

        // Next advance reaches tick 102; tick 98 = 102 - depth is expired.
        fed.advance(&[record(2, 98, RIGHT)], InputFrame::neutral()).unwrap();
        control.advance(&[], InputFrame::neutral()).unwrap();

        assert_eq!(fed.last_confirmed, control.last_confirmed);
        for age in 0..4 {
            for lane in 0..MAX_PARTICIPANTS {
                assert_eq!(
                    fed.inputs.get(age, lane).unwrap(),
                    control.inputs.get(age, lane).unwrap(),
                    "slot ({}, {}) mutated by expired input",
                    age,
                    lane
                );
            }
        }
        for lane in 0..MAX_PARTICIPANTS {
            assert!(fed.live[lane].bits_eq(&control.live[lane]));
        }
    }

    #[test]
    fn test_future_input_dropped() {
        let mut engine = PredictionEngine::with_depth(pid(1), 10, 8);
        engine.join(pid(2));

        engine.advance(&[record(2, 25, FWD)], InputFrame::neutral()).unwrap(); // tick 11
        assert_eq!(engine.last_confirmed[pid(2).index()], 0);
        let slot = engine.inputs.get(0, pid(2).index()).unwrap();
        assert!(slot.predicted);
    }

    #[test]
    fn test_never_confirmed_stays_neutral_prediction() {
        let mut engine = PredictionEngine::with_depth(pid(1), 50, 8);
        engine.join(pid(2));

        for _ in 0..10 {
            engine.advance(&[], FWD).unwrap();
        }
        // Remote lane never moved: all predictions are neutral.
        let remote = engine.state(pid(2)).unwrap();
        assert!(remote.position.bits_eq(Vec3::ZERO));
        // Local lane did move forward.
        let local = engine.state(pid(1)).unwrap();
        assert!((local.position.z - 10.0 * MOVE_SPEED).abs() < 1e-5);
    }

    #[test]
    fn test_rollback_matches_uninterrupted_forward() {
        // Same input history, delivered promptly vs. three ticks late: the
        // rollback/replay path must be observationally equivalent to never
        // having rolled back.
        let remote_frame = |tick: Tick| -> InputFrame {
            if tick < 115 {
                if tick % 2 == 0 {
                    FWD
                } else {
                    RIGHT
                }
            } else {
                // constant tail so trailing predictions are exact
                FWD
            }
        };
        let local_frame = |tick: Tick| -> InputFrame {
            if tick % 3 == 0 {
                RIGHT
            } else {
                InputFrame::neutral()
            }
        };

        let mut prompt = PredictionEngine::new(pid(1), 100);
        let mut delayed = PredictionEngine::new(pid(1), 100);
        prompt.join(pid(2));
        delayed.join(pid(2));

        for i in 1..=20u32 {
            let tick = 100 + i;
            prompt
                .advance(&[record(2, tick, remote_frame(tick))], local_frame(tick))
                .unwrap();

            let late: Vec<InputRecord> = if tick >= 104 {
                vec![record(2, tick - 3, remote_frame(tick - 3))]
            } else {
                vec![]
            };
            delayed.advance(&late, local_frame(tick)).unwrap();
        }

        assert_eq!(prompt.current_tick(), delayed.current_tick());
        for id in [pid(1), pid(2)] {
            assert!(
                prompt.state(id).unwrap().bits_eq(delayed.state(id).unwrap()),
                "{} diverged after rollback replay",
                id
            );
        }
    }

    #[test]
    fn test_authoritative_snapshot_corrects_remote() {
        let mut engine = PredictionEngine::with_depth(pid(1), 10, 8);
        engine.join(pid(2));

        for _ in 0..4 {
            engine.advance(&[], InputFrame::neutral()).unwrap();
        }
        // Locally, participant 2 never moved.
        assert!(engine.state(pid(2)).unwrap().position.bits_eq(Vec3::ZERO));

        // The server says otherwise at tick 12.
        let corrected = ParticipantState {
            position: Vec3::new(5.0, 0.0, 0.0),
            ..Default::default()
        };
        engine
            .ingest_snapshot(12, &[(pid(1), ParticipantState::default()), (pid(2), corrected)])
            .unwrap();

        engine.advance(&[], InputFrame::neutral()).unwrap(); // tick 15
        // Neutral predictions on top of the restored snapshot: the corrected
        // position carries forward exactly.
        assert!(engine.state(pid(2)).unwrap().position.bits_eq(corrected.position));
    }

    #[test]
    fn test_snapshot_from_future_is_dropped() {
        let mut engine = PredictionEngine::with_depth(pid(1), 10, 8);
        engine
            .ingest_snapshot(
                99,
                &[(pid(1), ParticipantState { position: Vec3::new(1.0, 1.0, 1.0), ..Default::default() })],
            )
            .unwrap();
        engine.advance(&[], InputFrame::neutral()).unwrap();
        assert!(engine.state(pid(1)).unwrap().position.bits_eq(Vec3::ZERO));
    }

    #[test]
    fn test_resync_forward_only() {
        let mut engine = PredictionEngine::new(pid(1), 100);
        engine.resync(50);
        assert_eq!(engine.current_tick(), 100);

        engine.resync(105);
        assert_eq!(engine.current_tick(), 105);

        engine.resync(500);
        assert_eq!(engine.current_tick(), 500);
        engine.advance(&[], InputFrame::neutral()).unwrap();
        assert_eq!(engine.current_tick(), 501);
    }

    #[test]
    fn test_duplicate_confirmation_is_a_noop() {
        // Re-delivering an already-confirmed record forces a rollback that
        // must recompute exactly the same history.
        let mut once = PredictionEngine::new(pid(1), 100);
        let mut twice = PredictionEngine::new(pid(1), 100);
        once.join(pid(2));
        twice.join(pid(2));

        for i in 1..=5u32 {
            let rec = record(2, 100 + i, FWD);
            once.advance(&[rec], RIGHT).unwrap();
            twice.advance(&[rec, rec], RIGHT).unwrap();
        }
        // A stale duplicate from several ticks back changes nothing either.
        once.advance(&[], RIGHT).unwrap();
        twice.advance(&[record(2, 102, FWD)], RIGHT).unwrap();

        for id in [pid(1), pid(2)] {
            assert!(once.state(id).unwrap().bits_eq(twice.state(id).unwrap()));
        }
        assert_eq!(once.last_confirmed, twice.last_confirmed);
    }

    #[test]
    fn test_advance_returns_local_record() {
        let mut engine = PredictionEngine::new(pid(3), 7);
        let out = engine.advance(&[], RIGHT).unwrap();
        assert_eq!(out.participant, pid(3));
        assert_eq!(out.tick, 8);
        assert_eq!(out.frame, RIGHT);
    }
}
