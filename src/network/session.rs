//! Session Drivers
//!
//! Transport-free glue between the wire protocol and the engines: decoded
//! messages in, recipient-tagged outbound batches out. One driver instance
//! per session side, owned by the embedding application — there are no
//! process-wide singletons anywhere in the core.
//!
//! The embedding application is expected to run a fixed-rate loop per side:
//! drain the transport, feed each decoded message to `handle_message`, call
//! `advance` exactly once, and ship the returned outbound messages on the
//! channel each one names.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{info, warn};

use crate::game::input::{InputFrame, InputRecord};
use crate::game::prediction::{PredictionEngine, PredictionError};
use crate::game::reconcile::{ReconcileError, ReconciliationEngine};
use crate::game::state::{ParticipantId, ParticipantState, Roster};
use crate::network::clock::ClockSync;
use crate::network::protocol::{Channel, Message, SnapshotEntry};
use crate::Tick;

// =============================================================================
// OUTBOUND
// =============================================================================

/// Who an outbound message goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// One participant.
    One(ParticipantId),
    /// Every connected participant.
    All,
    /// Every connected participant except one (relay pattern).
    AllExcept(ParticipantId),
}

/// A message the transport layer must deliver.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Delivery target
    pub recipient: Recipient,
    /// Required channel semantics
    pub channel: Channel,
    /// The message itself
    pub message: Message,
}

impl Outbound {
    fn new(recipient: Recipient, message: Message) -> Self {
        let channel = message.channel();
        Self {
            recipient,
            channel,
            message,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Session driver errors. Only invariant violations from the engines and
/// driving a client before its handshake surface here; malformed or
/// unexpected traffic is logged and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Client driven before a handshake assigned it an id.
    #[error("no participant id assigned yet")]
    NotJoined,

    /// Prediction engine invariant violation.
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    /// Reconciliation engine invariant violation.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

// =============================================================================
// SERVER SESSION
// =============================================================================

/// Server-side driver: roster admission, input relay, clock service, and
/// snapshot broadcast around the reconciliation engine.
pub struct ServerSession {
    engine: ReconciliationEngine,
    /// Monotonic realtime tick, advanced once per fixed step regardless of
    /// whether the simulation was ready.
    realtime_tick: Tick,
}

impl ServerSession {
    /// Create a server whose first simulated tick is `start_tick`.
    pub fn new(start_tick: Tick) -> Self {
        Self {
            engine: ReconciliationEngine::new(start_tick),
            realtime_tick: start_tick,
        }
    }

    /// The authoritative engine (states, roster, traces).
    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Current realtime tick.
    pub fn realtime_tick(&self) -> Tick {
        self.realtime_tick
    }

    /// A connection came up; its stable connection id is reused as the
    /// participant id. Emits the handshake to the newcomer and a join to
    /// everyone else.
    pub fn on_connect(&mut self, id: ParticipantId) -> Vec<Outbound> {
        self.engine.join(id);
        vec![
            Outbound::new(
                Recipient::One(id),
                Message::Handshake {
                    participant: id,
                    tick: self.realtime_tick,
                    roster: self.engine.roster().flags(),
                },
            ),
            Outbound::new(Recipient::AllExcept(id), Message::Join { participant: id }),
        ]
    }

    /// A connection went down.
    pub fn on_disconnect(&mut self, id: ParticipantId) -> Vec<Outbound> {
        self.engine.leave(id);
        vec![Outbound::new(
            Recipient::AllExcept(id),
            Message::Leave { participant: id },
        )]
    }

    /// Handle one decoded message from a connected participant. `now_ms` is
    /// the wall clock reading used to answer TimeRequest.
    pub fn handle_message(
        &mut self,
        from: ParticipantId,
        message: Message,
        now_ms: f64,
    ) -> Result<Vec<Outbound>, SessionError> {
        match message {
            Message::ClientInput(record) => {
                if record.participant != from {
                    warn!(
                        "input labeled {} arrived from {}; dropped",
                        record.participant, from
                    );
                    return Ok(vec![]);
                }
                self.engine.ingest(&[record])?;
                Ok(vec![Outbound::new(
                    Recipient::AllExcept(from),
                    Message::RelayedInput(record),
                )])
            }
            Message::TimeRequest => Ok(vec![Outbound::new(
                Recipient::One(from),
                Message::TimeSync {
                    server_tick: self.realtime_tick,
                    server_time_ms: now_ms,
                },
            )]),
            other => {
                warn!(
                    "unexpected header {} from {}; dropped",
                    other.header(),
                    from
                );
                Ok(vec![])
            }
        }
    }

    /// Run one fixed step: bump the realtime counter, let the engine decide
    /// whether the awaited tick is ready, and broadcast a snapshot of every
    /// active participant when it simulated.
    pub fn advance(&mut self) -> Result<Vec<Outbound>, SessionError> {
        self.realtime_tick += 1;

        let Some(simulated) = self.engine.advance(self.realtime_tick)? else {
            return Ok(vec![]);
        };

        let states = self.engine.states();
        let entries: Vec<SnapshotEntry> = self
            .engine
            .roster()
            .iter_active()
            .map(|id| SnapshotEntry {
                participant: id,
                state: states[id.index()],
            })
            .collect();

        // The broadcast state is current at the tick after the one just
        // simulated, matching the snapshot convention on the client.
        Ok(vec![Outbound::new(
            Recipient::All,
            Message::StateSnapshot {
                tick: simulated + 1,
                entries,
            },
        )])
    }
}

// =============================================================================
// CLIENT SESSION
// =============================================================================

/// Client-side driver: handshake bring-up, the single-producer queue of
/// relayed inputs drained once per step, snapshot and clock application
/// around the prediction engine.
#[derive(Default)]
pub struct ClientSession {
    engine: Option<PredictionEngine>,
    clock: ClockSync,
    /// Relayed inputs decoded since the last step, in arrival order.
    pending_inputs: VecDeque<InputRecord>,
}

impl ClientSession {
    /// A session waiting for its handshake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the handshake completed.
    pub fn is_joined(&self) -> bool {
        self.engine.is_some()
    }

    /// The id assigned at handshake.
    pub fn local_id(&self) -> Option<ParticipantId> {
        self.engine.as_ref().map(|e| e.local_id())
    }

    /// The tick most recently produced.
    pub fn current_tick(&self) -> Option<Tick> {
        self.engine.as_ref().map(|e| e.current_tick())
    }

    /// Roster flags for the presentation layer.
    pub fn roster(&self) -> Option<&Roster> {
        self.engine.as_ref().map(|e| e.roster())
    }

    /// Latest resimulated state of a participant, if known and active.
    pub fn state(&self, id: ParticipantId) -> Option<&ParticipantState> {
        self.engine.as_ref().and_then(|e| e.state(id))
    }

    /// The message that asks the server for a clock reading.
    pub fn time_request(&self) -> Message {
        Message::TimeRequest
    }

    /// Handle one decoded server message. `now_ms` is the local wall clock
    /// reading, used for clock offset estimation.
    pub fn handle_message(&mut self, message: Message, now_ms: f64) -> Result<(), SessionError> {
        match message {
            Message::Handshake {
                participant,
                tick,
                roster,
            } => {
                if self.engine.is_some() {
                    warn!("second handshake received; rebuilding session state");
                }
                let mut engine = PredictionEngine::new(participant, tick);
                for (lane, active) in roster.iter().enumerate() {
                    if *active {
                        if let Some(id) = ParticipantId::from_index(lane) {
                            engine.join(id);
                        }
                    }
                }
                info!("joined as {} at tick {}", participant, tick);
                self.engine = Some(engine);
                self.pending_inputs.clear();
            }
            Message::Join { participant } => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.join(participant);
                } else {
                    warn!("roster join before handshake; dropped");
                }
            }
            Message::Leave { participant } => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.leave(participant);
                } else {
                    warn!("roster leave before handshake; dropped");
                }
            }
            Message::RelayedInput(record) => {
                // Queued, not applied: the step loop drains this exactly
                // once per tick to preserve a total order of application.
                self.pending_inputs.push_back(record);
            }
            Message::StateSnapshot { tick, entries } => {
                if let Some(engine) = self.engine.as_mut() {
                    let entries: Vec<(ParticipantId, ParticipantState)> = entries
                        .iter()
                        .map(|e| (e.participant, e.state))
                        .collect();
                    engine.ingest_snapshot(tick, &entries)?;
                } else {
                    warn!("state snapshot before handshake; dropped");
                }
            }
            Message::TimeSync {
                server_tick,
                server_time_ms,
            } => {
                let estimate = self.clock.observe(server_tick, server_time_ms, now_ms);
                if let Some(engine) = self.engine.as_mut() {
                    engine.resync(estimate);
                }
            }
            other => {
                warn!("server-bound header {} on client; dropped", other.header());
            }
        }
        Ok(())
    }

    /// Run one fixed step with this tick's locally captured flags. Returns
    /// the input message to send on the unreliable channel.
    pub fn advance(&mut self, local_frame: InputFrame) -> Result<Message, SessionError> {
        let engine = self.engine.as_mut().ok_or(SessionError::NotJoined)?;
        let arrived: Vec<InputRecord> = self.pending_inputs.drain(..).collect();
        let record = engine.advance(&arrived, local_frame)?;
        Ok(Message::ClientInput(record))
    }
}

// =============================================================================
// TESTS
// =============================================================================
