//! Simulation types and engines.
//!
//! Everything in this module is deterministic given the same message
//! arrival order; the only nondeterminism in the system lives at the
//! transport edge.

pub mod input;
pub mod prediction;
pub mod reconcile;
pub mod replay;
pub mod state;
pub mod step;

pub use input::{InputFrame, InputRecord, InputSlot, InputTrace};
pub use prediction::{PredictionEngine, PredictionError};
pub use reconcile::{ReconcileError, ReconciliationEngine};
pub use replay::replay_session;
pub use state::{frame_hash, ParticipantId, ParticipantState, Roster, StateRow};
pub use step::{step, MOVE_SPEED};
