//! # Rollback Netcode Core
//!
//! Prediction, rollback, and reconciliation machinery for a tick-based
//! client-server multiplayer simulation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ROLLBACK NETCODE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── vec3.rs     - f32 3-vector, fixed operation order       │
//! │  ├── quat.rs     - f32 unit quaternion                       │
//! │  ├── window.rs   - Tick ring buffer (age x participant)      │
//! │  └── hash.rs     - State hashing for desync diagnosis        │
//! │                                                              │
//! │  game/           - Simulation (deterministic)                │
//! │  ├── input.rs    - Input frames, records, traces             │
//! │  ├── state.rs    - Participants, roster, state rows          │
//! │  ├── step.rs     - The per-tick state transition             │
//! │  ├── prediction.rs - Client prediction + rollback engine     │
//! │  ├── reconcile.rs  - Server reconciliation engine            │
//! │  └── replay.rs   - Trace replay verification                 │
//! │                                                              │
//! │  network/        - Wire protocol (non-deterministic edge)    │
//! │  ├── protocol.rs - Fixed binary message codec                │
//! │  ├── clock.rs    - Clock offset estimation                   │
//! │  └── session.rs  - Client/server session drivers             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic: given the same roster,
//! state row, and input row, [`game::step::step`] produces bit-identical
//! results on every platform. This is what lets a client rewind to a
//! last-known-good tick and resimulate forward when late inputs or an
//! authoritative snapshot arrive, and lets the server's timeline be replayed
//! from its recorded input traces.
//!
//! Transport is out of scope. The session drivers in [`network::session`]
//! consume already-decoded messages and emit recipient-tagged outbound
//! batches; wiring those to sockets (or, as the demo binary does, to
//! in-memory queues) is the embedding application's job.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::hash::{hash_frame, FrameHash};
pub use crate::core::quat::Quat;
pub use crate::core::vec3::Vec3;
pub use crate::core::window::{TickWindow, WindowError};
pub use game::input::{InputFrame, InputRecord, InputTrace};
pub use game::prediction::PredictionEngine;
pub use game::reconcile::ReconciliationEngine;
pub use game::state::{ParticipantId, ParticipantState, Roster, StateRow};
pub use network::protocol::{Channel, CodecError, Message};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One discrete simulation step. Wire ticks are 4-byte unsigned.
pub type Tick = u32;

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;

/// Duration of one tick in milliseconds.
pub const TICK_DURATION_MS: f64 = 1000.0 / TICK_RATE as f64;

/// Maximum participants in a session. Ids range over `1..=MAX_PARTICIPANTS`.
pub const MAX_PARTICIPANTS: usize = 16;

/// Depth of the client rollback window in ticks (`W`). An input older than
/// `current_tick - ROLLBACK_WINDOW` can no longer be reconciled.
pub const ROLLBACK_WINDOW: usize = 32;

/// Depth of the server pending-input window in ticks (`F`). Inputs dated
/// further ahead of the oldest unsimulated tick are unreachable.
pub const PENDING_WINDOW: usize = 32;

/// How many realtime ticks the server waits on missing inputs before
/// simulating with predictions (bounded-wait fallback).
pub const MAX_SIM_WAIT_TICKS: u32 = 24;
