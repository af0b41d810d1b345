//! Wire protocol and session drivers.
//!
//! The codec and the clock estimator are pure; the session drivers are the
//! seam where decoded messages meet the engines. Actual sockets live in the
//! embedding application.

pub mod clock;
pub mod protocol;
pub mod session;

pub use clock::{estimate_current_tick, ClockSync};
pub use protocol::{Channel, CodecError, Message, SnapshotEntry};
pub use session::{ClientSession, Outbound, Recipient, ServerSession, SessionError};
