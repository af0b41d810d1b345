//! Protocol Messages
//!
//! Fixed binary wire format: one leading header byte selects the variant,
//! every multi-byte field is big-endian, both directions. The messages are
//! deliberately dumb — every active participant's full input and state is
//! exchanged each tick; there is no delta compression and no versioning.
//!
//! Messages split across two logical channels: inputs and snapshots ride an
//! unordered/unreliable channel (a lost input is simply predicted), while
//! handshake, roster, and clock messages require a reliable-ordered channel
//! (losing or reordering those desyncs roster and clock state permanently).

use thiserror::Error;

use crate::core::quat::Quat;
use crate::core::vec3::Vec3;
use crate::game::input::{InputFrame, InputRecord};
use crate::game::state::{ParticipantId, ParticipantState};
use crate::{Tick, MAX_PARTICIPANTS};

// =============================================================================
// HEADERS AND CHANNELS
// =============================================================================

/// Header byte: handshake (server -> new client).
pub const HEADER_HANDSHAKE: u8 = 1;
/// Header byte: roster join broadcast.
pub const HEADER_JOIN: u8 = 2;
/// Header byte: roster leave broadcast.
pub const HEADER_LEAVE: u8 = 3;
/// Header byte: client input (client -> server).
pub const HEADER_CLIENT_INPUT: u8 = 4;
/// Header byte: relayed input (server -> other clients).
pub const HEADER_RELAYED_INPUT: u8 = 5;
/// Header byte: authoritative state snapshot broadcast.
pub const HEADER_STATE_SNAPSHOT: u8 = 6;
/// Header byte: clock sync request (client -> server).
pub const HEADER_TIME_REQUEST: u8 = 7;
/// Header byte: clock sync response (server -> client).
pub const HEADER_TIME_SYNC: u8 = 8;

/// Bytes per snapshot entry: id + 3 position floats + 4 orientation floats.
const SNAPSHOT_ENTRY_SIZE: usize = 1 + 3 * 4 + 4 * 4;

/// Which logical channel a message must travel on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Must never be lost or reordered (roster and clock state).
    Reliable,
    /// Low-latency, loss tolerated (inputs and snapshots).
    Unreliable,
}

// =============================================================================
// MESSAGES
// =============================================================================

/// One entry of a state snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotEntry {
    /// Whose state this is
    pub participant: ParticipantId,
    /// Their state at the snapshot tick
    pub state: ParticipantState,
}

/// Every message exchanged between peers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Session admission: assigned id, current server tick, roster presence.
    Handshake {
        /// Id assigned to the receiving client
        participant: ParticipantId,
        /// Server tick at admission
        tick: Tick,
        /// Presence flag per lane
        roster: [bool; MAX_PARTICIPANTS],
    },

    /// A participant joined.
    Join {
        /// Who joined
        participant: ParticipantId,
    },

    /// A participant left.
    Leave {
        /// Who left
        participant: ParticipantId,
    },

    /// A client's confirmed input for one tick.
    ClientInput(InputRecord),

    /// The same input, relayed by the server to the other clients.
    RelayedInput(InputRecord),

    /// Authoritative per-participant state at a tick.
    StateSnapshot {
        /// Tick the state is current at
        tick: Tick,
        /// One entry per active participant
        entries: Vec<SnapshotEntry>,
    },

    /// Ask the server for a clock reading. No payload.
    TimeRequest,

    /// Server tick and wall time at the moment a TimeRequest was handled.
    TimeSync {
        /// Server tick at receipt
        server_tick: Tick,
        /// Server wall clock, milliseconds
        server_time_ms: f64,
    },
}

impl Message {
    /// The header byte selecting this variant.
    pub fn header(&self) -> u8 {
        match self {
            Message::Handshake { .. } => HEADER_HANDSHAKE,
            Message::Join { .. } => HEADER_JOIN,
            Message::Leave { .. } => HEADER_LEAVE,
            Message::ClientInput(_) => HEADER_CLIENT_INPUT,
            Message::RelayedInput(_) => HEADER_RELAYED_INPUT,
            Message::StateSnapshot { .. } => HEADER_STATE_SNAPSHOT,
            Message::TimeRequest => HEADER_TIME_REQUEST,
            Message::TimeSync { .. } => HEADER_TIME_SYNC,
        }
    }

    /// The channel this message must travel on.
    pub fn channel(&self) -> Channel {
        match self {
            Message::ClientInput(_) | Message::RelayedInput(_) | Message::StateSnapshot { .. } => {
                Channel::Unreliable
            }
            _ => Channel::Reliable,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.header()];
        match self {
            Message::Handshake {
                participant,
                tick,
                roster,
            } => {
                out.push(participant.get());
                out.extend_from_slice(&tick.to_be_bytes());
                for active in roster {
                    out.push(*active as u8);
                }
            }
            Message::Join { participant } | Message::Leave { participant } => {
                out.push(participant.get());
            }
            Message::ClientInput(record) | Message::RelayedInput(record) => {
                out.push(record.participant.get());
                out.extend_from_slice(&record.tick.to_be_bytes());
                out.push(record.frame.forward() as u8);
                out.push(record.frame.left() as u8);
                out.push(record.frame.back() as u8);
                out.push(record.frame.right() as u8);
            }
            Message::StateSnapshot { tick, entries } => {
                out.extend_from_slice(&tick.to_be_bytes());
                for entry in entries {
                    out.push(entry.participant.get());
                    for v in [
                        entry.state.position.x,
                        entry.state.position.y,
                        entry.state.position.z,
                        entry.state.orientation.x,
                        entry.state.orientation.y,
                        entry.state.orientation.z,
                        entry.state.orientation.w,
                    ] {
                        out.extend_from_slice(&v.to_be_bytes());
                    }
                }
            }
            Message::TimeRequest => {}
            Message::TimeSync {
                server_tick,
                server_time_ms,
            } => {
                out.extend_from_slice(&server_tick.to_be_bytes());
                out.extend_from_slice(&server_time_ms.to_be_bytes());
            }
        }
        out
    }

    /// Decode wire bytes. A failure here means the message is dropped by the
    /// caller; it never crashes the session.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let header = reader.take_u8().map_err(|_| CodecError::Empty)?;

        let message = match header {
            HEADER_HANDSHAKE => {
                let participant = reader.take_participant()?;
                let tick = reader.take_u32()?;
                let mut roster = [false; MAX_PARTICIPANTS];
                for flag in &mut roster {
                    *flag = reader.take_u8()? != 0;
                }
                Message::Handshake {
                    participant,
                    tick,
                    roster,
                }
            }
            HEADER_JOIN => Message::Join {
                participant: reader.take_participant()?,
            },
            HEADER_LEAVE => Message::Leave {
                participant: reader.take_participant()?,
            },
            HEADER_CLIENT_INPUT | HEADER_RELAYED_INPUT => {
                let participant = reader.take_participant()?;
                let tick = reader.take_u32()?;
                let forward = reader.take_u8()? != 0;
                let left = reader.take_u8()? != 0;
                let back = reader.take_u8()? != 0;
                let right = reader.take_u8()? != 0;
                let record = InputRecord {
                    participant,
                    tick,
                    frame: InputFrame::from_flags(forward, left, back, right),
                };
                if header == HEADER_CLIENT_INPUT {
                    Message::ClientInput(record)
                } else {
                    Message::RelayedInput(record)
                }
            }
            HEADER_STATE_SNAPSHOT => {
                let tick = reader.take_u32()?;
                let body = reader.remaining();
                if body % SNAPSHOT_ENTRY_SIZE != 0 {
                    return Err(CodecError::MisalignedSnapshot { len: body });
                }
                let mut entries = Vec::with_capacity(body / SNAPSHOT_ENTRY_SIZE);
                while reader.remaining() > 0 {
                    let participant = reader.take_participant()?;
                    let position =
                        Vec3::new(reader.take_f32()?, reader.take_f32()?, reader.take_f32()?);
                    let orientation = Quat::new(
                        reader.take_f32()?,
                        reader.take_f32()?,
                        reader.take_f32()?,
                        reader.take_f32()?,
                    );
                    entries.push(SnapshotEntry {
                        participant,
                        state: ParticipantState {
                            position,
                            orientation,
                        },
                    });
                }
                Message::StateSnapshot { tick, entries }
            }
            HEADER_TIME_REQUEST => Message::TimeRequest,
            HEADER_TIME_SYNC => Message::TimeSync {
                server_tick: reader.take_u32()?,
                server_time_ms: reader.take_f64()?,
            },
            other => return Err(CodecError::UnknownHeader(other)),
        };

        reader.finish()?;
        Ok(message)
    }
}

// =============================================================================
// ERRORS AND THE CURSOR
// =============================================================================

/// Codec failures. All of them mean "drop this message".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Zero-length input.
    #[error("empty message")]
    Empty,

    /// Header byte selects no known variant.
    #[error("unknown header byte {0}")]
    UnknownHeader(u8),

    /// Payload ended before a field was complete.
    #[error("message truncated: needed {needed} more byte(s)")]
    Truncated {
        /// How many bytes the current field still needed
        needed: usize,
    },

    /// Participant id outside `1..=MAX_PARTICIPANTS`.
    #[error("invalid participant id {0}")]
    InvalidParticipant(u8),

    /// Bytes left over after a complete payload.
    #[error("{len} trailing byte(s) after payload")]
    TrailingBytes {
        /// Leftover byte count
        len: usize,
    },

    /// Snapshot body does not divide into whole entries.
    #[error("snapshot body of {len} byte(s) does not divide into entries")]
    MisalignedSnapshot {
        /// Body length after the tick field
        len: usize,
    },
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_f32(&mut self) -> Result<f32, CodecError> {
        let bytes = self.take(4)?;
        Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_f64(&mut self) -> Result<f64, CodecError> {
        let bytes = self.take(8)?;
        Ok(f64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    fn take_participant(&mut self) -> Result<ParticipantId, CodecError> {
        let raw = self.take_u8()?;
        ParticipantId::new(raw).ok_or(CodecError::InvalidParticipant(raw))
    }

    fn finish(self) -> Result<(), CodecError> {
        if self.remaining() > 0 {
            return Err(CodecError::TrailingBytes {
                len: self.remaining(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
