//! Core deterministic primitives.
//!
//! All types in this module are designed for perfect cross-platform
//! determinism: fixed operation order, no unordered iteration, no system
//! time. They are the foundation both engines resimulate on.

pub mod hash;
pub mod quat;
pub mod vec3;
pub mod window;

// Re-export core types
pub use hash::{hash_frame, FrameHash, FrameHasher};
pub use quat::Quat;
pub use vec3::Vec3;
pub use window::{TickWindow, WindowError};
