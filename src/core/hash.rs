//! State Hashing for Desync Diagnosis
//!
//! Provides deterministic hashing of simulation state for:
//! - Divergence checks between client and server timelines
//! - Replay validation of the recorded authoritative timeline
//!
//! Order of updates is critical: two frames hash equal only if the same
//! fields are folded in the same sequence.

use sha2::{Digest, Sha256};

use super::quat::Quat;
use super::vec3::Vec3;

/// Hash output type (256 bits / 32 bytes)
pub type FrameHash = [u8; 32];

/// Deterministic hasher for simulation frames.
///
/// Wraps SHA-256 with helpers for the core value types. Floats are folded by
/// their IEEE-754 bit patterns, so bit-identical state is the only state that
/// hashes equal.
pub struct FrameHasher {
    hasher: Sha256,
}

impl FrameHasher {
    /// Create a new hasher with a domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create the hasher used for per-tick simulation frames.
    pub fn for_frame() -> Self {
        Self::new(b"ROLLBACK_FRAME_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an f32 bit pattern.
    #[inline]
    pub fn update_f32(&mut self, value: f32) {
        self.update_u32(value.to_bits());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a vector, component order x, y, z.
    #[inline]
    pub fn update_vec3(&mut self, value: Vec3) {
        self.update_f32(value.x);
        self.update_f32(value.y);
        self.update_f32(value.z);
    }

    /// Update with a quaternion, component order x, y, z, w.
    #[inline]
    pub fn update_quat(&mut self, value: Quat) {
        self.update_f32(value.x);
        self.update_f32(value.y);
        self.update_f32(value.z);
        self.update_f32(value.w);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> FrameHash {
        self.hasher.finalize().into()
    }
}

/// Compute a frame hash for a tick.
///
/// The tick is always folded first; the closure adds the frame-specific
/// state (roster flags, per-lane position and orientation).
pub fn hash_frame<F>(tick: u32, add_state: F) -> FrameHash
where
    F: FnOnce(&mut FrameHasher),
{
    let mut hasher = FrameHasher::for_frame();
    hasher.update_u32(tick);
    add_state(&mut hasher);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_hasher_determinism() {
        let make_hash = || {
            let mut hasher = FrameHasher::for_frame();
            hasher.update_u32(100);
            hasher.update_vec3(Vec3::new(1.0, 2.0, 3.0));
            hasher.update_quat(Quat::IDENTITY);
            hasher.update_bool(true);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = FrameHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = FrameHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_negative_zero_differs() {
        // -0.0 and 0.0 compare equal as floats but are different states for
        // bit-reproducibility purposes.
        let hash1 = hash_frame(1, |h| h.update_f32(0.0));
        let hash2 = hash_frame(1, |h| h.update_f32(-0.0));
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_tick_separates_frames() {
        let hash1 = hash_frame(10, |h| h.update_bool(false));
        let hash2 = hash_frame(11, |h| h.update_bool(false));
        assert_ne!(hash1, hash2);
    }
}
