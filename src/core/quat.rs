//! Deterministic Unit Quaternion
//!
//! Orientation type carried through the state snapshots and the wire format.
//! The step function does not currently derive orientation from input; the
//! type still ships normalization so that a future orientation model can be
//! added without touching the replay invariant.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unit quaternion with `f32` components, (x, y, z, w) layout.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W (scalar) component
    pub w: f32,
}

impl Quat {
    /// Identity rotation.
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Create a quaternion from raw components.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Squared norm. Summation order: x, y, z, w.
    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Renormalize to unit length; a degenerate zero quaternion collapses to
    /// the identity rather than producing NaNs.
    #[inline]
    pub fn normalize_or_identity(self) -> Self {
        let len_sq = self.length_squared();
        if len_sq == 0.0 {
            return Self::IDENTITY;
        }
        let inv = 1.0 / len_sq.sqrt();
        Self {
            x: self.x * inv,
            y: self.y * inv,
            z: self.z * inv,
            w: self.w * inv,
        }
    }

    /// Exact bit-level equality.
    #[inline]
    pub fn bits_eq(self, other: Self) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.z.to_bits() == other.z.to_bits()
            && self.w.to_bits() == other.w.to_bits()
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Debug for Quat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Quat({:.3}, {:.3}, {:.3}, {:.3})",
            self.x, self.y, self.z, self.w
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_default() {
        assert_eq!(Quat::default(), Quat::IDENTITY);
        assert_eq!(Quat::IDENTITY.length_squared(), 1.0);
    }

    #[test]
    fn test_normalize() {
        let q = Quat::new(0.0, 2.0, 0.0, 0.0);
        let n = q.normalize_or_identity();
        assert!((n.length_squared() - 1.0).abs() < 1e-6);
        assert_eq!(n.y, 1.0);

        // Degenerate input collapses to identity
        let zero = Quat::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(zero.normalize_or_identity(), Quat::IDENTITY);
    }
}
