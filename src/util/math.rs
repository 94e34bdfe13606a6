//! Math type re-exports and sceneio-specific math utilities.
//!
//! Re-exports the `glam` types used on the caller-facing surface and
//! provides the wire-layout bounding box (center/extents form).

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Time value on the sample axis (seconds).
pub type Time = f64;

/// Sentinel time used for "static" reads of unanimated data.
pub const DEFAULT_TIME: Time = 0.0;

/// Axis-aligned bounding box in center/extents form.
///
/// `extents` are half-sizes, so the box spans `center - extents` to
/// `center + extents`.
#[derive(Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Aabb {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Aabb {
    /// Create from center and extents.
    #[inline]
    pub const fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    /// Create from min/max corners.
    #[inline]
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min) * 0.5,
        }
    }

    /// Tight bounds of a point set. Empty input yields a zero box.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some((&first, rest)) = points.split_first() else {
            return Self::default();
        };
        let mut min = first;
        let mut max = first;
        for &p in rest {
            min = min.min(p);
            max = max.max(p);
        }
        Self::from_min_max(min, max)
    }

    /// Minimum corner.
    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    /// Maximum corner.
    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb(center {:?}, extents {:?})", self.center, self.extents)
    }
}
