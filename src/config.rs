//! Import/export configuration.
//!
//! Both configs belong to a [`Context`](crate::context::Context) and are
//! consulted on every sample read or write; changing one mid-session only
//! affects samples decoded afterwards, so callers that flip a setting
//! should invalidate cached samples themselves.

use serde::{Deserialize, Serialize};

/// How sample reads behave between authored samples.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum InterpolationType {
    /// Hold the sample at-or-before the requested time.
    None,
    /// Linearly interpolate numeric payloads between the bracketing
    /// samples. Non-numeric payloads still hold.
    #[default]
    Linear,
}

/// When to derive vertex normals on mesh reads.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum NormalCalculationType {
    Never,
    /// Compute only when the sample carries no authored normals.
    #[default]
    WhenMissing,
    /// Recompute even over authored normals.
    Always,
}

/// Settings applied to every sample decoded from the document.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct ImportConfig {
    pub interpolation: InterpolationType,
    pub normal_calculation: NormalCalculationType,
    /// Uniform scale applied to positions and distances.
    pub scale: f32,
    /// Fan-triangulate polygon faces into `indices_triangulated`.
    pub triangulate: bool,
    /// Convert between right- and left-handed coordinates (mirror X).
    pub swap_handedness: bool,
    /// Reverse face winding.
    pub swap_faces: bool,
    /// Partition triangulated meshes into submeshes bounded by a u16
    /// vertex budget.
    pub split_mesh: bool,
    /// Publish decoded samples through the cache's two-slot buffers so a
    /// concurrent reader never observes a torn sample.
    pub double_buffering: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            interpolation: InterpolationType::Linear,
            normal_calculation: NormalCalculationType::WhenMissing,
            scale: 1.0,
            triangulate: true,
            swap_handedness: true,
            swap_faces: true,
            split_mesh: false,
            double_buffering: false,
        }
    }
}

/// Settings applied to every sample encoded into the document. The
/// coordinate conversions mirror [`ImportConfig`], so data written and
/// read back under matching configs round-trips exactly.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Mark prims created through this context instanceable.
    pub instanceable_by_default: bool,
    pub scale: f32,
    pub swap_handedness: bool,
    pub swap_faces: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            instanceable_by_default: true,
            scale: 1.0,
            swap_handedness: true,
            swap_faces: true,
        }
    }
}
