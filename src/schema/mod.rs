//! Typed schema views.
//!
//! Each view wraps a schema known to be of its kind; the "as-kind"
//! conversion is checked against the kind tag assigned at creation and
//! returns `None` on mismatch.

pub mod camera;
pub mod mesh;
pub mod points;
pub mod util;
pub mod xform;

use serde::{Deserialize, Serialize};

pub use camera::{Camera, CameraData, CameraSummary};
pub use mesh::{Mesh, MeshData, MeshSummary, SubmeshData, TopologyVariance};
pub use points::{Points, PointsData, PointsSummary};
pub use xform::{Xform, XformData, XformForm, XformPayload, XformSummary, XformUpdateMask};

/// Kind tag of a schema, fixed at creation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum SchemaKind {
    Xform,
    Camera,
    Mesh,
    Points,
    #[default]
    Other,
}

impl SchemaKind {
    /// Schema type name as exposed on the traversal surface.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Xform => "Xform",
            Self::Camera => "Camera",
            Self::Mesh => "Mesh",
            Self::Points => "Points",
            Self::Other => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(SchemaKind::Mesh.type_name(), "Mesh");
        assert_eq!(SchemaKind::Other.type_name(), "");
        assert_eq!(SchemaKind::default(), SchemaKind::Other);
    }
}
