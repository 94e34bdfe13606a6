//! Camera schema view.

use std::sync::Arc;

use crate::cache::{CachedSample, SampleKey};
use crate::config::InterpolationType;
use crate::context::Context;
use crate::graph::SchemaId;
use crate::util::{Result, Time};
use crate::value::Value;

use super::util::resolve_decoded;

const PROP_NEAR: &str = ".nearClip";
const PROP_FAR: &str = ".farClip";
const PROP_FOV: &str = ".fov";
const PROP_ASPECT: &str = ".aspect";
const PROP_FOCUS_DISTANCE: &str = ".focusDistance";
const PROP_FOCAL_LENGTH: &str = ".focalLength";
const PROP_APERTURE: &str = ".aperture";

const PROPS: [&str; 7] = [
    PROP_NEAR,
    PROP_FAR,
    PROP_FOV,
    PROP_ASPECT,
    PROP_FOCUS_DISTANCE,
    PROP_FOCAL_LENGTH,
    PROP_APERTURE,
];

/// One decoded camera sample. Unauthored fields hold their defaults.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct CameraData {
    pub near_clipping_plane: f32,
    pub far_clipping_plane: f32,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub aspect_ratio: f32,
    /// Focus distance in centimeters.
    pub focus_distance: f32,
    /// Focal length in millimeters. Zero when unauthored.
    pub focal_length: f32,
    /// Aperture in millimeters.
    pub aperture: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            near_clipping_plane: 0.3,
            far_clipping_plane: 1000.0,
            field_of_view: 60.0,
            aspect_ratio: 16.0 / 9.0,
            focus_distance: 5.0,
            focal_length: 0.0,
            aperture: 35.0,
        }
    }
}

/// Time extent of the authored camera properties.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct CameraSummary {
    pub start: Time,
    pub end: Time,
    pub num_samples: usize,
}

/// View over a schema of kind `Camera`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Camera {
    id: SchemaId,
}

impl Camera {
    pub(crate) fn new(id: SchemaId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn summary(&self, ctx: &Context) -> Result<CameraSummary> {
        let prim = ctx.graph.node(self.id).prim;
        let doc = ctx.doc_ref()?;

        let mut start = f64::INFINITY;
        let mut end = f64::NEG_INFINITY;
        let mut num_samples = 0usize;
        for name in PROPS {
            if let Some((s, e)) = doc.time_range(prim, name) {
                start = start.min(s);
                end = end.max(e);
            }
            num_samples = num_samples.max(doc.sample_count(prim, name));
        }
        if num_samples == 0 {
            start = 0.0;
            end = 0.0;
        }
        Ok(CameraSummary { start, end, num_samples })
    }

    /// Decode the camera at time `t`. `Ok(None)` when no camera property
    /// is authored; unauthored fields default.
    pub fn read_sample(&self, ctx: &Context, t: Time) -> Result<Option<CameraData>> {
        let key = SampleKey::schema(self.id, t);
        if let Some(CachedSample::Camera(data)) = ctx.cache.get(&key) {
            return Ok(Some(*data));
        }

        let import = *ctx.import_config();
        let interp = import.interpolation == InterpolationType::Linear;
        let prim = ctx.graph.node(self.id).prim;
        let doc = ctx.doc_ref()?;

        let mut data = CameraData::default();
        let mut authored = false;
        let mut field = |name: &str, slot: &mut f32| -> Result<()> {
            if let Some(d) = doc.decode(prim, name, t)? {
                *slot = resolve_decoded(d, interp).as_float()?;
                authored = true;
            }
            Ok(())
        };
        field(PROP_NEAR, &mut data.near_clipping_plane)?;
        field(PROP_FAR, &mut data.far_clipping_plane)?;
        field(PROP_FOV, &mut data.field_of_view)?;
        field(PROP_ASPECT, &mut data.aspect_ratio)?;
        field(PROP_FOCUS_DISTANCE, &mut data.focus_distance)?;
        field(PROP_FOCAL_LENGTH, &mut data.focal_length)?;
        field(PROP_APERTURE, &mut data.aperture)?;
        if !authored {
            return Ok(None);
        }

        // Distances scale with the scene; lens parameters do not.
        data.near_clipping_plane *= import.scale;
        data.far_clipping_plane *= import.scale;
        data.focus_distance *= import.scale;

        ctx.cache.put(key, CachedSample::Camera(Arc::new(data)), import.double_buffering);
        Ok(Some(data))
    }

    /// Encode a camera sample at time `t`.
    pub fn write_sample(&self, ctx: &mut Context, data: &CameraData, t: Time) -> Result<()> {
        let prim = ctx.graph.node(self.id).prim;
        let scale = ctx.export_config().scale;

        {
            let doc = ctx.doc_mut()?;
            doc.encode(prim, PROP_NEAR, t, &Value::Float(data.near_clipping_plane * scale))?;
            doc.encode(prim, PROP_FAR, t, &Value::Float(data.far_clipping_plane * scale))?;
            doc.encode(prim, PROP_FOV, t, &Value::Float(data.field_of_view))?;
            doc.encode(prim, PROP_ASPECT, t, &Value::Float(data.aspect_ratio))?;
            doc.encode(prim, PROP_FOCUS_DISTANCE, t, &Value::Float(data.focus_distance * scale))?;
            doc.encode(prim, PROP_FOCAL_LENGTH, t, &Value::Float(data.focal_length))?;
            doc.encode(prim, PROP_APERTURE, t, &Value::Float(data.aperture))?;
        }

        ctx.cache.invalidate_owner(crate::cache::CacheOwner::Schema(self.id));
        ctx.graph.node_mut(self.id).needs_update = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn bound_context() -> (Context, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Context::new();
        ctx.create_stage(&dir.path().join("scene.json")).unwrap();
        (ctx, dir)
    }

    #[test]
    fn test_defaults() {
        let d = CameraData::default();
        assert_eq!(d.near_clipping_plane, 0.3);
        assert_eq!(d.far_clipping_plane, 1000.0);
        assert_eq!(d.field_of_view, 60.0);
        assert_eq!(d.aperture, 35.0);
    }

    #[test]
    fn test_roundtrip() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let cam = ctx.create_camera(root, "shot").unwrap();

        let authored = CameraData { field_of_view: 35.0, ..Default::default() };
        cam.write_sample(&mut ctx, &authored, 0.0).unwrap();

        let read = cam.read_sample(&ctx, 0.0).unwrap().unwrap();
        assert_eq!(read, authored);

        let summary = cam.summary(&ctx).unwrap();
        assert_eq!(summary.num_samples, 1);
        assert_eq!(summary.start, 0.0);
    }

    #[test]
    fn test_interpolated_fov() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let cam = ctx.create_camera(root, "zoom").unwrap();

        cam.write_sample(&mut ctx, &CameraData { field_of_view: 30.0, ..Default::default() }, 0.0)
            .unwrap();
        cam.write_sample(&mut ctx, &CameraData { field_of_view: 60.0, ..Default::default() }, 1.0)
            .unwrap();

        let mid = cam.read_sample(&ctx, 0.5).unwrap().unwrap();
        assert!((mid.field_of_view - 45.0).abs() < 1e-5);
    }

    #[test]
    fn test_unauthored_reads_none() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let cam = ctx.create_camera(root, "empty").unwrap();
        assert!(cam.read_sample(&ctx, 0.0).unwrap().is_none());
    }
}
