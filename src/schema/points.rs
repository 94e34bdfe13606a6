//! Point-cloud schema view.

use std::sync::Arc;

use glam::Vec3;

use crate::cache::{CachedSample, SampleKey};
use crate::config::InterpolationType;
use crate::context::Context;
use crate::graph::SchemaId;
use crate::util::{Error, Result, Time};
use crate::value::Value;

use super::util::{resolve_decoded, swap_handedness_points};

const PROP_POINTS: &str = "P";
const PROP_VELOCITIES: &str = ".velocities";

/// One decoded point-cloud sample.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct PointsData {
    pub points: Vec<Vec3>,
    /// Per-point velocities, same length as `points` when present.
    pub velocities: Option<Vec<Vec3>>,
}

/// Time extent of the authored point data.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PointsSummary {
    pub start: Time,
    pub end: Time,
    pub num_samples: usize,
    /// Upper bound on point count across all authored samples. Monotonic
    /// for the life of the document session.
    pub peak_num_points: usize,
}

/// View over a schema of kind `Points`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Points {
    id: SchemaId,
}

impl Points {
    pub(crate) fn new(id: SchemaId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn summary(&self, ctx: &Context) -> Result<PointsSummary> {
        let prim = ctx.graph.node(self.id).prim;
        let recorded_peak = ctx.graph.node(self.id).peak_points;
        let doc = ctx.doc_ref()?;

        let (start, end) = doc.time_range(prim, PROP_POINTS).unwrap_or((0.0, 0.0));
        let num_samples = doc.sample_count(prim, PROP_POINTS);

        let mut peak = recorded_peak;
        for t in doc.sample_times(prim, PROP_POINTS) {
            if let Some(d) = doc.decode(prim, PROP_POINTS, t)? {
                peak = peak.max(d.held.element_count());
            }
        }
        Ok(PointsSummary { start, end, num_samples, peak_num_points: peak })
    }

    /// Decode the point cloud at time `t`. With `copy` unset the returned
    /// buffers alias cache storage; set it to detach into a private copy.
    pub fn read_sample(&self, ctx: &Context, t: Time, copy: bool) -> Result<Option<Arc<PointsData>>> {
        let key = SampleKey::schema(self.id, t);
        let data = match ctx.cache.get(&key) {
            Some(CachedSample::Points(data)) => data,
            _ => {
                let Some(decoded) = self.decode(ctx, t)? else {
                    return Ok(None);
                };
                let data = Arc::new(decoded);
                ctx.cache.put(
                    key,
                    CachedSample::Points(data.clone()),
                    ctx.import_config().double_buffering,
                );
                data
            }
        };
        Ok(Some(if copy { Arc::new((*data).clone()) } else { data }))
    }

    /// Encode a point-cloud sample at time `t`.
    pub fn write_sample(&self, ctx: &mut Context, data: &PointsData, t: Time) -> Result<()> {
        if let Some(v) = &data.velocities {
            if v.len() != data.points.len() {
                return Err(Error::arg(format!(
                    "{} velocities for {} points",
                    v.len(),
                    data.points.len()
                )));
            }
        }

        let prim = ctx.graph.node(self.id).prim;
        let export = *ctx.export_config();

        let mut points = data.points.clone();
        for p in &mut points {
            *p *= export.scale;
        }
        if export.swap_handedness {
            swap_handedness_points(&mut points);
        }

        {
            let doc = ctx.doc_mut()?;
            doc.encode(prim, PROP_POINTS, t, &Value::Float3Array(points))?;
            if let Some(velocities) = &data.velocities {
                let mut v = velocities.clone();
                for e in &mut v {
                    *e *= export.scale;
                }
                if export.swap_handedness {
                    swap_handedness_points(&mut v);
                }
                doc.encode(prim, PROP_VELOCITIES, t, &Value::Float3Array(v))?;
            }
        }

        let node = ctx.graph.node_mut(self.id);
        node.peak_points = node.peak_points.max(data.points.len());
        node.needs_update = true;
        ctx.cache.invalidate_owner(crate::cache::CacheOwner::Schema(self.id));
        Ok(())
    }

    fn decode(&self, ctx: &Context, t: Time) -> Result<Option<PointsData>> {
        let prim = ctx.graph.node(self.id).prim;
        let import = *ctx.import_config();
        let interp = import.interpolation == InterpolationType::Linear;
        let doc = ctx.doc_ref()?;

        let Some(d) = doc.decode(prim, PROP_POINTS, t)? else {
            return Ok(None);
        };
        let mut points = resolve_decoded(d, interp).as_float3_array()?.to_vec();
        for p in &mut points {
            *p *= import.scale;
        }
        if import.swap_handedness {
            swap_handedness_points(&mut points);
        }

        let velocities = match doc.decode(prim, PROP_VELOCITIES, t)? {
            Some(d) => {
                let mut v = resolve_decoded(d, interp).as_float3_array()?.to_vec();
                for e in &mut v {
                    *e *= import.scale;
                }
                if import.swap_handedness {
                    swap_handedness_points(&mut v);
                }
                Some(v)
            }
            None => None,
        };
        Ok(Some(PointsData { points, velocities }))
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
    fn test_roundtrip() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let pts = ctx.create_points(root, "spray").unwrap();

        let authored = PointsData {
            points: vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.0, 0.5)],
            velocities: Some(vec![Vec3::Y, Vec3::X]),
        };
        pts.write_sample(&mut ctx, &authored, 0.0).unwrap();

        let read = pts.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        assert_eq!(*read, authored);
    }

    #[test]
    fn test_velocity_length_checked() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let pts = ctx.create_points(root, "bad").unwrap();

        let data = PointsData {
            points: vec![Vec3::ZERO, Vec3::ONE],
            velocities: Some(vec![Vec3::Y]),
        };
        let err = pts.write_sample(&mut ctx, &data, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_peak_points_monotonic() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let pts = ctx.create_points(root, "burst").unwrap();

        let many = PointsData { points: vec![Vec3::ZERO; 8], velocities: None };
        let few = PointsData { points: vec![Vec3::ZERO; 2], velocities: None };
        pts.write_sample(&mut ctx, &many, 0.0).unwrap();
        pts.write_sample(&mut ctx, &few, 1.0).unwrap();

        let summary = pts.summary(&ctx).unwrap();
        assert_eq!(summary.peak_num_points, 8);
        assert_eq!(summary.num_samples, 2);
    }

    #[test]
    fn test_copy_detaches() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let pts = ctx.create_points(root, "p").unwrap();
        pts.write_sample(&mut ctx, &PointsData { points: vec![Vec3::ZERO], velocities: None }, 0.0)
            .unwrap();

        let shared = pts.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        let owned = pts.read_sample(&ctx, 0.0, true).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&shared, &owned));
        assert_eq!(*shared, *owned);
    }
}
