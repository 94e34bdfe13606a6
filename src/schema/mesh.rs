//! Polygon-mesh schema view.
//!
//! Topology lives in face-vertex counts plus a flat index list. Reads can
//! additionally derive vertex normals, fan-triangulate, and partition the
//! mesh into submeshes bounded by a u16 vertex budget, all driven by the
//! context's import configuration. Derived data is computed after the
//! coordinate conversions so winding and handedness stay consistent.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::cache::{CachedSample, SampleKey};
use crate::config::{InterpolationType, NormalCalculationType};
use crate::context::Context;
use crate::graph::SchemaId;
use crate::util::{Aabb, Error, Result, Time};
use crate::value::Value;

use super::util::{
    compute_vertex_normals, resolve_decoded, reverse_winding, split_submeshes,
    swap_handedness_points, triangulate_fan, validate_topology, SUBMESH_MAX_POINTS,
};

const PROP_POINTS: &str = "P";
const PROP_VELOCITIES: &str = ".velocities";
const PROP_NORMALS: &str = "N";
const PROP_UVS: &str = "uv";
const PROP_FACE_COUNTS: &str = ".faceCounts";
const PROP_FACE_INDICES: &str = ".faceIndices";
const PROP_EXTENT: &str = ".extent";

/// How mesh topology changes across samples. Ordered by severity; the
/// per-schema classification only ever moves toward `Heterogenous`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum TopologyVariance {
    /// Points and topology are identical across samples.
    #[default]
    Constant,
    /// Points animate over fixed topology.
    Homogenous,
    /// Counts or indices change between samples.
    Heterogenous,
}

/// One partition of a triangulated mesh, with local indices.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct SubmeshData {
    pub points: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<i32>,
    pub bounds: Aabb,
}

/// One decoded mesh sample.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct MeshData {
    pub points: Vec<Vec3>,
    pub velocities: Option<Vec<Vec3>>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    /// Face-vertex counts, one entry per polygon.
    pub counts: Vec<i32>,
    /// Flat face-vertex index list, `counts` entries long in total.
    pub indices: Vec<i32>,
    /// Fan-triangulated indices, present when triangulation is enabled.
    pub indices_triangulated: Option<Vec<i32>>,
    /// Submesh partition, present when mesh splitting is enabled.
    pub submeshes: Option<Vec<SubmeshData>>,
    pub bounds: Aabb,
}

/// Time extent and topology classification of a mesh.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct MeshSummary {
    pub start: Time,
    pub end: Time,
    pub num_samples: usize,
    pub topology_variance: TopologyVariance,
    /// Upper bound on point count across all authored samples.
    pub peak_num_points: usize,
    pub has_normals: bool,
    pub has_uvs: bool,
    pub has_velocities: bool,
}

/// View over a schema of kind `Mesh`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mesh {
    id: SchemaId,
}

impl Mesh {
    pub(crate) fn new(id: SchemaId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn summary(&self, ctx: &Context) -> Result<MeshSummary> {
        let node = ctx.graph.node(self.id);
        let prim = node.prim;
        let recorded_variance = node.variance.unwrap_or_default();
        let recorded_peak = node.peak_points;
        let doc = ctx.doc_ref()?;

        let (start, end) = doc.time_range(prim, PROP_POINTS).unwrap_or((0.0, 0.0));
        let num_samples = doc.sample_count(prim, PROP_POINTS);

        let mut variance = TopologyVariance::Constant;
        let mut peak = recorded_peak;
        let mut prev: Option<(Value, Value, Value)> = None;
        for t in doc.sample_times(prim, PROP_POINTS) {
            let Some(p) = doc.decode(prim, PROP_POINTS, t)? else {
                continue;
            };
            peak = peak.max(p.held.element_count());
            let counts = doc.decode(prim, PROP_FACE_COUNTS, t)?.map(|d| d.held);
            let indices = doc.decode(prim, PROP_FACE_INDICES, t)?.map(|d| d.held);
            let cur = (
                p.held,
                counts.unwrap_or(Value::IntArray(Vec::new())),
                indices.unwrap_or(Value::IntArray(Vec::new())),
            );
            if let Some(prev) = &prev {
                if prev.1 != cur.1 || prev.2 != cur.2 {
                    variance = variance.max(TopologyVariance::Heterogenous);
                } else if prev.0 != cur.0 {
                    variance = variance.max(TopologyVariance::Homogenous);
                }
            }
            prev = Some(cur);
        }
        variance = variance.max(recorded_variance);

        Ok(MeshSummary {
            start,
            end,
            num_samples,
            topology_variance: variance,
            peak_num_points: peak,
            has_normals: doc.property_type(prim, PROP_NORMALS).is_some(),
            has_uvs: doc.property_type(prim, PROP_UVS).is_some(),
            has_velocities: doc.property_type(prim, PROP_VELOCITIES).is_some(),
        })
    }

    /// Decode the mesh at time `t`, applying the import conversions and
    /// completing derived data (normals, triangulation, submeshes) per
    /// the import config. With `copy` unset the returned buffers alias
    /// cache storage; set it to detach into a private copy.
    pub fn read_sample(&self, ctx: &Context, t: Time, copy: bool) -> Result<Option<Arc<MeshData>>> {
        let key = SampleKey::schema(self.id, t);
        let data = match ctx.cache.get(&key) {
            Some(CachedSample::Mesh(data)) => data,
            _ => {
                let Some(decoded) = self.decode(ctx, t)? else {
                    return Ok(None);
                };
                let data = Arc::new(decoded);
                ctx.cache.put(
                    key,
                    CachedSample::Mesh(data.clone()),
                    ctx.import_config().double_buffering,
                );
                data
            }
        };
        Ok(Some(if copy { Arc::new((*data).clone()) } else { data }))
    }

    /// Encode a mesh sample at time `t` after validating its buffers.
    /// Reclassifies the topology variance against the authored sample
    /// nearest the write time; the classification never moves back
    /// toward `Constant`.
    pub fn write_sample(&self, ctx: &mut Context, data: &MeshData, t: Time) -> Result<()> {
        validate_topology(data.points.len(), &data.counts, &data.indices)?;
        for (name, len) in [
            ("velocities", data.velocities.as_ref().map(Vec::len)),
            ("normals", data.normals.as_ref().map(Vec::len)),
            ("uvs", data.uvs.as_ref().map(Vec::len)),
        ] {
            if let Some(len) = len {
                if len != data.points.len() {
                    return Err(Error::arg(format!(
                        "{len} {name} for {} points",
                        data.points.len()
                    )));
                }
            }
        }

        let prim = ctx.graph.node(self.id).prim;
        let export = *ctx.export_config();

        let mut points = data.points.clone();
        for p in &mut points {
            *p *= export.scale;
        }
        let mut indices = data.indices.clone();
        if export.swap_handedness {
            swap_handedness_points(&mut points);
        }
        if export.swap_faces {
            reverse_winding(&data.counts, &mut indices);
        }
        let bounds = Aabb::from_points(&points);

        // Compare against the neighboring authored sample before encoding.
        let variance_step = self.classify_against_neighbor(ctx, &points, &data.counts, &indices, t)?;

        {
            let doc = ctx.doc_mut()?;
            doc.encode(prim, PROP_POINTS, t, &Value::Float3Array(points))?;
            doc.encode(prim, PROP_FACE_COUNTS, t, &Value::IntArray(data.counts.clone()))?;
            doc.encode(prim, PROP_FACE_INDICES, t, &Value::IntArray(indices))?;
            doc.encode(
                prim,
                PROP_EXTENT,
                t,
                &Value::FloatArray(vec![
                    bounds.center.x,
                    bounds.center.y,
                    bounds.center.z,
                    bounds.extents.x,
                    bounds.extents.y,
                    bounds.extents.z,
                ]),
            )?;
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
            if let Some(normals) = &data.normals {
                let mut n = normals.clone();
                if export.swap_handedness {
                    swap_handedness_points(&mut n);
                }
                doc.encode(prim, PROP_NORMALS, t, &Value::Float3Array(n))?;
            }
            if let Some(uvs) = &data.uvs {
                doc.encode(prim, PROP_UVS, t, &Value::Float2Array(uvs.clone()))?;
            }
        }

        let node = ctx.graph.node_mut(self.id);
        node.variance = Some(node.variance.unwrap_or_default().max(variance_step));
        node.peak_points = node.peak_points.max(data.points.len());
        node.needs_update = true;
        ctx.cache.invalidate_owner(crate::cache::CacheOwner::Schema(self.id));
        Ok(())
    }

    /// Topology variance as recorded for this document session.
    pub fn topology_variance(&self, ctx: &Context) -> TopologyVariance {
        ctx.graph.node(self.id).variance.unwrap_or_default()
    }

    fn classify_against_neighbor(
        &self,
        ctx: &Context,
        points: &[Vec3],
        counts: &[i32],
        indices: &[i32],
        t: Time,
    ) -> Result<TopologyVariance> {
        let prim = ctx.graph.node(self.id).prim;
        let doc = ctx.doc_ref()?;
        if doc.sample_count(prim, PROP_POINTS) == 0 {
            return Ok(TopologyVariance::Constant);
        }
        // Held decode at the write time: the authored sample at or
        // before `t`, or the first one when `t` precedes them all.
        let prev_counts = doc.decode(prim, PROP_FACE_COUNTS, t)?.map(|d| d.held);
        let prev_indices = doc.decode(prim, PROP_FACE_INDICES, t)?.map(|d| d.held);
        let prev_points = doc.decode(prim, PROP_POINTS, t)?.map(|d| d.held);

        let same_topology = matches!(&prev_counts, Some(Value::IntArray(v)) if v == counts)
            && matches!(&prev_indices, Some(Value::IntArray(v)) if v == indices);
        if !same_topology {
            return Ok(TopologyVariance::Heterogenous);
        }
        let same_points = matches!(&prev_points, Some(Value::Float3Array(v)) if v == points);
        if !same_points {
            return Ok(TopologyVariance::Homogenous);
        }
        Ok(TopologyVariance::Constant)
    }

    fn decode(&self, ctx: &Context, t: Time) -> Result<Option<MeshData>> {
        let prim = ctx.graph.node(self.id).prim;
        let import = *ctx.import_config();
        let interp = import.interpolation == InterpolationType::Linear;
        let doc = ctx.doc_ref()?;

        let Some(p) = doc.decode(prim, PROP_POINTS, t)? else {
            return Ok(None);
        };
        let mut points = resolve_decoded(p, interp).as_float3_array()?.to_vec();

        // Topology always holds; interpolating indices would be nonsense.
        let counts = match doc.decode(prim, PROP_FACE_COUNTS, t)? {
            Some(d) => d.held.as_int_array()?.to_vec(),
            None => Vec::new(),
        };
        let mut indices = match doc.decode(prim, PROP_FACE_INDICES, t)? {
            Some(d) => d.held.as_int_array()?.to_vec(),
            None => Vec::new(),
        };

        for p in &mut points {
            *p *= import.scale;
        }
        if import.swap_handedness {
            swap_handedness_points(&mut points);
        }
        if import.swap_faces {
            reverse_winding(&counts, &mut indices);
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

        let authored_normals = match doc.decode(prim, PROP_NORMALS, t)? {
            Some(d) => {
                let mut n = resolve_decoded(d, interp).as_float3_array()?.to_vec();
                if import.swap_handedness {
                    swap_handedness_points(&mut n);
                }
                Some(n)
            }
            None => None,
        };
        let normals = match (import.normal_calculation, authored_normals) {
            (NormalCalculationType::Never, n) => n,
            (NormalCalculationType::WhenMissing, Some(n)) => Some(n),
            (NormalCalculationType::WhenMissing, None) | (NormalCalculationType::Always, _) => {
                Some(compute_vertex_normals(&points, &counts, &indices))
            }
        };

        let uvs = match doc.decode(prim, PROP_UVS, t)? {
            Some(d) => Some(resolve_decoded(d, interp).as_float2_array()?.to_vec()),
            None => None,
        };

        let indices_triangulated = if import.triangulate {
            Some(triangulate_fan(&counts, &indices))
        } else {
            None
        };

        let submeshes = match (&indices_triangulated, import.split_mesh) {
            (Some(tris), true) => Some(split_submeshes(
                &points,
                normals.as_deref(),
                uvs.as_deref(),
                tris,
                SUBMESH_MAX_POINTS,
            )),
            _ => None,
        };

        let bounds = match &submeshes {
            Some(subs) if !subs.is_empty() => {
                let mut b = subs[0].bounds;
                for sub in &subs[1..] {
                    b = b.union(&sub.bounds);
                }
                b
            }
            // Prefer the authored extent, converted like the points it
            // bounds; recompute only when it is absent or malformed.
            _ => match doc.decode(prim, PROP_EXTENT, t)? {
                Some(d) => match resolve_decoded(d, interp) {
                    Value::FloatArray(e) if e.len() == 6 => {
                        let mut center = Vec3::new(e[0], e[1], e[2]) * import.scale;
                        let extents = Vec3::new(e[3], e[4], e[5]) * import.scale;
                        if import.swap_handedness {
                            center.x = -center.x;
                        }
                        Aabb::new(center, extents)
                    }
                    _ => Aabb::from_points(&points),
                },
                None => Aabb::from_points(&points),
            },
        };

        Ok(Some(MeshData {
            points,
            velocities,
            normals,
            uvs,
            counts,
            indices,
            indices_triangulated,
            submeshes,
            bounds,
        }))
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

    fn quad() -> MeshData {
        MeshData {
            points: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            counts: vec![4],
            indices: vec![0, 1, 2, 3],
            ..Default::default()
        }
    }

    #[test]
    fn test_roundtrip_with_derived_data() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let mesh = ctx.create_mesh(root, "quad").unwrap();
        mesh.write_sample(&mut ctx, &quad(), 0.0).unwrap();

        let read = mesh.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        assert_eq!(read.points, quad().points);
        assert_eq!(read.counts, vec![4]);
        assert_eq!(read.indices, vec![0, 1, 2, 3]);
        // Triangulation and normal derivation are on by default.
        assert_eq!(read.indices_triangulated.as_deref(), Some(&[0, 1, 2, 0, 2, 3][..]));
        let normals = read.normals.as_ref().unwrap();
        assert_eq!(normals.len(), 4);
        assert!(read.submeshes.is_none());

        assert_eq!(read.bounds.center, Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(read.bounds.extents, Vec3::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn test_invalid_topology_rejected() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let mesh = ctx.create_mesh(root, "bad").unwrap();

        let mut data = quad();
        data.indices = vec![0, 1, 2, 9];
        let err = mesh.write_sample(&mut ctx, &data, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // The failed write left nothing behind.
        assert!(mesh.read_sample(&ctx, 0.0, false).unwrap().is_none());
    }

    #[test]
    fn test_topology_variance_monotonic() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let mesh = ctx.create_mesh(root, "morph").unwrap();

        mesh.write_sample(&mut ctx, &quad(), 0.0).unwrap();
        assert_eq!(mesh.topology_variance(&ctx), TopologyVariance::Constant);

        // Same topology, moved points.
        let mut moved = quad();
        moved.points[0].z = 1.0;
        mesh.write_sample(&mut ctx, &moved, 1.0).unwrap();
        assert_eq!(mesh.topology_variance(&ctx), TopologyVariance::Homogenous);

        // Changed topology.
        let tri = MeshData {
            points: quad().points[..3].to_vec(),
            counts: vec![3],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        mesh.write_sample(&mut ctx, &tri, 2.0).unwrap();
        assert_eq!(mesh.topology_variance(&ctx), TopologyVariance::Heterogenous);

        // Identical rewrite does not move the classification back.
        mesh.write_sample(&mut ctx, &tri, 3.0).unwrap();
        assert_eq!(mesh.topology_variance(&ctx), TopologyVariance::Heterogenous);
    }

    #[test]
    fn test_out_of_order_write_compares_neighbor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        {
            let mut ctx = Context::new();
            ctx.create_stage(&path).unwrap();
            let root = ctx.root().unwrap();
            let mesh = ctx.create_mesh(root, "morph").unwrap();
            mesh.write_sample(&mut ctx, &quad(), 0.0).unwrap();
            let mut moved = quad();
            moved.points[0].z = 1.0;
            mesh.write_sample(&mut ctx, &moved, 10.0).unwrap();
            ctx.save().unwrap();
        }

        // Reopened session: a sample written between two existing ones
        // is classified against the one it lands next to, not against
        // the last sample on the axis.
        let mut ctx = Context::new();
        ctx.open(&path).unwrap();
        let mesh = ctx.as_mesh(ctx.find("/morph").unwrap()).unwrap();
        mesh.write_sample(&mut ctx, &quad(), 1.0).unwrap();
        assert_eq!(mesh.topology_variance(&ctx), TopologyVariance::Constant);
    }

    #[test]
    fn test_authored_extent_read_back() {
        use crate::value::AttributeType;

        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let mesh = ctx.create_mesh(root, "quad").unwrap();
        mesh.write_sample(&mut ctx, &quad(), 0.0).unwrap();

        // Replace the stored extent with a deliberately offset box.
        let ext = ctx
            .create_attribute(mesh.id(), ".extent", AttributeType::FloatArray)
            .unwrap();
        ext.write_sample(
            &mut ctx,
            &Value::FloatArray(vec![9.0, 2.0, 3.0, 1.0, 1.0, 1.0]),
            0.0,
        )
        .unwrap();

        // The read takes the authored extent, mirrored like the points.
        let read = mesh.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        assert_eq!(read.bounds.center, Vec3::new(-9.0, 2.0, 3.0));
        assert_eq!(read.bounds.extents, Vec3::new(1.0, 1.0, 1.0));

        // A malformed extent falls back to recomputing from the points.
        ext.write_sample(&mut ctx, &Value::FloatArray(vec![9.0]), 0.0).unwrap();
        ctx.invalidate_all_samples();
        let read = mesh.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        assert_eq!(read.bounds.extents, Vec3::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn test_split_mesh() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let mesh = ctx.create_mesh(root, "big").unwrap();
        mesh.write_sample(&mut ctx, &quad(), 0.0).unwrap();

        let mut import = *ctx.import_config();
        import.split_mesh = true;
        ctx.set_import_config(import);

        let read = mesh.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        let subs = read.submeshes.as_ref().unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].points.len(), 4);
        assert_eq!(subs[0].bounds.center, read.bounds.center);
    }

    #[test]
    fn test_summary() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let mesh = ctx.create_mesh(root, "quad").unwrap();
        let mut data = quad();
        data.uvs = Some(vec![Vec2::ZERO; 4]);
        mesh.write_sample(&mut ctx, &data, 0.0).unwrap();
        mesh.write_sample(&mut ctx, &data, 1.0).unwrap();

        let summary = mesh.summary(&ctx).unwrap();
        assert_eq!(summary.num_samples, 2);
        assert_eq!((summary.start, summary.end), (0.0, 1.0));
        assert_eq!(summary.topology_variance, TopologyVariance::Constant);
        assert_eq!(summary.peak_num_points, 4);
        assert!(summary.has_uvs && !summary.has_velocities);
        // Normals were derived on read, not authored.
        assert!(!summary.has_normals);
    }
}
