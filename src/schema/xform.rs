//! Transform schema view.
//!
//! A transform is authored in exactly one of two forms: decomposed TRS
//! (position, rotation, scale) or a raw 4x4 matrix. The form is fixed by
//! the first written sample; reads report it in the summary. Each read
//! also carries an update mask describing which components changed since
//! the previous read of the same schema, so consumers can skip re-applying
//! unchanged components.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::cache::{CachedSample, SampleKey};
use crate::context::Context;
use crate::graph::SchemaId;
use crate::util::{Error, Result, Time};
use crate::value::Value;

use super::util::resolve_decoded;

const PROP_POSITION: &str = ".position";
const PROP_ROTATION: &str = ".rotation";
const PROP_SCALE: &str = ".scale";
const PROP_MATRIX: &str = ".matrix";

/// Authored form of a transform.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum XformForm {
    #[default]
    Trs,
    Matrix,
}

/// Which components changed since the previous read.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct XformUpdateMask {
    pub position: bool,
    pub rotation: bool,
    pub scale: bool,
}

impl XformUpdateMask {
    pub const ALL: Self = Self { position: true, rotation: true, scale: true };

    pub fn any(&self) -> bool {
        self.position || self.rotation || self.scale
    }
}

/// Transform payload in its authored form.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum XformPayload {
    Trs { position: Vec3, rotation: Quat, scale: Vec3 },
    Matrix(Mat4),
}

impl XformPayload {
    pub const IDENTITY: Self = Self::Trs {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn form(&self) -> XformForm {
        match self {
            Self::Trs { .. } => XformForm::Trs,
            Self::Matrix(_) => XformForm::Matrix,
        }
    }

    /// The payload as a matrix, composing TRS when needed.
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            Self::Trs { position, rotation, scale } => {
                Mat4::from_scale_rotation_translation(*scale, *rotation, *position)
            }
            Self::Matrix(m) => *m,
        }
    }
}

/// One decoded transform sample.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct XformData {
    pub payload: XformPayload,
    /// Components that differ from the previously read sample. All bits
    /// are set on the first read of a schema.
    pub updated: XformUpdateMask,
}

impl Default for XformData {
    fn default() -> Self {
        Self { payload: XformPayload::IDENTITY, updated: XformUpdateMask::default() }
    }
}

/// Time extent and authored form of a transform.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct XformSummary {
    pub start: Time,
    pub end: Time,
    pub num_samples: usize,
    pub form: XformForm,
}

/// View over a schema of kind `Xform`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Xform {
    id: SchemaId,
}

impl Xform {
    pub(crate) fn new(id: SchemaId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    /// Time extent over the authored transform properties.
    pub fn summary(&self, ctx: &Context) -> Result<XformSummary> {
        let prim = ctx.graph.node(self.id).prim;
        let doc = ctx.doc_ref()?;

        let form = if doc.property_type(prim, PROP_MATRIX).is_some() {
            XformForm::Matrix
        } else {
            XformForm::Trs
        };
        let props: &[&str] = match form {
            XformForm::Matrix => &[PROP_MATRIX],
            XformForm::Trs => &[PROP_POSITION, PROP_ROTATION, PROP_SCALE],
        };

        let mut start = f64::INFINITY;
        let mut end = f64::NEG_INFINITY;
        let mut num_samples = 0usize;
        for name in props {
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
        Ok(XformSummary { start, end, num_samples, form })
    }

    /// Decode the transform at time `t`. `Ok(None)` when nothing is
    /// authored. The update mask is recomputed on every call, including
    /// cache hits, against the last sample this view returned.
    pub fn read_sample(&self, ctx: &Context, t: Time) -> Result<Option<XformData>> {
        let key = SampleKey::schema(self.id, t);
        let payload = match ctx.cache.get(&key) {
            Some(CachedSample::Xform(data)) => data.payload,
            _ => match self.decode(ctx, t)? {
                Some(payload) => {
                    let data = XformData { payload, updated: XformUpdateMask::default() };
                    ctx.cache.put(
                        key,
                        CachedSample::Xform(Arc::new(data)),
                        ctx.import_config().double_buffering,
                    );
                    payload
                }
                None => return Ok(None),
            },
        };

        let updated = self.update_mask(ctx, &payload);
        Ok(Some(XformData { payload, updated }))
    }

    /// Encode a transform sample at time `t`. The authored form must stay
    /// consistent across samples.
    pub fn write_sample(&self, ctx: &mut Context, data: &XformData, t: Time) -> Result<()> {
        let prim = ctx.graph.node(self.id).prim;
        let export = *ctx.export_config();

        {
            let doc = ctx.doc_mut()?;
            let has_matrix = doc.property_type(prim, PROP_MATRIX).is_some();
            let has_trs = doc.property_type(prim, PROP_POSITION).is_some();
            match (&data.payload, has_matrix, has_trs) {
                (XformPayload::Trs { .. }, true, _) => {
                    return Err(Error::state("transform is authored in matrix form"));
                }
                (XformPayload::Matrix(_), _, true) => {
                    return Err(Error::state("transform is authored in TRS form"));
                }
                _ => {}
            }

            match data.payload {
                XformPayload::Trs { mut position, mut rotation, scale } => {
                    position *= export.scale;
                    if export.swap_handedness {
                        position.x = -position.x;
                        rotation = super::util::swap_handedness_quat(rotation);
                    }
                    doc.encode(prim, PROP_POSITION, t, &Value::Float3(position))?;
                    doc.encode(prim, PROP_ROTATION, t, &Value::Quaternion(rotation))?;
                    doc.encode(prim, PROP_SCALE, t, &Value::Float3(scale))?;
                }
                XformPayload::Matrix(mut m) => {
                    m.w_axis.x *= export.scale;
                    m.w_axis.y *= export.scale;
                    m.w_axis.z *= export.scale;
                    if export.swap_handedness {
                        m = super::util::swap_handedness_matrix(m);
                    }
                    doc.encode(prim, PROP_MATRIX, t, &Value::FloatArray(m.to_cols_array().to_vec()))?;
                }
            }
        }

        ctx.cache.invalidate_owner(crate::cache::CacheOwner::Schema(self.id));
        ctx.graph.node_mut(self.id).needs_update = true;
        Ok(())
    }

    fn decode(&self, ctx: &Context, t: Time) -> Result<Option<XformPayload>> {
        let prim = ctx.graph.node(self.id).prim;
        let import = *ctx.import_config();
        let doc = ctx.doc_ref()?;
        let interp = import.interpolation == crate::config::InterpolationType::Linear;

        if doc.property_type(prim, PROP_MATRIX).is_some() {
            let Some(d) = doc.decode(prim, PROP_MATRIX, t)? else {
                return Ok(None);
            };
            let v = resolve_decoded(d, interp);
            let cols = v.as_float_array()?;
            if cols.len() != 16 {
                return Err(Error::engine("transform matrix property is not 16 floats"));
            }
            let mut cols16 = [0.0f32; 16];
            cols16.copy_from_slice(cols);
            let mut m = Mat4::from_cols_array(&cols16);
            m.w_axis.x *= import.scale;
            m.w_axis.y *= import.scale;
            m.w_axis.z *= import.scale;
            if import.swap_handedness {
                m = super::util::swap_handedness_matrix(m);
            }
            return Ok(Some(XformPayload::Matrix(m)));
        }

        let position = doc.decode(prim, PROP_POSITION, t)?;
        let rotation = doc.decode(prim, PROP_ROTATION, t)?;
        let scale = doc.decode(prim, PROP_SCALE, t)?;
        if position.is_none() && rotation.is_none() && scale.is_none() {
            return Ok(None);
        }

        let mut position = match position {
            Some(d) => resolve_decoded(d, interp).as_float3()?,
            None => Vec3::ZERO,
        };
        let mut rotation = match rotation {
            Some(d) => resolve_decoded(d, interp).as_quaternion()?,
            None => Quat::IDENTITY,
        };
        let scale = match scale {
            Some(d) => resolve_decoded(d, interp).as_float3()?,
            None => Vec3::ONE,
        };

        position *= import.scale;
        if import.swap_handedness {
            position.x = -position.x;
            rotation = super::util::swap_handedness_quat(rotation);
        }
        Ok(Some(XformPayload::Trs { position, rotation, scale }))
    }

    fn update_mask(&self, ctx: &Context, payload: &XformPayload) -> XformUpdateMask {
        let mut last = ctx.last_xform.lock();
        let mask = match last.get(&self.id) {
            None => XformUpdateMask::ALL,
            Some(prev) => match (prev, payload) {
                (
                    XformPayload::Trs { position: p0, rotation: r0, scale: s0 },
                    XformPayload::Trs { position: p1, rotation: r1, scale: s1 },
                ) => XformUpdateMask {
                    position: p0 != p1,
                    rotation: r0 != r1,
                    scale: s0 != s1,
                },
                (XformPayload::Matrix(m0), XformPayload::Matrix(m1)) => {
                    if m0 == m1 {
                        XformUpdateMask::default()
                    } else {
                        XformUpdateMask::ALL
                    }
                }
                _ => XformUpdateMask::ALL,
            },
        };
        last.insert(self.id, *payload);
        mask
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
    fn test_trs_roundtrip() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "rig").unwrap();

        let authored = XformData {
            payload: XformPayload::Trs {
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation: Quat::from_rotation_y(0.5),
                scale: Vec3::splat(2.0),
            },
            updated: XformUpdateMask::default(),
        };
        xf.write_sample(&mut ctx, &authored, 0.0).unwrap();

        // Matching import/export configs make the conversion involutive.
        let read = xf.read_sample(&ctx, 0.0).unwrap().unwrap();
        match (read.payload, authored.payload) {
            (
                XformPayload::Trs { position, rotation, scale },
                XformPayload::Trs { position: p, rotation: r, scale: s },
            ) => {
                assert!(position.abs_diff_eq(p, 1e-6));
                assert!(rotation.abs_diff_eq(r, 1e-6));
                assert!(scale.abs_diff_eq(s, 1e-6));
            }
            _ => panic!("expected TRS payload"),
        }
        assert_eq!(read.updated, XformUpdateMask::ALL);

        let summary = xf.summary(&ctx).unwrap();
        assert_eq!(summary.form, XformForm::Trs);
        assert_eq!(summary.num_samples, 1);
    }

    #[test]
    fn test_update_mask_settles() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "still").unwrap();
        xf.write_sample(&mut ctx, &XformData::default(), 0.0).unwrap();

        let first = xf.read_sample(&ctx, 0.0).unwrap().unwrap();
        assert!(first.updated.any());

        // Same sample again: nothing changed since the previous read.
        let second = xf.read_sample(&ctx, 0.0).unwrap().unwrap();
        assert!(!second.updated.any());
    }

    #[test]
    fn test_form_is_fixed() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "node").unwrap();
        xf.write_sample(&mut ctx, &XformData::default(), 0.0).unwrap();

        let matrix = XformData {
            payload: XformPayload::Matrix(Mat4::IDENTITY),
            updated: XformUpdateMask::default(),
        };
        let err = xf.write_sample(&mut ctx, &matrix, 1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_unauthored_reads_none() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "empty").unwrap();
        assert!(xf.read_sample(&ctx, 0.0).unwrap().is_none());
    }
}
