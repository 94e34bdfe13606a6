//! Generic typed attributes.
//!
//! Attributes carry samples of a declared [`AttributeType`], fixed at
//! creation. They share the cache and copy semantics of the typed schema
//! views but move raw [`Value`]s instead of schema-shaped data.

use std::sync::Arc;

use crate::cache::{CacheOwner, CachedSample, SampleKey};
use crate::config::InterpolationType;
use crate::context::Context;
use crate::graph::AttrId;
use crate::util::{Result, Time};
use crate::value::{AttributeType, Value};

/// Time extent and declared type of an attribute.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct AttributeSummary {
    pub start: Time,
    pub end: Time,
    pub attribute_type: AttributeType,
    pub num_samples: usize,
}

/// Handle to one attribute of a schema.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Attribute {
    id: AttrId,
}

impl Attribute {
    pub(crate) fn new(id: AttrId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> AttrId {
        self.id
    }

    pub fn name<'a>(&self, ctx: &'a Context) -> &'a str {
        &ctx.graph.attr(self.id).name
    }

    /// Declared type, fixed at creation.
    pub fn attribute_type(&self, ctx: &Context) -> AttributeType {
        ctx.graph.attr(self.id).ty
    }

    pub fn summary(&self, ctx: &Context) -> Result<AttributeSummary> {
        let attr = ctx.graph.attr(self.id);
        let prim = ctx.graph.node(attr.owner).prim;
        let doc = ctx.doc_ref()?;
        let (start, end) = doc.time_range(prim, &attr.name).unwrap_or((0.0, 0.0));
        Ok(AttributeSummary {
            start,
            end,
            attribute_type: attr.ty,
            num_samples: doc.sample_count(prim, &attr.name),
        })
    }

    /// Decode the attribute at time `t`. Numeric payloads interpolate
    /// under the Linear import config; Token/String/Asset always hold.
    /// With `copy` unset the returned value aliases cache storage.
    pub fn read_sample(&self, ctx: &Context, t: Time, copy: bool) -> Result<Option<Arc<Value>>> {
        let key = SampleKey::attr(self.id, t);
        let value = match ctx.cache.get(&key) {
            Some(CachedSample::Value(v)) => v,
            _ => {
                let attr = ctx.graph.attr(self.id);
                let prim = ctx.graph.node(attr.owner).prim;
                let interp = ctx.import_config().interpolation == InterpolationType::Linear
                    && attr.ty.is_numeric();
                let doc = ctx.doc_ref()?;
                let Some(d) = doc.decode(prim, &attr.name, t)? else {
                    return Ok(None);
                };
                let value = match (interp, d.bracket) {
                    (true, Some((next, alpha))) => Value::lerp(&d.held, &next, alpha),
                    _ => d.held,
                };
                value.expect_type(attr.ty)?;
                let value = Arc::new(value);
                ctx.cache.put(
                    key,
                    CachedSample::Value(value.clone()),
                    ctx.import_config().double_buffering,
                );
                value
            }
        };
        Ok(Some(if copy { Arc::new((*value).clone()) } else { value }))
    }

    /// Encode a sample at time `t`. The value must carry the declared
    /// type; a zero-length array is a valid sample.
    pub fn write_sample(&self, ctx: &mut Context, value: &Value, t: Time) -> Result<()> {
        let attr = ctx.graph.attr(self.id);
        value.expect_type(attr.ty)?;
        let owner = attr.owner;
        let name = attr.name.clone();
        let prim = ctx.graph.node(owner).prim;

        ctx.doc_mut()?.encode(prim, &name, t, value)?;

        ctx.cache.invalidate_owner(CacheOwner::Attr(self.id));
        ctx.graph.node_mut(owner).needs_update = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::util::Error;

    fn bound_context() -> (Context, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Context::new();
        ctx.create_stage(&dir.path().join("scene.json")).unwrap();
        (ctx, dir)
    }

    #[test]
    fn test_create_find_read_write() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "node").unwrap();

        assert!(ctx.find_attribute(xf.id(), "mass").is_none());
        let attr = ctx.create_attribute(xf.id(), "mass", AttributeType::Float).unwrap();
        assert_eq!(attr.name(&ctx), "mass");
        assert_eq!(attr.attribute_type(&ctx), AttributeType::Float);
        assert_eq!(ctx.find_attribute(xf.id(), "mass"), Some(attr));

        assert!(attr.read_sample(&ctx, 0.0, false).unwrap().is_none());
        attr.write_sample(&mut ctx, &Value::Float(2.5), 0.0).unwrap();
        let v = attr.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        assert_eq!(*v, Value::Float(2.5));

        let summary = attr.summary(&ctx).unwrap();
        assert_eq!(summary.attribute_type, AttributeType::Float);
        assert_eq!(summary.num_samples, 1);
    }

    #[test]
    fn test_type_is_enforced() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "node").unwrap();
        let attr = ctx.create_attribute(xf.id(), "ids", AttributeType::IntArray).unwrap();

        let err = attr.write_sample(&mut ctx, &Value::Int(1), 0.0).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        // A zero-length array is a valid sample, distinct from absent.
        attr.write_sample(&mut ctx, &Value::IntArray(Vec::new()), 0.0).unwrap();
        let v = attr.read_sample(&ctx, 0.0, false).unwrap().unwrap();
        assert_eq!(v.element_count(), 0);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "node").unwrap();
        ctx.create_attribute(xf.id(), "mass", AttributeType::Float).unwrap();

        let err = ctx.create_attribute(xf.id(), "mass", AttributeType::Float).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
    }

    #[test]
    fn test_token_holds_under_linear() {
        let (mut ctx, _dir) = bound_context();
        let root = ctx.root().unwrap();
        let xf = ctx.create_xform(root, "node").unwrap();
        let attr = ctx.create_attribute(xf.id(), "state", AttributeType::Token).unwrap();
        attr.write_sample(&mut ctx, &Value::Token("walk".into()), 0.0).unwrap();
        attr.write_sample(&mut ctx, &Value::Token("run".into()), 1.0).unwrap();

        let v = attr.read_sample(&ctx, 0.5, false).unwrap().unwrap();
        assert_eq!(*v, Value::Token("walk".into()));
    }
}
