//! Reference storage engine with a serde document model persisted as JSON.
//!
//! This is the engine the crate ships for round-trip use and tests. It
//! keeps the whole document in memory and serializes it on save; decode
//! and encode operate on sorted per-property sample lists.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::SchemaKind;
use crate::util::{Error, Result, Time};
use crate::value::{AttributeType, Value};

use super::{Decoded, Document, PrimId, StorageEngine, VariantSetDesc};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SampleRecord {
    time: Time,
    value: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PropertyRecord {
    name: String,
    ty: AttributeType,
    /// Sorted by time, ascending.
    samples: Vec<SampleRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ReferenceRecord {
    asset: Option<String>,
    source: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PrimRecord {
    name: String,
    kind: SchemaKind,
    children: Vec<u64>,
    instanceable: bool,
    reference: Option<ReferenceRecord>,
    variant_sets: Vec<VariantSetDesc>,
    properties: Vec<PropertyRecord>,
}

impl PrimRecord {
    fn new(name: &str, kind: SchemaKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            children: Vec::new(),
            instanceable: false,
            reference: None,
            variant_sets: Vec::new(),
            properties: Vec::new(),
        }
    }
}

/// Serializable document model. Prim 0 is the root.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct DocModel {
    prims: Vec<PrimRecord>,
}

impl Default for DocModel {
    fn default() -> Self {
        Self {
            prims: vec![PrimRecord::new("", SchemaKind::Other)],
        }
    }
}

/// The shipped reference engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEngine;

impl JsonEngine {
    pub fn new() -> Self {
        Self
    }
}

impl StorageEngine for JsonEngine {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>> {
        let file = File::open(path)?;
        let model: DocModel = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::engine(format!("malformed document {}: {e}", path.display())))?;
        if model.prims.is_empty() {
            return Err(Error::engine(format!("document {} has no root prim", path.display())));
        }
        debug!(path = %path.display(), prims = model.prims.len(), "opened document");
        Ok(Box::new(JsonDocument {
            identifier: path.to_string_lossy().into_owned(),
            model,
        }))
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Document>> {
        debug!(path = %path.display(), "created document");
        Ok(Box::new(JsonDocument {
            identifier: path.to_string_lossy().into_owned(),
            model: DocModel::default(),
        }))
    }
}

/// A document held by [`JsonEngine`].
pub struct JsonDocument {
    identifier: String,
    model: DocModel,
}

impl JsonDocument {
    fn prim(&self, id: PrimId) -> Result<&PrimRecord> {
        self.model
            .prims
            .get(id.0 as usize)
            .ok_or_else(|| Error::engine(format!("dangling prim handle {}", id.0)))
    }

    fn prim_mut(&mut self, id: PrimId) -> Result<&mut PrimRecord> {
        self.model
            .prims
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::engine(format!("dangling prim handle {}", id.0)))
    }

    fn property(&self, prim: PrimId, name: &str) -> Option<&PropertyRecord> {
        self.prim(prim).ok()?.properties.iter().find(|p| p.name == name)
    }

    fn resolve_path(&self, path: &str) -> Option<usize> {
        let mut cur = 0usize;
        for part in path.split('/').filter(|s| !s.is_empty()) {
            let prim = self.model.prims.get(cur)?;
            cur = prim
                .children
                .iter()
                .map(|&c| c as usize)
                .find(|&c| self.model.prims.get(c).is_some_and(|p| p.name == part))?;
        }
        Some(cur)
    }

    fn write_model(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.model)
            .map_err(|e| Error::engine(format!("failed to serialize document: {e}")))
    }

    /// Deep-copy the subtree rooted at `src`, returning the new root index.
    fn clone_subtree(&mut self, src: usize) -> usize {
        let mut record = self.model.prims[src].clone();
        let children = std::mem::take(&mut record.children);
        let new_idx = self.model.prims.len();
        self.model.prims.push(record);
        for child in children {
            let copied = self.clone_subtree(child as usize);
            self.model.prims[new_idx].children.push(copied as u64);
        }
        new_idx
    }

    /// Merge the source prim's content into `dst`: properties, variant
    /// sets, and children that are not locally overridden by name.
    fn copy_into(&mut self, src: usize, dst: usize) {
        let src_record = self.model.prims[src].clone();
        for prop in src_record.properties {
            if !self.model.prims[dst].properties.iter().any(|p| p.name == prop.name) {
                self.model.prims[dst].properties.push(prop);
            }
        }
        for vset in src_record.variant_sets {
            if !self.model.prims[dst].variant_sets.iter().any(|v| v.name == vset.name) {
                self.model.prims[dst].variant_sets.push(vset);
            }
        }
        for child in src_record.children {
            let name = self.model.prims[child as usize].name.clone();
            let collides = self.model.prims[dst]
                .children
                .iter()
                .any(|&c| self.model.prims[c as usize].name == name);
            if !collides {
                let copied = self.clone_subtree(child as usize);
                self.model.prims[dst].children.push(copied as u64);
            }
        }
    }
}

impl Document for JsonDocument {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn save(&mut self) -> Result<()> {
        let path = std::path::PathBuf::from(&self.identifier);
        self.write_model(&path)
    }

    fn save_as(&mut self, path: &Path) -> Result<()> {
        self.write_model(path)
    }

    fn flatten(&mut self) -> Result<()> {
        // Resolve internal references until none remain; nested references
        // appear in copied subtrees, so iterate with a cycle cap.
        let mut budget = 10_000usize;
        loop {
            let Some(idx) = self
                .model
                .prims
                .iter()
                .position(|p| p.reference.as_ref().is_some_and(|r| r.asset.is_none()))
            else {
                break;
            };
            budget = budget
                .checked_sub(1)
                .ok_or_else(|| Error::engine("reference cycle detected during flatten"))?;
            let source = match self.model.prims[idx].reference.take() {
                Some(r) => r.source,
                None => continue,
            };
            if let Some(src) = self.resolve_path(&source) {
                self.copy_into(src, idx);
            } else {
                debug!(source, "dropping dangling reference during flatten");
            }
        }
        // External references cannot be resolved by this engine.
        for prim in &mut self.model.prims {
            prim.reference = None;
        }
        Ok(())
    }

    fn root(&self) -> PrimId {
        PrimId(0)
    }

    fn children(&self, prim: PrimId) -> Vec<PrimId> {
        self.prim(prim)
            .map(|p| p.children.iter().map(|&c| PrimId(c)).collect())
            .unwrap_or_default()
    }

    fn prim_name(&self, prim: PrimId) -> String {
        self.prim(prim).map(|p| p.name.clone()).unwrap_or_default()
    }

    fn prim_kind(&self, prim: PrimId) -> SchemaKind {
        self.prim(prim).map(|p| p.kind).unwrap_or(SchemaKind::Other)
    }

    fn create_prim(&mut self, parent: PrimId, name: &str, kind: SchemaKind) -> Result<PrimId> {
        let children = self.prim(parent)?.children.clone();
        for &c in &children {
            if self.model.prims[c as usize].name == name {
                return Err(Error::DuplicateName(name.to_string()));
            }
        }
        let id = self.model.prims.len() as u64;
        self.model.prims.push(PrimRecord::new(name, kind));
        self.prim_mut(parent)?.children.push(id);
        Ok(PrimId(id))
    }

    fn add_reference(&mut self, prim: PrimId, asset: Option<&str>, source: &str) -> Result<()> {
        self.prim_mut(prim)?.reference = Some(ReferenceRecord {
            asset: asset.map(str::to_string),
            source: source.to_string(),
        });
        Ok(())
    }

    fn instanceable(&self, prim: PrimId) -> bool {
        self.prim(prim).map(|p| p.instanceable).unwrap_or(false)
    }

    fn set_instanceable(&mut self, prim: PrimId, v: bool) -> Result<()> {
        self.prim_mut(prim)?.instanceable = v;
        Ok(())
    }

    fn master_binding(&self, prim: PrimId) -> Option<String> {
        self.prim(prim)
            .ok()?
            .reference
            .as_ref()
            .filter(|r| r.asset.is_none())
            .map(|r| r.source.clone())
    }

    fn variant_sets(&self, prim: PrimId) -> Vec<VariantSetDesc> {
        self.prim(prim).map(|p| p.variant_sets.clone()).unwrap_or_default()
    }

    fn create_variant_set(&mut self, prim: PrimId, name: &str) -> Result<usize> {
        let record = self.prim_mut(prim)?;
        if record.variant_sets.iter().any(|v| v.name == name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        record.variant_sets.push(VariantSetDesc {
            name: name.to_string(),
            variants: Vec::new(),
            selection: None,
        });
        Ok(record.variant_sets.len() - 1)
    }

    fn create_variant(&mut self, prim: PrimId, set: usize, name: &str) -> Result<usize> {
        let record = self.prim_mut(prim)?;
        let vset = record
            .variant_sets
            .get_mut(set)
            .ok_or_else(|| Error::arg(format!("variant set index {set} out of range")))?;
        if vset.variants.iter().any(|v| v == name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        vset.variants.push(name.to_string());
        Ok(vset.variants.len() - 1)
    }

    fn set_variant_selection(&mut self, prim: PrimId, set: usize, variant: usize) -> Result<()> {
        let record = self.prim_mut(prim)?;
        let vset = record
            .variant_sets
            .get_mut(set)
            .ok_or_else(|| Error::arg(format!("variant set index {set} out of range")))?;
        if variant >= vset.variants.len() {
            return Err(Error::arg(format!("variant index {variant} out of range")));
        }
        vset.selection = Some(variant);
        Ok(())
    }

    fn properties(&self, prim: PrimId) -> Vec<(String, AttributeType)> {
        self.prim(prim)
            .map(|p| p.properties.iter().map(|pr| (pr.name.clone(), pr.ty)).collect())
            .unwrap_or_default()
    }

    fn declare_property(&mut self, prim: PrimId, name: &str, ty: AttributeType) -> Result<()> {
        let record = self.prim_mut(prim)?;
        if record.properties.iter().any(|p| p.name == name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        record.properties.push(PropertyRecord {
            name: name.to_string(),
            ty,
            samples: Vec::new(),
        });
        Ok(())
    }

    fn property_type(&self, prim: PrimId, name: &str) -> Option<AttributeType> {
        self.property(prim, name).map(|p| p.ty)
    }

    fn time_range(&self, prim: PrimId, name: &str) -> Option<(Time, Time)> {
        let prop = self.property(prim, name)?;
        let first = prop.samples.first()?;
        let last = prop.samples.last()?;
        Some((first.time, last.time))
    }

    fn sample_count(&self, prim: PrimId, name: &str) -> usize {
        self.property(prim, name).map(|p| p.samples.len()).unwrap_or(0)
    }

    fn sample_times(&self, prim: PrimId, name: &str) -> Vec<Time> {
        self.property(prim, name)
            .map(|p| p.samples.iter().map(|s| s.time).collect())
            .unwrap_or_default()
    }

    fn decode(&self, prim: PrimId, name: &str, t: Time) -> Result<Option<Decoded>> {
        let Some(prop) = self.property(prim, name) else {
            return Ok(None);
        };
        if prop.samples.is_empty() {
            return Ok(None);
        }
        let pp = prop.samples.partition_point(|s| s.time <= t);
        if pp == 0 {
            // Before the first sample: held-first semantics, no bracket.
            return Ok(Some(Decoded {
                held: prop.samples[0].value.clone(),
                bracket: None,
            }));
        }
        let floor = &prop.samples[pp - 1];
        let bracket = prop.samples.get(pp).and_then(|next| {
            let span = next.time - floor.time;
            if floor.time < t && span > 0.0 {
                Some((next.value.clone(), (t - floor.time) / span))
            } else {
                None
            }
        });
        Ok(Some(Decoded {
            held: floor.value.clone(),
            bracket,
        }))
    }

    fn encode(&mut self, prim: PrimId, name: &str, t: Time, value: &Value) -> Result<()> {
        let ty = value.attribute_type();
        let record = self.prim_mut(prim)?;
        let idx = match record.properties.iter().position(|p| p.name == name) {
            Some(i) => i,
            None => {
                record.properties.push(PropertyRecord {
                    name: name.to_string(),
                    ty,
                    samples: Vec::new(),
                });
                record.properties.len() - 1
            }
        };
        let prop = &mut record.properties[idx];
        if prop.ty != ty {
            return Err(Error::TypeMismatch {
                expected: prop.ty.name().into(),
                actual: ty.name().into(),
            });
        }
        let pp = prop.samples.partition_point(|s| s.time < t);
        if prop.samples.get(pp).is_some_and(|s| s.time.to_bits() == t.to_bits()) {
            prop.samples[pp].value = value.clone();
        } else {
            prop.samples.insert(pp, SampleRecord { time: t, value: value.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_doc() -> Box<dyn Document> {
        JsonEngine.create(Path::new("test.scene")).expect("create")
    }

    #[test]
    fn test_create_prim_and_children() {
        let mut doc = fresh_doc();
        let root = doc.root();
        let a = doc.create_prim(root, "a", SchemaKind::Xform).unwrap();
        let b = doc.create_prim(a, "b", SchemaKind::Mesh).unwrap();

        assert_eq!(doc.children(root), vec![a]);
        assert_eq!(doc.children(a), vec![b]);
        assert_eq!(doc.prim_name(b), "b");
        assert_eq!(doc.prim_kind(b), SchemaKind::Mesh);
    }

    #[test]
    fn test_create_prim_duplicate() {
        let mut doc = fresh_doc();
        let root = doc.root();
        doc.create_prim(root, "x", SchemaKind::Xform).unwrap();
        let err = doc.create_prim(root, "x", SchemaKind::Xform).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
        assert_eq!(doc.children(root).len(), 1);
    }

    #[test]
    fn test_encode_decode_held() {
        let mut doc = fresh_doc();
        let root = doc.root();
        doc.encode(root, "v", 0.0, &Value::Float(1.0)).unwrap();
        doc.encode(root, "v", 1.0, &Value::Float(3.0)).unwrap();

        // Exact hit: no bracket.
        let d = doc.decode(root, "v", 0.0).unwrap().unwrap();
        assert_eq!(d.held, Value::Float(1.0));
        assert!(d.bracket.is_none());

        // Between samples: bracket with alpha.
        let d = doc.decode(root, "v", 0.25).unwrap().unwrap();
        assert_eq!(d.held, Value::Float(1.0));
        let (next, alpha) = d.bracket.unwrap();
        assert_eq!(next, Value::Float(3.0));
        assert!((alpha - 0.25).abs() < 1e-9);

        // Past the end: held-last.
        let d = doc.decode(root, "v", 9.0).unwrap().unwrap();
        assert_eq!(d.held, Value::Float(3.0));
        assert!(d.bracket.is_none());

        // Before the start: held-first.
        let d = doc.decode(root, "v", -1.0).unwrap().unwrap();
        assert_eq!(d.held, Value::Float(1.0));
        assert!(d.bracket.is_none());
    }

    #[test]
    fn test_encode_replaces_same_time() {
        let mut doc = fresh_doc();
        let root = doc.root();
        doc.encode(root, "v", 0.5, &Value::Int(1)).unwrap();
        doc.encode(root, "v", 0.5, &Value::Int(2)).unwrap();
        assert_eq!(doc.sample_count(root, "v"), 1);
        let d = doc.decode(root, "v", 0.5).unwrap().unwrap();
        assert_eq!(d.held, Value::Int(2));
    }

    #[test]
    fn test_encode_type_mismatch() {
        let mut doc = fresh_doc();
        let root = doc.root();
        doc.encode(root, "v", 0.0, &Value::Float(1.0)).unwrap();
        let err = doc.encode(root, "v", 1.0, &Value::Int(1)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_save_and_reopen() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut doc = JsonEngine.create(tmp.path()).unwrap();
        let root = doc.root();
        let prim = doc.create_prim(root, "geo", SchemaKind::Points).unwrap();
        doc.encode(prim, "P", 0.0, &Value::Float3Array(vec![glam::Vec3::ONE])).unwrap();
        doc.save().unwrap();

        let reopened = JsonEngine.open(tmp.path()).unwrap();
        let prim = reopened.children(reopened.root())[0];
        assert_eq!(reopened.prim_name(prim), "geo");
        let d = reopened.decode(prim, "P", 0.0).unwrap().unwrap();
        assert_eq!(d.held, Value::Float3Array(vec![glam::Vec3::ONE]));
    }

    #[test]
    fn test_flatten_internal_reference() {
        let mut doc = fresh_doc();
        let root = doc.root();
        let src = doc.create_prim(root, "master", SchemaKind::Mesh).unwrap();
        doc.encode(src, "P", 0.0, &Value::Float3Array(vec![glam::Vec3::X])).unwrap();
        let inst = doc.create_prim(root, "inst", SchemaKind::Mesh).unwrap();
        doc.add_reference(inst, None, "/master").unwrap();

        doc.flatten().unwrap();
        assert!(doc.master_binding(inst).is_none());
        let d = doc.decode(inst, "P", 0.0).unwrap().unwrap();
        assert_eq!(d.held, Value::Float3Array(vec![glam::Vec3::X]));
    }
}
