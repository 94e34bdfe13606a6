//! Scene Storage Engine boundary.
//!
//! The interchange layer never parses files itself; it drives a
//! [`Document`] obtained from a [`StorageEngine`]. The engine owns file
//! parsing, on-disk layout, and composition/reference resolution. A
//! JSON-backed reference engine ships in [`json`].

pub mod json;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::SchemaKind;
use crate::util::{Result, Time};
use crate::value::{AttributeType, Value};

pub use json::JsonEngine;

/// Engine-side prim handle. Opaque to callers of the interchange layer;
/// only the owning document dereferences it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PrimId(pub u64);

/// Snapshot of one variant set as stored in the document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantSetDesc {
    pub name: String,
    pub variants: Vec<String>,
    pub selection: Option<usize>,
}

/// Result of decoding a property at a point in time.
#[derive(Clone, Debug)]
pub struct Decoded {
    /// Sample at-or-before the requested time (first sample when the
    /// request precedes all authored samples).
    pub held: Value,
    /// Next authored sample and the interpolation factor toward it, when
    /// the request falls strictly between two samples.
    pub bracket: Option<(Value, f64)>,
}

/// Factory for documents. One engine can back many contexts.
pub trait StorageEngine: Send + Sync {
    /// Open an existing document at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn Document>>;

    /// Create a new, empty document bound to `path`. Nothing is written
    /// until the document is saved.
    fn create(&self, path: &Path) -> Result<Box<dyn Document>>;
}

/// An open scene document owned by the storage engine.
///
/// Failures reported by implementations surface to callers unmodified;
/// the interchange layer never retries.
pub trait Document: Send {
    /// The identifier this document is bound to (the open/create path).
    fn identifier(&self) -> &str;

    /// Persist to the bound identifier.
    fn save(&mut self) -> Result<()>;

    /// Persist a copy to a different location.
    fn save_as(&mut self, path: &Path) -> Result<()>;

    /// Resolve all composition (references, variant selections) in place.
    fn flatten(&mut self) -> Result<()>;

    /// Root prim of the document.
    fn root(&self) -> PrimId;

    /// Ordered child prims.
    fn children(&self, prim: PrimId) -> Vec<PrimId>;

    /// Prim name (empty for root).
    fn prim_name(&self, prim: PrimId) -> String;

    /// Prim kind tag.
    fn prim_kind(&self, prim: PrimId) -> SchemaKind;

    /// Create a child prim. Fails with `DuplicateName` on sibling
    /// collision.
    fn create_prim(&mut self, parent: PrimId, name: &str, kind: SchemaKind) -> Result<PrimId>;

    /// Attach a reference: external when `asset` is set, internal
    /// otherwise. `source` is the referenced prim path.
    fn add_reference(&mut self, prim: PrimId, asset: Option<&str>, source: &str) -> Result<()>;

    /// Whether the prim is marked instanceable.
    fn instanceable(&self, prim: PrimId) -> bool;

    /// Mark or unmark the prim instanceable.
    fn set_instanceable(&mut self, prim: PrimId, v: bool) -> Result<()>;

    /// Source path of the prim's internal reference, if any. This is the
    /// master binding the graph layer resolves to a schema id.
    fn master_binding(&self, prim: PrimId) -> Option<String>;

    /// All variant sets authored on the prim.
    fn variant_sets(&self, prim: PrimId) -> Vec<VariantSetDesc>;

    /// Append a variant set; returns its index.
    fn create_variant_set(&mut self, prim: PrimId, name: &str) -> Result<usize>;

    /// Append a variant to a set; returns its index within the set.
    fn create_variant(&mut self, prim: PrimId, set: usize, name: &str) -> Result<usize>;

    /// Select a variant. Out-of-range indices fail with
    /// `InvalidArgument`; selection is left unchanged.
    fn set_variant_selection(&mut self, prim: PrimId, set: usize, variant: usize) -> Result<()>;

    /// Declared properties of the prim, in authored order.
    fn properties(&self, prim: PrimId) -> Vec<(String, AttributeType)>;

    /// Declare a property. Fails with `DuplicateName` when already
    /// declared.
    fn declare_property(&mut self, prim: PrimId, name: &str, ty: AttributeType) -> Result<()>;

    /// Declared type of a property, if present.
    fn property_type(&self, prim: PrimId, name: &str) -> Option<AttributeType>;

    /// First and last authored sample times, if any samples exist.
    fn time_range(&self, prim: PrimId, name: &str) -> Option<(Time, Time)>;

    /// Number of authored samples.
    fn sample_count(&self, prim: PrimId, name: &str) -> usize;

    /// Authored sample times, ascending.
    fn sample_times(&self, prim: PrimId, name: &str) -> Vec<Time>;

    /// Decode the property value around time `t`. `Ok(None)` when the
    /// property is absent or has no samples.
    fn decode(&self, prim: PrimId, name: &str, t: Time) -> Result<Option<Decoded>>;

    /// Encode a sample at time `t`, replacing any sample at the same
    /// time. Declares the property from the value's type when absent;
    /// fails with `TypeMismatch` against a differing declared type.
    fn encode(&mut self, prim: PrimId, name: &str, t: Time, value: &Value) -> Result<()>;
}
