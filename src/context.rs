//! Context: one bound document plus its schema graph and sample cache.
//!
//! A context starts empty, binds to exactly one document via [`open`] or
//! [`create_stage`], and stays bound until [`close`]d. All handles
//! (`SchemaId`, `AttrId`, views) are scoped to their context and stay
//! valid for its lifetime.
//!
//! [`open`]: Context::open
//! [`create_stage`]: Context::create_stage
//! [`close`]: Context::close

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::attribute::Attribute;
use crate::cache::SampleCache;
use crate::config::{ExportConfig, ImportConfig};
use crate::engine::{Document, JsonEngine, StorageEngine};
use crate::graph::{SceneGraph, SchemaId, VariantSet};
use crate::schema::xform::XformPayload;
use crate::schema::{Camera, Mesh, Points, SchemaKind, Xform};
use crate::util::{Error, Result, Time};
use crate::value::AttributeType;

/// Lifecycle state of a context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContextState {
    Empty,
    Bound,
    Closed,
}

/// Scene graph object model over one document.
pub struct Context {
    engine: Arc<dyn StorageEngine>,
    doc: Option<Box<dyn Document>>,
    state: ContextState,
    pub(crate) graph: SceneGraph,
    pub(crate) cache: SampleCache,
    /// Last transform payload returned per schema, for update masks.
    pub(crate) last_xform: Mutex<HashMap<SchemaId, XformPayload>>,
    import: ImportConfig,
    export: ExportConfig,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// An unbound context over the shipped JSON reference engine.
    pub fn new() -> Self {
        Self::with_engine(Arc::new(JsonEngine::new()))
    }

    /// An unbound context over a caller-supplied engine.
    pub fn with_engine(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            doc: None,
            state: ContextState::Empty,
            graph: SceneGraph::new(),
            cache: SampleCache::new(),
            last_xform: Mutex::new(HashMap::new()),
            import: ImportConfig::default(),
            export: ExportConfig::default(),
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    // ------------------------------------------------------------------
    // Document lifecycle
    // ------------------------------------------------------------------

    /// Bind to an existing document and discover its schema graph.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.check_unbound()?;
        let doc = self.engine.open(path)?;
        info!(path = %path.display(), "opened document");
        self.bind(doc);
        Ok(())
    }

    /// Bind to a new, empty document. Nothing is written until saved.
    pub fn create_stage(&mut self, path: &Path) -> Result<()> {
        self.check_unbound()?;
        let doc = self.engine.create(path)?;
        info!(path = %path.display(), "created document");
        self.bind(doc);
        Ok(())
    }

    /// Persist to the bound identifier.
    pub fn save(&mut self) -> Result<()> {
        let doc = self.doc_mut()?;
        doc.save()?;
        info!(identifier = doc.identifier(), "saved document");
        Ok(())
    }

    /// Persist a copy elsewhere. Fails with `InvalidArgument` when the
    /// target equals the bound identifier; use [`save`](Self::save).
    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        let doc = self.doc_mut()?;
        if Path::new(doc.identifier()) == path {
            return Err(Error::arg("save_as target equals the bound identifier"));
        }
        doc.save_as(path)?;
        info!(path = %path.display(), "saved document copy");
        Ok(())
    }

    /// Resolve all composition (references, variant selections) in the
    /// document, then resync the graph and drop every cached sample.
    /// Existing schema ids stay valid; newly materialized prims get
    /// fresh ids.
    pub fn flatten(&mut self) -> Result<()> {
        let doc = self.doc_mut()?;
        doc.flatten()?;
        info!("flattened document");

        if let (Some(doc), Some(root)) = (self.doc.as_deref(), self.graph.root()) {
            discover_children(doc, &mut self.graph, root);
            self.graph.mark_subtree_dirty(root);
        }
        self.cache.invalidate_all();
        self.last_xform.lock().clear();
        Ok(())
    }

    /// Unbind. The document is dropped without saving; the context can
    /// not be rebound.
    pub fn close(&mut self) {
        if self.state == ContextState::Bound {
            self.doc = None;
            self.state = ContextState::Closed;
            self.cache.invalidate_all();
            info!("closed context");
        }
    }

    fn check_unbound(&self) -> Result<()> {
        match self.state {
            ContextState::Empty => Ok(()),
            ContextState::Bound => {
                let id = self.doc.as_deref().map(|d| d.identifier().to_string());
                Err(Error::AlreadyBound(id.unwrap_or_default()))
            }
            ContextState::Closed => Err(Error::state("context is closed")),
        }
    }

    fn bind(&mut self, doc: Box<dyn Document>) {
        self.doc = Some(doc);
        self.state = ContextState::Bound;
        let doc = self.doc.as_deref().unwrap();
        let root = self.graph.add_root(doc.root());
        discover_children(doc, &mut self.graph, root);
        discover_instancing(doc, &mut self.graph);
    }

    pub(crate) fn doc_ref(&self) -> Result<&dyn Document> {
        self.doc
            .as_deref()
            .ok_or_else(|| Error::state("context is not bound to a document"))
    }

    pub(crate) fn doc_mut(&mut self) -> Result<&mut (dyn Document + 'static)> {
        self.doc
            .as_deref_mut()
            .ok_or_else(|| Error::state("context is not bound to a document"))
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn import_config(&self) -> &ImportConfig {
        &self.import
    }

    /// Replace the import config. Already-cached samples keep the old
    /// conversions; call [`invalidate_all_samples`](Self::invalidate_all_samples)
    /// to re-decode under the new one.
    pub fn set_import_config(&mut self, config: ImportConfig) {
        self.import = config;
    }

    pub fn export_config(&self) -> &ExportConfig {
        &self.export
    }

    pub fn set_export_config(&mut self, config: ExportConfig) {
        self.export = config;
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    pub fn root(&self) -> Option<SchemaId> {
        self.graph.root()
    }

    /// Exact path lookup. Miss returns `None`.
    pub fn find(&self, path: &str) -> Option<SchemaId> {
        self.graph.find(path)
    }

    /// Ordered children, delegating to the master for instances without
    /// local children.
    pub fn children(&self, id: SchemaId) -> &[SchemaId] {
        self.graph.children_of(id)
    }

    pub fn parent(&self, id: SchemaId) -> Option<SchemaId> {
        self.graph.node(id).parent
    }

    pub fn name(&self, id: SchemaId) -> &str {
        &self.graph.node(id).name
    }

    pub fn path(&self, id: SchemaId) -> &str {
        &self.graph.node(id).path
    }

    pub fn kind(&self, id: SchemaId) -> SchemaKind {
        self.graph.node(id).kind
    }

    /// Whether the schema has changes not yet reflected in cached
    /// samples. Cleared by [`update_all_samples`](Self::update_all_samples).
    pub fn needs_update(&self, id: SchemaId) -> bool {
        self.graph.node(id).needs_update
    }

    // ------------------------------------------------------------------
    // Schema creation and typed views
    // ------------------------------------------------------------------

    pub fn create_xform(&mut self, parent: SchemaId, name: &str) -> Result<Xform> {
        self.create_schema(parent, name, SchemaKind::Xform).map(Xform::new)
    }

    pub fn create_camera(&mut self, parent: SchemaId, name: &str) -> Result<Camera> {
        self.create_schema(parent, name, SchemaKind::Camera).map(Camera::new)
    }

    pub fn create_mesh(&mut self, parent: SchemaId, name: &str) -> Result<Mesh> {
        self.create_schema(parent, name, SchemaKind::Mesh).map(Mesh::new)
    }

    pub fn create_points(&mut self, parent: SchemaId, name: &str) -> Result<Points> {
        self.create_schema(parent, name, SchemaKind::Points).map(Points::new)
    }

    fn create_schema(&mut self, parent: SchemaId, name: &str, kind: SchemaKind) -> Result<SchemaId> {
        let parent_prim = self.graph.node(parent).prim;
        let prim = self.doc_mut()?.create_prim(parent_prim, name, kind)?;
        self.graph.add_child(parent, prim, name, kind)
    }

    /// Create a prim referencing `source`: external when `asset` names
    /// another document, internal otherwise. Internal references must
    /// target an existing path (`NotFound` otherwise) and bind the new
    /// schema as an instance of the referenced master.
    pub fn create_reference(
        &mut self,
        parent: SchemaId,
        name: &str,
        asset: Option<&str>,
        source: &str,
    ) -> Result<SchemaId> {
        if asset.is_none() && self.graph.find(source).is_none() {
            return Err(Error::NotFound(source.to_string()));
        }
        let parent_prim = self.graph.node(parent).prim;
        let instanceable = self.export.instanceable_by_default;
        let prim = {
            let doc = self.doc_mut()?;
            let prim = doc.create_prim(parent_prim, name, SchemaKind::Other)?;
            doc.add_reference(prim, asset, source)?;
            if instanceable {
                doc.set_instanceable(prim, true)?;
            }
            prim
        };
        let id = self.graph.add_child(parent, prim, name, SchemaKind::Other)?;

        if asset.is_none() {
            if let Some(master) = self.graph.find(source) {
                let master_prim = self.graph.node(master).prim;
                self.graph.set_instanceable(master, true)?;
                self.doc_mut()?.set_instanceable(master_prim, true)?;
                self.graph.set_instance_of(id, master)?;
            }
        }
        Ok(id)
    }

    /// Downcast to a transform view. Kind mismatch returns `None`.
    pub fn as_xform(&self, id: SchemaId) -> Option<Xform> {
        (self.kind(id) == SchemaKind::Xform).then(|| Xform::new(id))
    }

    pub fn as_camera(&self, id: SchemaId) -> Option<Camera> {
        (self.kind(id) == SchemaKind::Camera).then(|| Camera::new(id))
    }

    pub fn as_mesh(&self, id: SchemaId) -> Option<Mesh> {
        (self.kind(id) == SchemaKind::Mesh).then(|| Mesh::new(id))
    }

    pub fn as_points(&self, id: SchemaId) -> Option<Points> {
        (self.kind(id) == SchemaKind::Points).then(|| Points::new(id))
    }

    // ------------------------------------------------------------------
    // Instancing
    // ------------------------------------------------------------------

    /// The master schema when `id` is an instance, else `None`.
    pub fn master_of(&self, id: SchemaId) -> Option<SchemaId> {
        self.graph.master_of(id)
    }

    /// Mark or unmark a schema instanceable, in both the graph and the
    /// document. Demoting a live master fails with `InvalidState`.
    pub fn set_instanceable(&mut self, id: SchemaId, v: bool) -> Result<()> {
        self.graph.set_instanceable(id, v)?;
        let prim = self.graph.node(id).prim;
        self.doc_mut()?.set_instanceable(prim, v)
    }

    pub fn instanceable(&self, id: SchemaId) -> bool {
        use crate::graph::Instancing;
        matches!(
            self.graph.node(id).instancing,
            Instancing::Instanceable | Instancing::Master
        )
    }

    /// True when at least one instance is bound to this schema.
    pub fn is_master(&self, id: SchemaId) -> bool {
        matches!(self.graph.node(id).instancing, crate::graph::Instancing::Master)
    }

    /// True when this schema delegates its data to a master.
    pub fn is_instance(&self, id: SchemaId) -> bool {
        matches!(self.graph.node(id).instancing, crate::graph::Instancing::InstanceOf(_))
    }

    // ------------------------------------------------------------------
    // Variant sets
    // ------------------------------------------------------------------

    /// Append a variant set. Duplicate names fail silently with `None`.
    pub fn create_variant_set(&mut self, id: SchemaId, name: &str) -> Option<usize> {
        let prim = self.graph.node(id).prim;
        let doc = self.doc.as_deref_mut()?;
        if self.graph.find_variant_set(id, name).is_some() {
            return None;
        }
        doc.create_variant_set(prim, name).ok()?;
        self.graph.create_variant_set(id, name)
    }

    /// Append a variant to a set. Invalid set index or duplicate name
    /// fails silently with `None`.
    pub fn create_variant(&mut self, id: SchemaId, set: usize, name: &str) -> Option<usize> {
        let prim = self.graph.node(id).prim;
        let doc = self.doc.as_deref_mut()?;
        if self.graph.find_variant(id, set, name).is_some() {
            return None;
        }
        doc.create_variant(prim, set, name).ok()?;
        self.graph.create_variant(id, set, name)
    }

    /// Select a variant. Out-of-range indices or an unbound context
    /// return `false` and leave the selection unchanged; success drops
    /// the subtree's cached samples, since the selection changes what
    /// composes in.
    pub fn set_variant_selection(&mut self, id: SchemaId, set: usize, variant: usize) -> bool {
        let in_range = self
            .graph
            .node(id)
            .variant_sets
            .get(set)
            .is_some_and(|vset| variant < vset.variants.len());
        if !in_range {
            return false;
        }
        let prim = self.graph.node(id).prim;
        let Ok(doc) = self.doc_mut() else {
            return false;
        };
        if doc.set_variant_selection(prim, set, variant).is_err() {
            return false;
        }
        self.graph.set_variant_selection(id, set, variant);
        let subtree = self.graph.subtree(id);
        self.cache.invalidate_if(|owner| match owner {
            crate::cache::CacheOwner::Schema(s) => subtree.contains(&s),
            crate::cache::CacheOwner::Attr(_) => false,
        });
        self.graph.mark_subtree_dirty(id);
        debug!(?id, set, variant, "variant selection changed");
        true
    }

    pub fn find_variant_set(&self, id: SchemaId, name: &str) -> Option<usize> {
        self.graph.find_variant_set(id, name)
    }

    pub fn find_variant(&self, id: SchemaId, set: usize, name: &str) -> Option<usize> {
        self.graph.find_variant(id, set, name)
    }

    pub fn variant_sets(&self, id: SchemaId) -> &[VariantSet] {
        &self.graph.node(id).variant_sets
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Find an attribute by name, delegating to the master when an
    /// instance has no local override. Miss returns `None`.
    pub fn find_attribute(&self, id: SchemaId, name: &str) -> Option<Attribute> {
        self.graph.find_attribute(id, name).map(Attribute::new)
    }

    /// Declare an attribute with a fixed type. Fails with
    /// `DuplicateName` when the schema already owns one with that name.
    pub fn create_attribute(
        &mut self,
        id: SchemaId,
        name: &str,
        ty: AttributeType,
    ) -> Result<Attribute> {
        if self.graph.find_attribute(id, name).map(|a| self.graph.attr(a).owner) == Some(id) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        let prim = self.graph.node(id).prim;
        let doc = self.doc_mut()?;
        if doc.property_type(prim, name).is_none() {
            doc.declare_property(prim, name, ty)?;
        }
        self.graph.add_attribute(id, name, ty).map(Attribute::new)
    }

    /// Attributes owned by the schema itself, in creation order.
    pub fn attributes(&self, id: SchemaId) -> Vec<Attribute> {
        self.graph.node(id).attrs.iter().copied().map(Attribute::new).collect()
    }

    // ------------------------------------------------------------------
    // Sample maintenance
    // ------------------------------------------------------------------

    /// Decode every schema and attribute at time `t`, warming the cache,
    /// and clear all `needs_update` flags.
    pub fn update_all_samples(&mut self, t: Time) -> Result<()> {
        let ids: Vec<SchemaId> = self.graph.ids().collect();
        for id in &ids {
            match self.kind(*id) {
                SchemaKind::Xform => {
                    Xform::new(*id).read_sample(self, t)?;
                }
                SchemaKind::Camera => {
                    Camera::new(*id).read_sample(self, t)?;
                }
                SchemaKind::Mesh => {
                    Mesh::new(*id).read_sample(self, t, false)?;
                }
                SchemaKind::Points => {
                    Points::new(*id).read_sample(self, t, false)?;
                }
                SchemaKind::Other => {}
            }
            for attr in self.attributes(*id) {
                attr.read_sample(self, t, false)?;
            }
        }
        for id in ids {
            self.graph.node_mut(id).needs_update = false;
        }
        Ok(())
    }

    /// Drop every cached sample, forcing re-decode on the next read. The
    /// document itself is untouched.
    pub fn invalidate_all_samples(&mut self) {
        self.cache.invalidate_all();
        self.last_xform.lock().clear();
        if let Some(root) = self.graph.root() {
            self.graph.mark_subtree_dirty(root);
        }
        debug!("invalidated all cached samples");
    }
}

/// Walk the document below `parent`'s prim and add every prim missing
/// from the graph, including its declared attributes and variant sets.
/// Already-known children are left untouched, so ids stay stable across
/// repeated syncs.
fn discover_children(doc: &dyn Document, graph: &mut SceneGraph, parent: SchemaId) {
    let parent_prim = graph.node(parent).prim;
    for prim in doc.children(parent_prim) {
        let name = doc.prim_name(prim);
        let path = {
            let parent_path = &graph.node(parent).path;
            if parent_path == "/" {
                format!("/{name}")
            } else {
                format!("{parent_path}/{name}")
            }
        };
        let id = match graph.find(&path) {
            Some(id) => id,
            None => {
                let kind = doc.prim_kind(prim);
                let Ok(id) = graph.add_child(parent, prim, &name, kind) else {
                    continue;
                };
                for (attr_name, ty) in doc.properties(prim) {
                    let _ = graph.add_attribute(id, &attr_name, ty);
                }
                for desc in doc.variant_sets(prim) {
                    if let Some(set) = graph.create_variant_set(id, &desc.name) {
                        for v in &desc.variants {
                            graph.create_variant(id, set, v);
                        }
                        if let Some(sel) = desc.selection {
                            graph.set_variant_selection(id, set, sel);
                        }
                    }
                }
                id
            }
        };
        discover_children(doc, graph, id);
    }
}

/// Second discovery pass: resolve internal-reference bindings into
/// instance-of links once every path is indexed.
fn discover_instancing(doc: &dyn Document, graph: &mut SceneGraph) {
    let ids: Vec<SchemaId> = graph.ids().collect();
    for id in ids {
        let Some(source) = doc.master_binding(graph.node(id).prim) else {
            continue;
        };
        let Some(master) = graph.find(&source) else {
            continue;
        };
        if graph.set_instanceable(master, true).is_ok() {
            let _ = graph.set_instance_of(id, master);
        }
    }
}
