//! Schema graph: the prim hierarchy.
//!
//! Nodes live in a single arena owned by the Context; identity is a
//! monotonically increasing [`SchemaId`], stable for the Context's
//! lifetime. Parent, child, and instance-to-master links are plain ids,
//! never owning references. Nodes are created explicitly or discovered
//! when a document is opened, and destroyed only with the Context.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::engine::PrimId;
use crate::schema::mesh::TopologyVariance;
use crate::schema::SchemaKind;
use crate::util::{Error, Result};
use crate::value::AttributeType;

/// Process-local schema (prim) handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct SchemaId(pub u32);

/// Process-local attribute handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AttrId(pub u32);

/// Instancing state of a schema. Exactly one of master / instance /
/// plain holds at a time; `Instanceable` is plain but eligible to become
/// a master.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Instancing {
    #[default]
    Plain,
    Instanceable,
    Master,
    InstanceOf(SchemaId),
}

/// A named, switchable alternative sub-configuration of a schema.
#[derive(Clone, Debug, Default)]
pub struct VariantSet {
    pub name: String,
    pub variants: Vec<String>,
    pub selection: Option<usize>,
}

/// One node of the schema graph.
#[derive(Debug)]
pub struct SchemaNode {
    pub id: SchemaId,
    pub prim: PrimId,
    pub name: String,
    pub path: String,
    pub kind: SchemaKind,
    pub parent: Option<SchemaId>,
    pub children: SmallVec<[SchemaId; 8]>,
    pub instancing: Instancing,
    pub attrs: SmallVec<[AttrId; 4]>,
    pub variant_sets: Vec<VariantSet>,
    /// Pending changes not yet reflected in cached samples.
    pub needs_update: bool,
    /// Mesh schemas only: classification established so far. Monotonic
    /// within one document session.
    pub variance: Option<TopologyVariance>,
    /// Points schemas only: peak point count across authored samples.
    pub peak_points: usize,
}

/// One attribute, owned by exactly one schema.
#[derive(Debug)]
pub struct AttrNode {
    pub id: AttrId,
    pub owner: SchemaId,
    pub name: String,
    pub ty: AttributeType,
}

/// Arena of schema nodes plus a path index.
#[derive(Default)]
pub struct SceneGraph {
    nodes: Vec<SchemaNode>,
    attrs: Vec<AttrNode>,
    path_index: HashMap<String, SchemaId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the root node for a freshly bound document.
    pub fn add_root(&mut self, prim: PrimId) -> SchemaId {
        debug_assert!(self.nodes.is_empty());
        let id = SchemaId(self.nodes.len() as u32);
        self.nodes.push(SchemaNode {
            id,
            prim,
            name: String::new(),
            path: "/".to_string(),
            kind: SchemaKind::Other,
            parent: None,
            children: SmallVec::new(),
            instancing: Instancing::Plain,
            attrs: SmallVec::new(),
            variant_sets: Vec::new(),
            needs_update: false,
            variance: None,
            peak_points: 0,
        });
        self.path_index.insert("/".to_string(), id);
        id
    }

    pub fn root(&self) -> Option<SchemaId> {
        self.nodes.first().map(|n| n.id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: SchemaId) -> &mut SchemaNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn attr(&self, id: AttrId) -> &AttrNode {
        &self.attrs[id.0 as usize]
    }

    /// Exact path lookup. Miss returns `None`.
    pub fn find(&self, path: &str) -> Option<SchemaId> {
        self.path_index.get(path).copied()
    }

    /// Add a child schema under `parent`. Fails with `DuplicateName` when
    /// a sibling with that name exists; the parent is left unchanged.
    pub fn add_child(
        &mut self,
        parent: SchemaId,
        prim: PrimId,
        name: &str,
        kind: SchemaKind,
    ) -> Result<SchemaId> {
        if self.child_by_name(parent, name).is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }
        let parent_path = &self.node(parent).path;
        let path = if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        };
        let id = SchemaId(self.nodes.len() as u32);
        self.nodes.push(SchemaNode {
            id,
            prim,
            name: name.to_string(),
            path: path.clone(),
            kind,
            parent: Some(parent),
            children: SmallVec::new(),
            instancing: Instancing::Plain,
            attrs: SmallVec::new(),
            variant_sets: Vec::new(),
            needs_update: false,
            variance: None,
            peak_points: 0,
        });
        self.node_mut(parent).children.push(id);
        self.path_index.insert(path, id);
        Ok(id)
    }

    fn child_by_name(&self, parent: SchemaId, name: &str) -> Option<SchemaId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).name == name)
    }

    /// Ordered children, delegating to the master for instances without
    /// local overrides.
    pub fn children_of(&self, id: SchemaId) -> &[SchemaId] {
        let node = self.node(id);
        if node.children.is_empty() {
            if let Instancing::InstanceOf(master) = node.instancing {
                return &self.node(master).children;
            }
        }
        &node.children
    }

    /// The master schema when `id` is an instance, else `None`.
    pub fn master_of(&self, id: SchemaId) -> Option<SchemaId> {
        match self.node(id).instancing {
            Instancing::InstanceOf(master) => Some(master),
            _ => None,
        }
    }

    /// Toggle instanceability. Demoting a live master or retargeting an
    /// instance fails with `InvalidState`; state is left unchanged.
    pub fn set_instanceable(&mut self, id: SchemaId, v: bool) -> Result<()> {
        let node = self.node_mut(id);
        node.instancing = match (node.instancing, v) {
            (Instancing::Plain, true) => Instancing::Instanceable,
            (Instancing::Instanceable, false) => Instancing::Plain,
            (cur @ (Instancing::Instanceable | Instancing::Master), true) => cur,
            (cur @ Instancing::Plain, false) => cur,
            (Instancing::Master, false) => {
                return Err(Error::state("schema is the master of live instances"))
            }
            (Instancing::InstanceOf(_), _) => {
                return Err(Error::state("schema is an instance; retarget via its master"))
            }
        };
        Ok(())
    }

    /// Bind `inst` as an instance of `master`. The master must be marked
    /// instanceable; binding to itself or to a schema inside the
    /// instance's own subtree fails with `InvalidState`.
    pub fn set_instance_of(&mut self, inst: SchemaId, master: SchemaId) -> Result<()> {
        if inst == master || self.is_descendant_of(master, inst) {
            return Err(Error::state("instance chain would become cyclic"));
        }
        match self.node(master).instancing {
            Instancing::Instanceable | Instancing::Master => {}
            _ => return Err(Error::state("master schema is not instanceable")),
        }
        if !matches!(self.node(inst).instancing, Instancing::Plain) {
            return Err(Error::state("schema already participates in instancing"));
        }
        self.node_mut(inst).instancing = Instancing::InstanceOf(master);
        self.node_mut(master).instancing = Instancing::Master;
        Ok(())
    }

    fn is_descendant_of(&self, id: SchemaId, ancestor: SchemaId) -> bool {
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.node(p).parent;
        }
        false
    }

    /// Find an attribute by name, delegating to the master when the
    /// instance has no local override.
    pub fn find_attribute(&self, schema: SchemaId, name: &str) -> Option<AttrId> {
        let local = self
            .node(schema)
            .attrs
            .iter()
            .copied()
            .find(|&a| self.attr(a).name == name);
        if local.is_some() {
            return local;
        }
        if let Instancing::InstanceOf(master) = self.node(schema).instancing {
            return self
                .node(master)
                .attrs
                .iter()
                .copied()
                .find(|&a| self.attr(a).name == name);
        }
        None
    }

    /// Add an attribute. Fails with `DuplicateName` when the schema
    /// already owns one with that name (master-delegated attributes do
    /// not block local overrides).
    pub fn add_attribute(
        &mut self,
        schema: SchemaId,
        name: &str,
        ty: AttributeType,
    ) -> Result<AttrId> {
        let exists = self
            .node(schema)
            .attrs
            .iter()
            .any(|&a| self.attr(a).name == name);
        if exists {
            return Err(Error::DuplicateName(name.to_string()));
        }
        let id = AttrId(self.attrs.len() as u32);
        self.attrs.push(AttrNode {
            id,
            owner: schema,
            name: name.to_string(),
            ty,
        });
        self.node_mut(schema).attrs.push(id);
        Ok(id)
    }

    /// Append a variant set. Duplicate names fail silently with `None`.
    pub fn create_variant_set(&mut self, schema: SchemaId, name: &str) -> Option<usize> {
        let node = self.node_mut(schema);
        if node.variant_sets.iter().any(|v| v.name == name) {
            return None;
        }
        node.variant_sets.push(VariantSet {
            name: name.to_string(),
            ..Default::default()
        });
        Some(node.variant_sets.len() - 1)
    }

    /// Append a variant. Invalid set index or duplicate name fails
    /// silently with `None`.
    pub fn create_variant(&mut self, schema: SchemaId, set: usize, name: &str) -> Option<usize> {
        let vset = self.node_mut(schema).variant_sets.get_mut(set)?;
        if vset.variants.iter().any(|v| v == name) {
            return None;
        }
        vset.variants.push(name.to_string());
        Some(vset.variants.len() - 1)
    }

    /// Select a variant. Out-of-range indices return `false` and leave
    /// the current selection unchanged.
    pub fn set_variant_selection(&mut self, schema: SchemaId, set: usize, variant: usize) -> bool {
        let Some(vset) = self.node_mut(schema).variant_sets.get_mut(set) else {
            return false;
        };
        if variant >= vset.variants.len() {
            return false;
        }
        vset.selection = Some(variant);
        true
    }

    pub fn find_variant_set(&self, schema: SchemaId, name: &str) -> Option<usize> {
        self.node(schema).variant_sets.iter().position(|v| v.name == name)
    }

    pub fn find_variant(&self, schema: SchemaId, set: usize, name: &str) -> Option<usize> {
        self.node(schema)
            .variant_sets
            .get(set)?
            .variants
            .iter()
            .position(|v| v == name)
    }

    /// All ids in the subtree rooted at `id`, including `id`.
    pub fn subtree(&self, id: SchemaId) -> Vec<SchemaId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend_from_slice(&self.node(cur).children);
        }
        out
    }

    /// Flag the whole subtree as having pending changes.
    pub fn mark_subtree_dirty(&mut self, id: SchemaId) {
        for s in self.subtree(id) {
            self.node_mut(s).needs_update = true;
        }
    }

    /// Iterate all schema ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = SchemaId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// Number of schemas in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_root() -> (SceneGraph, SchemaId) {
        let mut g = SceneGraph::new();
        let root = g.add_root(PrimId(0));
        (g, root)
    }

    #[test]
    fn test_add_child_and_find() {
        let (mut g, root) = graph_with_root();
        let a = g.add_child(root, PrimId(1), "a", SchemaKind::Xform).unwrap();
        let b = g.add_child(a, PrimId(2), "b", SchemaKind::Mesh).unwrap();

        assert_eq!(g.node(a).parent, Some(root));
        assert_eq!(g.node(b).path, "/a/b");
        assert_eq!(g.find("/a/b"), Some(b));
        assert_eq!(g.find("/missing"), None);
    }

    #[test]
    fn test_duplicate_child_name() {
        let (mut g, root) = graph_with_root();
        g.add_child(root, PrimId(1), "x", SchemaKind::Xform).unwrap();
        let err = g.add_child(root, PrimId(2), "x", SchemaKind::Xform).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
        assert_eq!(g.children_of(root).len(), 1);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let (mut g, root) = graph_with_root();
        let a = g.add_child(root, PrimId(1), "a", SchemaKind::Other).unwrap();
        let b = g.add_child(root, PrimId(2), "b", SchemaKind::Other).unwrap();
        assert!(root < a && a < b);
    }

    #[test]
    fn test_instance_delegation() {
        let (mut g, root) = graph_with_root();
        let master = g.add_child(root, PrimId(1), "master", SchemaKind::Mesh).unwrap();
        let inst = g.add_child(root, PrimId(2), "inst", SchemaKind::Mesh).unwrap();
        g.add_attribute(master, "foo", AttributeType::Float).unwrap();

        g.set_instanceable(master, true).unwrap();
        g.set_instance_of(inst, master).unwrap();

        assert_eq!(g.master_of(inst), Some(master));
        assert!(g.find_attribute(inst, "foo").is_some());

        // A local override shadows the master's attribute.
        let local = g.add_attribute(inst, "foo", AttributeType::Int).unwrap();
        assert_eq!(g.find_attribute(inst, "foo"), Some(local));
    }

    #[test]
    fn test_instance_cycle_rejected() {
        let (mut g, root) = graph_with_root();
        let parent = g.add_child(root, PrimId(1), "p", SchemaKind::Xform).unwrap();
        let child = g.add_child(parent, PrimId(2), "c", SchemaKind::Xform).unwrap();

        g.set_instanceable(child, true).unwrap();
        let err = g.set_instance_of(parent, child).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(g.node(parent).instancing, Instancing::Plain);
    }

    #[test]
    fn test_demote_master_rejected() {
        let (mut g, root) = graph_with_root();
        let master = g.add_child(root, PrimId(1), "m", SchemaKind::Mesh).unwrap();
        let inst = g.add_child(root, PrimId(2), "i", SchemaKind::Mesh).unwrap();
        g.set_instanceable(master, true).unwrap();
        g.set_instance_of(inst, master).unwrap();

        assert!(g.set_instanceable(master, false).is_err());
        assert_eq!(g.node(master).instancing, Instancing::Master);
    }

    #[test]
    fn test_variant_sets() {
        let (mut g, root) = graph_with_root();
        let s = g.add_child(root, PrimId(1), "s", SchemaKind::Other).unwrap();

        assert_eq!(g.create_variant_set(s, "lod"), Some(0));
        assert_eq!(g.create_variant_set(s, "lod"), None);
        assert_eq!(g.create_variant(s, 0, "high"), Some(0));
        assert_eq!(g.create_variant(s, 0, "low"), Some(1));
        assert_eq!(g.create_variant(s, 5, "x"), None);

        assert!(g.set_variant_selection(s, 0, 1));
        assert_eq!(g.node(s).variant_sets[0].selection, Some(1));

        // Out of range: selection unchanged.
        assert!(!g.set_variant_selection(s, 0, 9));
        assert!(!g.set_variant_selection(s, 3, 0));
        assert_eq!(g.node(s).variant_sets[0].selection, Some(1));

        assert_eq!(g.find_variant_set(s, "lod"), Some(0));
        assert_eq!(g.find_variant(s, 0, "high"), Some(0));
        assert_eq!(g.find_variant(s, 0, "nope"), None);
    }

    #[test]
    fn test_subtree_dirty() {
        let (mut g, root) = graph_with_root();
        let a = g.add_child(root, PrimId(1), "a", SchemaKind::Xform).unwrap();
        let b = g.add_child(a, PrimId(2), "b", SchemaKind::Mesh).unwrap();
        let c = g.add_child(root, PrimId(3), "c", SchemaKind::Mesh).unwrap();

        g.mark_subtree_dirty(a);
        assert!(g.node(a).needs_update);
        assert!(g.node(b).needs_update);
        assert!(!g.node(c).needs_update);
    }
}
