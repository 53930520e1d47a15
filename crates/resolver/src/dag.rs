//! The resolved dependency graph
//!
//! Immutable once built: one [`DgNode`] per resolved package, edges carrying
//! the original version constraint. Nodes and edges live in arenas and refer
//! to each other by index.

use dop_types::{AvailVersion, DepKind, OptionSet, PackageName, VersionSpec};

pub type NodeId = usize;
pub type EdgeId = usize;

/// One resolved package
#[derive(Debug, Clone)]
pub struct DgNode {
    pub name: PackageName,
    pub kind: DepKind,
    pub aver: AvailVersion,
    /// Recipe revision; absent for system packages and dub packages
    pub revision: Option<String>,
    /// Options bound to this package after the cascade
    pub options: OptionSet,
    /// Option keys with conflicting bindings left for the caller to settle
    pub option_conflicts: Vec<String>,
    pub down_edges: Vec<EdgeId>,
    pub up_edges: Vec<EdgeId>,
}

/// A dependency edge between two resolved packages
#[derive(Debug, Clone)]
pub struct DgEdge {
    pub up: NodeId,
    pub down: NodeId,
    pub spec: VersionSpec,
}

/// The full resolved graph
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    nodes: Vec<DgNode>,
    edges: Vec<DgEdge>,
    root: Option<NodeId>,
}

impl DepGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_node(
        &mut self,
        name: PackageName,
        kind: DepKind,
        aver: AvailVersion,
        revision: Option<String>,
        options: OptionSet,
        option_conflicts: Vec<String>,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(DgNode {
            name,
            kind,
            aver,
            revision,
            options,
            option_conflicts,
            down_edges: Vec::new(),
            up_edges: Vec::new(),
        });
        id
    }

    pub(crate) fn add_edge(&mut self, up: NodeId, down: NodeId, spec: VersionSpec) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(DgEdge { up, down, spec });
        self.nodes[up].down_edges.push(id);
        self.nodes[down].up_edges.push(id);
        id
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &DgNode {
        &self.nodes[id]
    }

    #[must_use]
    pub fn edge(&self, id: EdgeId) -> &DgEdge {
        &self.edges[id]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DgNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &DgEdge)> {
        self.edges.iter().enumerate()
    }

    /// Find a node by name and kind
    #[must_use]
    pub fn find(&self, name: &str, kind: DepKind) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name.as_str() == name && n.kind == kind)
    }

    /// Every dependency before its dependents; empty without a root
    ///
    /// Sibling order is deterministic and follows edge insertion order,
    /// which itself follows recipe-declared dependency order.
    #[must_use]
    pub fn traverse_bottom_up(&self) -> Vec<NodeId> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        self.post_order(root, &mut visited, &mut order);
        order
    }

    /// The root first, every node before its dependencies; empty without a
    /// root
    #[must_use]
    pub fn traverse_top_down(&self) -> Vec<NodeId> {
        let mut order = self.traverse_bottom_up();
        order.reverse();
        order
    }

    /// Transitive closure of a node's dependencies, bottom-up, the node
    /// itself excluded
    #[must_use]
    pub fn collect_dependencies(&self, node: NodeId) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        visited[node] = true;
        for &edge in &self.nodes[node].down_edges {
            self.post_order(self.edges[edge].down, &mut visited, &mut order);
        }
        order
    }

    fn post_order(&self, node: NodeId, visited: &mut [bool], order: &mut Vec<NodeId>) {
        if visited[node] {
            return;
        }
        visited[node] = true;
        for &edge in &self.nodes[node].down_edges {
            self.post_order(self.edges[edge].down, visited, order);
        }
        order.push(node);
    }
}
