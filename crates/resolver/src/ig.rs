//! The intermediate resolution graph and its phases
//!
//! Candidate versions of one package group into an `IgPack`; every
//! candidate is an `IgNode`; an `IgEdge` links a candidate to a downstream
//! pack under a version constraint. Sub-modules (`pkg:mod`) get their own
//! pack linked to a shared super-pack so all modules of one meta-package
//! settle on one version.

use crate::dag::DepGraph;
use crate::heuristics::Heuristics;
use crate::service::DepServices;
use dop_errors::{Error, ResolveError, Result};
use dop_profile::{BuildConfig, ResolveConfig};
use dop_recipe::Recipe;
use dop_types::{AvailVersion, DepKind, DepLocation, OptionSet, PackageName, VersionSpec};
use std::collections::HashMap;

type PackId = usize;
type NodeId = usize;
type EdgeId = usize;

struct IgPack {
    name: PackageName,
    kind: DepKind,
    super_pack: Option<PackId>,
    /// Available versions, cached once on the pack that owns them (the
    /// super-pack for modules)
    avail: Option<Vec<AvailVersion>>,
    /// Candidate nodes, sorted by `(version, location)`
    candidates: Vec<NodeId>,
    /// Option sets attached through dependency declarations on this pack
    options: Vec<OptionSet>,
    up_edges: Vec<EdgeId>,
    resolved: Option<NodeId>,
}

struct IgNode {
    pack: PackId,
    aver: AvailVersion,
    revision: Option<String>,
    down_edges: Vec<EdgeId>,
    prepared: bool,
}

struct IgEdge {
    up_node: NodeId,
    down_pack: PackId,
    spec: VersionSpec,
}

struct Ig {
    packs: Vec<IgPack>,
    nodes: Vec<IgNode>,
    edges: Vec<IgEdge>,
    pack_index: HashMap<(String, DepKind), PackId>,
    root_pack: PackId,
    root_node: NodeId,
}

/// Resolve with explicit control over candidate pre-filtering
///
/// With `pre_filter` off, every available version becomes a candidate and
/// the compatibility phase does all pruning; the outcome is identical, the
/// filter only trims work.
///
/// # Errors
///
/// See [`crate::resolve`].
pub async fn resolve_with(
    root: &Recipe,
    config: &BuildConfig,
    heuristics: &Heuristics,
    services: &mut DepServices,
    pre_filter: bool,
) -> Result<DepGraph> {
    let rc = config.resolve_config();
    let mut ig = Ig::new(root)?;
    ig.prepare(root, &rc, services, heuristics, pre_filter)
        .await?;
    ig.check_compat()?;
    ig.choose(root, heuristics, services).await?;
    let (node_options, node_conflicts) = ig.cascade_options(&config.options);
    Ok(ig.materialize(&node_options, &node_conflicts))
}

impl Ig {
    fn new(root: &Recipe) -> Result<Self> {
        let name = PackageName::new(root.name())?;
        let mut ig = Self {
            packs: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            pack_index: HashMap::new(),
            root_pack: 0,
            root_node: 0,
        };
        let root_pack = ig.create_pack(name, DepKind::Dop, None);
        let root_aver = AvailVersion::new(root.version(), DepLocation::Cache);
        let root_node = ig.create_node(root_pack, root_aver);
        ig.packs[root_pack].candidates.push(root_node);
        ig.root_pack = root_pack;
        ig.root_node = root_node;
        Ok(ig)
    }

    fn create_pack(
        &mut self,
        name: PackageName,
        kind: DepKind,
        super_pack: Option<PackId>,
    ) -> PackId {
        let id = self.packs.len();
        self.pack_index.insert((name.as_str().to_string(), kind), id);
        self.packs.push(IgPack {
            name,
            kind,
            super_pack,
            avail: None,
            candidates: Vec::new(),
            options: Vec::new(),
            up_edges: Vec::new(),
            resolved: None,
        });
        id
    }

    fn ensure_pack(&mut self, name: &PackageName, kind: DepKind) -> PackId {
        if let Some(&id) = self.pack_index.get(&(name.as_str().to_string(), kind)) {
            return id;
        }
        let super_pack = if name.is_module() {
            Some(self.ensure_pack(&name.super_name(), kind))
        } else {
            None
        };
        self.create_pack(name.clone(), kind, super_pack)
    }

    fn create_node(&mut self, pack: PackId, aver: AvailVersion) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(IgNode {
            pack,
            aver,
            revision: None,
            down_edges: Vec::new(),
            prepared: false,
        });
        id
    }

    /// Find or create the candidate of `pack` at `aver`; mirrors new
    /// candidates onto the super-pack so a version can be chosen there
    fn ensure_candidate(&mut self, pack: PackId, aver: &AvailVersion) -> NodeId {
        if let Some(&existing) = self.packs[pack]
            .candidates
            .iter()
            .find(|&&n| self.nodes[n].aver == *aver)
        {
            return existing;
        }
        let node = self.create_node(pack, aver.clone());
        self.insert_candidate(pack, node);

        if let Some(super_pack) = self.packs[pack].super_pack {
            let mirrored = self.packs[super_pack]
                .candidates
                .iter()
                .any(|&n| self.nodes[n].aver == *aver);
            if !mirrored {
                let mirror = self.create_node(super_pack, aver.clone());
                // version-choice only; never traversed for dependencies
                self.nodes[mirror].prepared = true;
                self.insert_candidate(super_pack, mirror);
            }
        }
        node
    }

    fn insert_candidate(&mut self, pack: PackId, node: NodeId) {
        self.packs[pack].candidates.push(node);
        let avers: Vec<(AvailVersion, NodeId)> = self.packs[pack]
            .candidates
            .iter()
            .map(|&n| (self.nodes[n].aver.clone(), n))
            .collect();
        let mut sorted = avers;
        sorted.sort();
        self.packs[pack].candidates = sorted.into_iter().map(|(_, n)| n).collect();
    }

    fn add_edge(&mut self, up_node: NodeId, down_pack: PackId, spec: VersionSpec) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(IgEdge {
            up_node,
            down_pack,
            spec,
        });
        self.nodes[up_node].down_edges.push(id);
        self.packs[down_pack].up_edges.push(id);
        id
    }

    async fn avail_of(&mut self, pack: PackId, services: &mut DepServices) -> Result<Vec<AvailVersion>> {
        let owner = self.packs[pack].super_pack.unwrap_or(pack);
        if self.packs[owner].avail.is_none() {
            let kind = self.packs[owner].kind;
            let name = self.packs[owner].name.clone();
            let avail = services.for_kind(kind).pack_avail_versions(&name).await?;
            self.packs[owner].avail = Some(avail);
        }
        Ok(self.packs[owner].avail.clone().unwrap_or_default())
    }

    /// Phase 1: walk dependency declarations and collect candidates
    async fn prepare(
        &mut self,
        root: &Recipe,
        rc: &ResolveConfig,
        services: &mut DepServices,
        heuristics: &Heuristics,
        pre_filter: bool,
    ) -> Result<()> {
        let mut work = vec![self.root_node];
        while let Some(node_id) = work.pop() {
            if self.nodes[node_id].prepared {
                continue;
            }
            self.nodes[node_id].prepared = true;
            // system candidates are leaves; their own dependencies are
            // assumed installed system-wide
            if self.nodes[node_id].aver.location.is_system() {
                continue;
            }

            let deps = if node_id == self.root_node {
                root.dependencies(rc)?
            } else {
                let pack = self.nodes[node_id].pack;
                let kind = self.packs[pack].kind;
                let name = self.packs[pack].name.clone();
                let aver = self.nodes[node_id].aver.clone();
                services
                    .for_kind(kind)
                    .pack_dependencies(rc, &name, &aver)
                    .await?
            };

            for dep in deps {
                let pack = self.ensure_pack(&dep.name, dep.kind);
                let avail = self.avail_of(pack, services).await?;
                if !dep.options.is_empty() {
                    self.packs[pack].options.push(dep.options.clone());
                }
                self.add_edge(node_id, pack, dep.spec.clone());
                for aver in &avail {
                    if pre_filter && !dep.spec.matches(&aver.version) {
                        continue;
                    }
                    if !heuristics.allow(dep.name.pkg_name(), aver) {
                        continue;
                    }
                    let candidate = self.ensure_candidate(pack, aver);
                    work.push(candidate);
                }
            }
        }
        Ok(())
    }

    /// Phase 2: iteratively drop candidates no upstream pack can accept
    fn check_compat(&mut self) -> Result<()> {
        loop {
            let mut changed = false;
            for pack_id in 0..self.packs.len() {
                if pack_id == self.root_pack || self.packs[pack_id].up_edges.is_empty() {
                    continue;
                }

                let mut up_packs: Vec<PackId> = self.packs[pack_id]
                    .up_edges
                    .iter()
                    .map(|&e| self.nodes[self.edges[e].up_node].pack)
                    .collect();
                up_packs.sort_unstable();
                up_packs.dedup();

                for candidate in self.packs[pack_id].candidates.clone() {
                    let version = self.nodes[candidate].aver.version.clone();
                    let survives = up_packs
                        .iter()
                        .all(|&up| self.acceptable_from(up, pack_id, &version));
                    if !survives {
                        self.remove_candidate(pack_id, candidate);
                        changed = true;
                    }
                }

                if self.packs[pack_id].candidates.is_empty()
                    && !self.packs[pack_id].up_edges.is_empty()
                {
                    return Err(self.unresolved_error(pack_id));
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    /// Does some candidate of `up` accept `version` in `pack` - either by
    /// having no dependency on `pack` at all, or through a matching edge?
    fn acceptable_from(&self, up: PackId, pack: PackId, version: &dop_types::Version) -> bool {
        self.packs[up].candidates.iter().any(|&u| {
            let mut has_edge_here = false;
            for &e in &self.nodes[u].down_edges {
                if self.edges[e].down_pack == pack {
                    has_edge_here = true;
                    if self.edges[e].spec.matches(version) {
                        return true;
                    }
                }
            }
            !has_edge_here
        })
    }

    fn remove_candidate(&mut self, pack: PackId, node: NodeId) {
        self.packs[pack].candidates.retain(|&n| n != node);
        for &edge in &self.nodes[node].down_edges.clone() {
            let down = self.edges[edge].down_pack;
            self.packs[down].up_edges.retain(|&e| e != edge);
        }
    }

    fn unresolved_error(&self, pack: PackId) -> Error {
        let mut requirements: Vec<String> = self.packs[pack]
            .up_edges
            .iter()
            .map(|&e| {
                let edge = &self.edges[e];
                let up_node = &self.nodes[edge.up_node];
                let up_pack = &self.packs[up_node.pack];
                format!(
                    "{}-{} requires {}",
                    up_pack.name, up_node.aver.version, edge.spec
                )
            })
            .collect();
        requirements.sort();
        requirements.dedup();
        ResolveError::UnresolvedDep {
            name: self.packs[pack].name.to_string(),
            requirements,
        }
        .into()
    }

    /// Phase 3: pick one candidate per pack, depth-first from the root
    async fn choose(
        &mut self,
        root: &Recipe,
        heuristics: &Heuristics,
        services: &mut DepServices,
    ) -> Result<()> {
        self.packs[self.root_pack].resolved = Some(self.root_node);
        self.nodes[self.root_node].revision = Some(root.revision()?);

        let mut stack = vec![self.root_node];
        while let Some(node_id) = stack.pop() {
            for edge in self.nodes[node_id].down_edges.clone() {
                let pack = self.edges[edge].down_pack;
                if self.packs[pack].resolved.is_some() {
                    continue;
                }
                let chosen = self.choose_for_pack(pack, heuristics)?;
                self.packs[pack].resolved = Some(chosen);

                let kind = self.packs[pack].kind;
                let aver = self.nodes[chosen].aver.clone();
                if kind == DepKind::Dop && !aver.location.is_system() {
                    let name = self.packs[pack].name.clone();
                    let recipe = services.dop.pack_recipe(&name, &aver, None).await?;
                    self.nodes[chosen].revision = Some(recipe.revision()?);
                }
                stack.push(chosen);
            }
        }
        Ok(())
    }

    fn choose_for_pack(&mut self, pack: PackId, heuristics: &Heuristics) -> Result<NodeId> {
        if let Some(super_pack) = self.packs[pack].super_pack {
            if self.packs[super_pack].resolved.is_none() {
                let chosen = self.choose_plain(super_pack, heuristics)?;
                self.packs[super_pack].resolved = Some(chosen);
            }
            let super_node = self.packs[super_pack].resolved.unwrap_or_default();
            let super_aver = self.nodes[super_node].aver.clone();

            // same (version, location) if present, same version otherwise
            let exact = self.packs[pack]
                .candidates
                .iter()
                .find(|&&n| self.nodes[n].aver == super_aver);
            let by_version = self.packs[pack]
                .candidates
                .iter()
                .find(|&&n| self.nodes[n].aver.version == super_aver.version);
            return exact.or(by_version).copied().ok_or_else(|| {
                ResolveError::ModuleWithoutSuper {
                    module: self.packs[pack].name.to_string(),
                    name: self.packs[super_pack].name.to_string(),
                }
                .into()
            });
        }
        self.choose_plain(pack, heuristics)
    }

    fn choose_plain(&self, pack: PackId, heuristics: &Heuristics) -> Result<NodeId> {
        let considered: Vec<AvailVersion> = self.packs[pack]
            .candidates
            .iter()
            .map(|&n| self.nodes[n].aver.clone())
            .collect();
        let choice = heuristics.choose_version(self.packs[pack].name.pkg_name(), &considered)?;
        self.packs[pack]
            .candidates
            .iter()
            .find(|&&n| self.nodes[n].aver == choice)
            .copied()
            .ok_or_else(|| Error::internal(format!("chosen candidate vanished from {pack}")))
    }

    /// Cascade option bindings down the resolved graph
    ///
    /// `remaining` accumulates everything still looking for its target
    /// package; whatever survives the traversal is reported unused.
    fn cascade_options(
        &self,
        caller: &OptionSet,
    ) -> (HashMap<NodeId, OptionSet>, HashMap<NodeId, Vec<String>>) {
        let mut remaining = caller.clone();
        let mut remaining_conflicts: Vec<String> = Vec::new();
        let mut node_options: HashMap<NodeId, OptionSet> = HashMap::new();
        let mut node_conflicts: HashMap<NodeId, Vec<String>> = HashMap::new();

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![self.root_node];
        while let Some(node_id) = stack.pop() {
            if visited[node_id] {
                continue;
            }
            visited[node_id] = true;

            let pack = &self.packs[self.nodes[node_id].pack];
            let name = pack.name.pkg_name().to_string();
            let mut options = OptionSet::new();
            let mut conflicts = Vec::new();

            let pulled = if node_id == self.root_node {
                let pulled = remaining.for_root();
                remaining = remaining
                    .iter()
                    .filter(|(k, _)| k.contains('/'))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                pulled
            } else {
                let pulled = remaining.for_dependency(&name);
                remaining = remaining.not_for(&name);
                pulled
            };
            // conflicts recorded while a key sat in the accumulator follow
            // the key to its target package
            for key in pulled.keys() {
                let qualified = if node_id == self.root_node {
                    key.to_string()
                } else {
                    format!("{name}/{key}")
                };
                if let Some(pos) = remaining_conflicts.iter().position(|c| *c == qualified) {
                    remaining_conflicts.remove(pos);
                    conflicts.push(key.to_string());
                }
            }
            options.merge_from(&pulled, &mut conflicts);

            for attached in &pack.options {
                options.merge_from(&attached.for_root(), &mut conflicts);
                options.merge_from(&attached.for_dependency(&name), &mut conflicts);
                let onward: OptionSet = attached
                    .not_for(&name)
                    .iter()
                    .filter(|(k, _)| k.contains('/'))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                remaining.merge_from(&onward, &mut remaining_conflicts);
            }

            if !options.is_empty() {
                node_options.insert(node_id, options);
            }
            if !conflicts.is_empty() {
                // an error only once a build actually needs the option
                tracing::warn!(
                    package = %pack.name,
                    keys = ?conflicts,
                    "conflicting option bindings; pass an explicit value to settle them"
                );
                node_conflicts.insert(node_id, conflicts);
            }

            for &edge in self.nodes[node_id].down_edges.iter().rev() {
                if let Some(next) = self.packs[self.edges[edge].down_pack].resolved {
                    stack.push(next);
                }
            }
        }

        if !remaining.is_empty() {
            let unused: Vec<&str> = remaining.keys().collect();
            tracing::warn!(options = ?unused, "options were not used by any resolved package");
        }
        (node_options, node_conflicts)
    }

    /// Phase 4: freeze the chosen nodes into an immutable graph
    fn materialize(
        &self,
        node_options: &HashMap<NodeId, OptionSet>,
        node_conflicts: &HashMap<NodeId, Vec<String>>,
    ) -> DepGraph {
        let mut graph = DepGraph::new();
        let mut mapping: HashMap<NodeId, crate::dag::NodeId> = HashMap::new();

        let mut stack = vec![self.root_node];
        let mut order = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        while let Some(node_id) = stack.pop() {
            if seen[node_id] {
                continue;
            }
            seen[node_id] = true;
            order.push(node_id);
            for &edge in self.nodes[node_id].down_edges.iter().rev() {
                if let Some(next) = self.packs[self.edges[edge].down_pack].resolved {
                    stack.push(next);
                }
            }
        }

        for &node_id in &order {
            let node = &self.nodes[node_id];
            let pack = &self.packs[node.pack];
            let dg_id = graph.add_node(
                pack.name.clone(),
                pack.kind,
                node.aver.clone(),
                node.revision.clone(),
                node_options.get(&node_id).cloned().unwrap_or_default(),
                node_conflicts.get(&node_id).cloned().unwrap_or_default(),
            );
            mapping.insert(node_id, dg_id);
        }

        for &node_id in &order {
            let up = mapping[&node_id];
            for &edge in &self.nodes[node_id].down_edges {
                let Some(down_ig) = self.packs[self.edges[edge].down_pack].resolved else {
                    continue;
                };
                let down = mapping[&down_ig];
                graph.add_edge(up, down, self.edges[edge].spec.clone());
            }
        }

        graph.set_root(mapping[&self.root_node]);
        graph
    }
}
