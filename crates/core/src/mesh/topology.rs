use core::marker::PhantomData;

use tessera_types::{ArchiveReader, ArchiveWriter, Table};

use crate::{cast_refs, EdgeKind, HierarchyKind, MeshSpec, NodeId, NodeKind, NodeRange, NodeRef};

/// Sentinel id marking a child without an assigned parent.
pub const NO_PARENT: NodeId = NodeId::MAX;

/// The staged or CSR-materialized links of one edge kind on one level.
#[derive(Default, Clone, PartialEq)]
struct EdgeData<'a> {
    staged: Vec<(NodeId, NodeId)>,
    forward_offsets: Table<'a, u32>,
    forward_targets: Table<'a, NodeId>,
    backward_offsets: Table<'a, u32>,
    backward_targets: Table<'a, NodeId>,
}

/// The staged or CSR-materialized links of one hierarchy kind between one
/// level and the level below.
#[derive(Default, Clone, PartialEq)]
struct HierarchyData<'a> {
    staged_children: Vec<Vec<NodeId>>,
    staged_parents: Vec<NodeId>,
    parent_targets: Table<'a, NodeId>,
    children_offsets: Table<'a, u32>,
    children_targets: Table<'a, NodeId>,
}

#[derive(Default, Clone, PartialEq)]
struct LevelData<'a> {
    node_counts: Vec<u64>,
    edges: Vec<EdgeData<'a>>,
    hierarchies: Vec<HierarchyData<'a>>,
}

/// The topological data of a mesh: per level, the node counts of every node
/// kind, the typed forward/backward edge CSRs, and the parent/children CSRs
/// of every hierarchy kind.
///
/// The store is built by staging links and then [`MeshTopology::close`]d
/// exactly once; queries require a closed store, mutation an open one.
pub struct MeshTopology<'a, S: MeshSpec> {
    levels: Vec<LevelData<'a>>,
    closed: bool,
    _spec: PhantomData<S>,
}

impl<S: MeshSpec> Default for MeshTopology<'_, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MeshSpec> MeshTopology<'_, S> {
    /// Creates an empty open topology.
    pub fn new() -> Self {
        debug_assert_eq!(S::EDGE_ENDPOINTS.len(), S::NUM_EDGE_KINDS);
        debug_assert_eq!(S::HIERARCHY_ENDPOINTS.len(), S::NUM_HIERARCHY_KINDS);

        let levels = (0..S::LEVELS)
            .map(|level| LevelData {
                node_counts: vec![0; S::NUM_NODE_KINDS],
                edges: (0..S::NUM_EDGE_KINDS).map(|_| EdgeData::default()).collect(),
                hierarchies: if level == 0 {
                    Vec::new()
                } else {
                    (0..S::NUM_HIERARCHY_KINDS)
                        .map(|_| HierarchyData::default())
                        .collect()
                },
            })
            .collect();

        Self {
            levels,
            closed: false,
            _spec: PhantomData,
        }
    }

    /// Returns `true` once the staging data has been materialized.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The number of nodes of kind `K` on level `L`.
    pub fn node_count<K: NodeKind, const L: usize>(&self) -> usize {
        self.node_count_raw(K::INDEX, L)
    }

    /// The number of nodes of the kind at `kind` on `level`.
    pub fn node_count_raw(&self, kind: usize, level: usize) -> usize {
        self.levels[level].node_counts[kind] as usize
    }

    /// Creates one new node of kind `K` on level `L`.
    pub fn create<K: NodeKind, const L: usize>(&mut self) -> NodeRef<K, L> {
        self.create_many::<K, L>(1).begin()
    }

    /// Creates `num` new nodes of kind `K` on level `L`.
    pub fn create_many<K: NodeKind, const L: usize>(&mut self, num: u32) -> NodeRange<K, L> {
        assert!(!self.closed, "mutating a closed topology");
        assert!(L < S::LEVELS, "level {L} outside the mesh hierarchy");

        let counter = &mut self.levels[L].node_counts[K::INDEX];
        let begin = *counter as NodeId;

        *counter += num as u64;

        NodeRange::new(NodeRef::new(begin), NodeRef::new(begin + num))
    }

    /// Stages an edge of kind `E` on level `L`.
    pub fn add_edge<E: EdgeKind, const L: usize>(
        &mut self,
        src: NodeRef<E::Src, L>,
        trg: NodeRef<E::Trg, L>,
    ) {
        assert!(!self.closed, "mutating a closed topology");
        assert!(L < S::LEVELS, "level {L} outside the mesh hierarchy");
        debug_assert_eq!(
            S::EDGE_ENDPOINTS[E::INDEX],
            (E::Src::INDEX, E::Trg::INDEX),
            "edge endpoint registry out of sync"
        );

        self.levels[L].edges[E::INDEX].staged.push((src.id(), trg.id()));
    }

    /// Stages a parent/child link of kind `H` between levels `PL` and `CL`.
    ///
    /// Duplicate links are ignored; assigning a second parent to a child is
    /// a contract violation.
    pub fn add_child<H: HierarchyKind, const PL: usize, const CL: usize>(
        &mut self,
        parent: NodeRef<H::Parent, PL>,
        child: NodeRef<H::Child, CL>,
    ) {
        assert!(!self.closed, "mutating a closed topology");
        assert!(PL < S::LEVELS, "level {PL} outside the mesh hierarchy");
        assert!(CL + 1 == PL, "hierarchies connect adjacent levels only");
        assert!(parent.id() != NO_PARENT, "reserved parent id");

        let data = &mut self.levels[PL].hierarchies[H::INDEX];

        if data.staged_children.len() <= parent.ordinal() {
            data.staged_children.resize(parent.ordinal() + 1, Vec::new());
        }

        let list = &mut data.staged_children[parent.ordinal()];

        if list.contains(&child.id()) {
            return;
        }

        list.push(child.id());

        if data.staged_parents.len() <= child.ordinal() {
            data.staged_parents.resize(child.ordinal() + 1, NO_PARENT);
        }

        let slot = &mut data.staged_parents[child.ordinal()];

        assert!(
            *slot == NO_PARENT || *slot == parent.id(),
            "double assignment of a parent for child {child:?}"
        );

        *slot = parent.id();
    }

    /// Materializes every staged link into forward/backward CSRs and
    /// parent/children tables, emptying the staging storage.
    ///
    /// Closing is a one-shot transition; a second call is a contract
    /// violation.
    pub fn close(&mut self) {
        assert!(!self.closed, "closing an already closed topology");

        for level in 0..S::LEVELS {
            for (e, &(src_kind, trg_kind)) in S::EDGE_ENDPOINTS.iter().enumerate() {
                let num_src = self.node_count_raw(src_kind, level);
                let num_trg = self.node_count_raw(trg_kind, level);
                let edge = &mut self.levels[level].edges[e];

                let staged = core::mem::take(&mut edge.staged);

                let (fwd_off, fwd_trg) =
                    build_csr(num_src, staged.len(), staged.iter().copied());
                let (bwd_off, bwd_trg) =
                    build_csr(num_trg, staged.len(), staged.iter().map(|&(s, t)| (t, s)));

                edge.forward_offsets = fwd_off.into();
                edge.forward_targets = fwd_trg.into();
                edge.backward_offsets = bwd_off.into();
                edge.backward_targets = bwd_trg.into();

                tracing::debug!(level, kind = e, links = staged.len(), "edge set closed");
            }

            if level == 0 {
                continue;
            }

            for (h, &(parent_kind, child_kind)) in S::HIERARCHY_ENDPOINTS.iter().enumerate() {
                let num_parents = self.node_count_raw(parent_kind, level);
                let num_children = self.node_count_raw(child_kind, level - 1);
                let data = &mut self.levels[level].hierarchies[h];

                let children = core::mem::take(&mut data.staged_children);
                let parents = core::mem::take(&mut data.staged_parents);

                let links = children
                    .iter()
                    .enumerate()
                    .flat_map(|(p, list)| list.iter().map(move |&c| (p as NodeId, c)));
                let total = children.iter().map(Vec::len).sum();

                let (offsets, targets) = build_csr(num_parents, total, links);

                data.children_offsets = offsets.into();
                data.children_targets = targets.into();
                data.parent_targets = (0..num_children)
                    .map(|c| parents.get(c).copied().unwrap_or(NO_PARENT))
                    .collect::<Vec<_>>()
                    .into();

                tracing::debug!(level, kind = h, links = total, "hierarchy set closed");
            }
        }

        self.closed = true;
    }

    /// The untyped sink ids of the edge kind at `kind` leaving node `id`.
    pub(crate) fn sinks_raw(&self, level: usize, kind: usize, id: usize) -> &[NodeId] {
        let edge = &self.levels[level].edges[kind];

        csr_ids(&edge.forward_offsets, &edge.forward_targets, id)
    }

    /// The untyped source ids of the edge kind at `kind` arriving at `id`.
    pub(crate) fn sources_raw(&self, level: usize, kind: usize, id: usize) -> &[NodeId] {
        let edge = &self.levels[level].edges[kind];

        csr_ids(&edge.backward_offsets, &edge.backward_targets, id)
    }

    /// The untyped child ids of the hierarchy kind at `kind` below parent
    /// `id` on `level`.
    pub(crate) fn children_raw(&self, level: usize, kind: usize, id: usize) -> &[NodeId] {
        let data = &self.levels[level].hierarchies[kind];

        csr_ids(&data.children_offsets, &data.children_targets, id)
    }

    /// The untyped parent id of child `id` under the hierarchy kind at
    /// `kind` on `level`.
    pub(crate) fn parent_raw(&self, level: usize, kind: usize, id: usize) -> Option<NodeId> {
        let data = &self.levels[level].hierarchies[kind];
        let parent = *data.parent_targets.get(id)?;

        (parent != NO_PARENT).then_some(parent)
    }

    /// The targets of the edges of kind `E` leaving `src`.
    pub fn sinks<E: EdgeKind, const L: usize>(
        &self,
        src: NodeRef<E::Src, L>,
    ) -> &[NodeRef<E::Trg, L>] {
        assert!(self.closed, "querying a non-closed topology");

        let edge = &self.levels[L].edges[E::INDEX];

        csr_slice(&edge.forward_offsets, &edge.forward_targets, src.ordinal())
    }

    /// The sources of the edges of kind `E` arriving at `trg`.
    pub fn sources<E: EdgeKind, const L: usize>(
        &self,
        trg: NodeRef<E::Trg, L>,
    ) -> &[NodeRef<E::Src, L>] {
        assert!(self.closed, "querying a non-closed topology");

        let edge = &self.levels[L].edges[E::INDEX];

        csr_slice(&edge.backward_offsets, &edge.backward_targets, trg.ordinal())
    }

    /// The children of `parent` along hierarchy kind `H`.
    pub fn children<H: HierarchyKind, const PL: usize, const CL: usize>(
        &self,
        parent: NodeRef<H::Parent, PL>,
    ) -> &[NodeRef<H::Child, CL>] {
        assert!(self.closed, "querying a non-closed topology");
        assert!(CL + 1 == PL, "hierarchies connect adjacent levels only");

        let data = &self.levels[PL].hierarchies[H::INDEX];

        csr_slice(&data.children_offsets, &data.children_targets, parent.ordinal())
    }

    /// The parent of `child` along hierarchy kind `H`, if one was assigned.
    pub fn parent<H: HierarchyKind, const CL: usize, const PL: usize>(
        &self,
        child: NodeRef<H::Child, CL>,
    ) -> Option<NodeRef<H::Parent, PL>> {
        assert!(self.closed, "querying a non-closed topology");
        assert!(CL + 1 == PL, "hierarchies connect adjacent levels only");

        let data = &self.levels[PL].hierarchies[H::INDEX];
        let id = *data.parent_targets.get(child.ordinal())?;

        (id != NO_PARENT).then(|| NodeRef::new(id))
    }

    /// Writes the closed topology: per level the node counts, then the edge
    /// CSRs (forward, then backward), then the hierarchy tables.
    pub fn store(&self, writer: &mut ArchiveWriter) {
        assert!(self.closed, "storing a non-closed topology");

        for level in &self.levels {
            for count in &level.node_counts {
                writer.write_trivial(count);
            }

            for edge in &level.edges {
                edge.forward_offsets.store(writer);
                edge.forward_targets.store(writer);
                edge.backward_offsets.store(writer);
                edge.backward_targets.store(writer);
            }

            for data in &level.hierarchies {
                data.parent_targets.store(writer);
                data.children_offsets.store(writer);
                data.children_targets.store(writer);
            }
        }
    }
}

impl<'a, S: MeshSpec> MeshTopology<'a, S> {
    /// Restores an owning closed topology from an archive.
    pub fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<MeshTopology<'static, S>> {
        restore(reader, &mut |r| Table::load(r), &mut |r| Table::load(r))
    }

    /// Reconstructs a closed topology in place, borrowing the reader's
    /// buffer for every table.
    pub fn interpret(reader: &mut ArchiveReader<'a>) -> anyhow::Result<MeshTopology<'a, S>> {
        restore(reader, &mut |r| Table::interpret(r), &mut |r| {
            Table::interpret(r)
        })
    }
}

/// Rebuilds a closed topology from a stream, with the table reconstruction
/// policy (owning load or zero-copy interpret) injected by the caller.
fn restore<'buf, 'b, S: MeshSpec>(
    reader: &mut ArchiveReader<'buf>,
    offsets: &mut dyn FnMut(&mut ArchiveReader<'buf>) -> anyhow::Result<Table<'b, u32>>,
    targets: &mut dyn FnMut(&mut ArchiveReader<'buf>) -> anyhow::Result<Table<'b, NodeId>>,
) -> anyhow::Result<MeshTopology<'b, S>> {
    let mut res = MeshTopology::<S> {
        levels: Vec::with_capacity(S::LEVELS),
        closed: true,
        _spec: PhantomData,
    };

    for level in 0..S::LEVELS {
        let mut data = LevelData {
            node_counts: Vec::with_capacity(S::NUM_NODE_KINDS),
            edges: Vec::with_capacity(S::NUM_EDGE_KINDS),
            hierarchies: Vec::new(),
        };

        for _ in 0..S::NUM_NODE_KINDS {
            data.node_counts.push(reader.read_trivial()?);
        }

        for _ in 0..S::NUM_EDGE_KINDS {
            data.edges.push(EdgeData {
                staged: Vec::new(),
                forward_offsets: offsets(reader)?,
                forward_targets: targets(reader)?,
                backward_offsets: offsets(reader)?,
                backward_targets: targets(reader)?,
            });
        }

        if level > 0 {
            for _ in 0..S::NUM_HIERARCHY_KINDS {
                data.hierarchies.push(HierarchyData {
                    staged_children: Vec::new(),
                    staged_parents: Vec::new(),
                    parent_targets: targets(reader)?,
                    children_offsets: offsets(reader)?,
                    children_targets: targets(reader)?,
                });
            }
        }

        res.levels.push(data);
    }

    Ok(res)
}

impl<S: MeshSpec> PartialEq for MeshTopology<'_, S> {
    fn eq(&self, other: &Self) -> bool {
        self.closed == other.closed && self.levels == other.levels
    }
}

/// Builds a CSR from an edge list: counts per source, exclusive prefix sums,
/// then target placement.
fn build_csr(
    num_sources: usize,
    num_links: usize,
    links: impl Iterator<Item = (NodeId, NodeId)> + Clone,
) -> (Vec<u32>, Vec<NodeId>) {
    let mut offsets = vec![0u32; num_sources + 1];

    for (s, _) in links.clone() {
        offsets[s as usize] += 1;
    }

    sum_prefixes(&mut offsets);

    let mut cursor = offsets.clone();
    let mut targets = vec![0 as NodeId; num_links];

    for (s, t) in links {
        targets[cursor[s as usize] as usize] = t;
        cursor[s as usize] += 1;
    }

    (offsets, targets)
}

/// Turns per-index counts into exclusive prefix sums; the last entry becomes
/// the total.
fn sum_prefixes(list: &mut [u32]) {
    let mut counter = 0;

    for cur in list {
        let tmp = *cur;

        *cur = counter;
        counter += tmp;
    }
}

/// The CSR row of `ordinal`, empty for ids outside the offset table.
fn csr_ids<'t>(
    offsets: &'t Table<'_, u32>,
    targets: &'t Table<'_, NodeId>,
    ordinal: usize,
) -> &'t [NodeId] {
    if ordinal + 1 >= offsets.len() || targets.is_empty() {
        return &[];
    }

    &targets[offsets[ordinal] as usize..offsets[ordinal + 1] as usize]
}

/// The typed CSR row of `ordinal`.
fn csr_slice<'t, K: NodeKind, const L: usize>(
    offsets: &'t Table<'_, u32>,
    targets: &'t Table<'_, NodeId>,
    ordinal: usize,
) -> &'t [NodeRef<K, L>] {
    cast_refs(csr_ids(offsets, targets, ordinal))
}
