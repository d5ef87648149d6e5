use core::fmt;
use core::marker::PhantomData;

use tessera_region::{MeshRegion, MeshRegionView, Region, SubMeshRef, SubTreeRef};
use tessera_types::{ArchiveReader, ArchiveWriter, Table};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{EdgeKind, HierarchyKind, MeshSpec, MeshTopology, NodeKind, NodeRange, NodeRef};

/// The inline per-slot storage of one `(kind, level)` node range.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
#[repr(C)]
pub struct RangeStore {
    /// The first node id of the range.
    pub begin: u32,
    /// The first node id past the range.
    pub end: u32,
}

/// The closed representation of one region store: an interval of the
/// partition tree's contiguous reference table.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
#[repr(C)]
pub struct RegionSpan {
    /// The first reference of the region.
    pub offset: u64,
    /// The number of references.
    pub length: u64,
}

/// The region stores of an open or closed partition tree.
///
/// Open trees keep heap-owned regions and stay mutable; closing flattens
/// every region into one contiguous reference table, leaving `(offset,
/// length)` spans behind. A closed tree is read-only and memory-mappable.
enum RegionStores<'a> {
    Open(Vec<Option<MeshRegion>>),
    Closed {
        spans: Table<'a, RegionSpan>,
        refs: Table<'a, SubMeshRef>,
    },
}

/// A fixed-depth binary partition tree over the node-id spaces of a mesh.
///
/// Slots follow the Ahnentafel numbering: the root occupies slot 1, the
/// children of slot `i` occupy slots `2i` and `2i + 1`. Each slot stores,
/// per `(kind, level)`, one node range plus the forward/backward edge
/// closures and parent/child hierarchy closures used to derive data
/// dependencies of parallel traversals.
pub struct PartitionTree<'a, S: MeshSpec> {
    depth: u32,
    ranges: Table<'a, RangeStore>,
    stores: RegionStores<'a>,
    _spec: PhantomData<S>,
}

/// Region section indices within one `(slot, level)` record, in declaration
/// order: forward closures, backward closures, parent closures, child
/// closures.
const SECTION_FORWARD: usize = 0;
const SECTION_BACKWARD: usize = 1;
const SECTION_PARENT: usize = 2;
const SECTION_CHILD: usize = 3;

impl<S: MeshSpec> PartitionTree<'_, S> {
    /// Ranges per slot.
    const RANGES_PER_SLOT: usize = S::LEVELS * S::NUM_NODE_KINDS;

    /// Region stores per slot.
    const REGIONS_PER_SLOT: usize =
        S::LEVELS * 2 * (S::NUM_EDGE_KINDS + S::NUM_HIERARCHY_KINDS);

    /// Creates an open tree of the given depth with empty ranges and
    /// closures.
    pub fn new(depth: u32) -> Self {
        assert!(depth < 31, "partition depth exceeds the path word");

        let slots = Self::num_slots_for(depth);

        Self {
            depth,
            ranges: Table::filled(slots * Self::RANGES_PER_SLOT, RangeStore::default()),
            stores: RegionStores::Open(
                (0..slots * Self::REGIONS_PER_SLOT).map(|_| None).collect(),
            ),
            _spec: PhantomData,
        }
    }

    fn num_slots_for(depth: u32) -> usize {
        1usize << (depth + 1)
    }

    /// The depth of the tree; leaves live at this depth.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The number of slots, including the unused slot zero.
    pub fn num_slots(&self) -> usize {
        Self::num_slots_for(self.depth)
    }

    /// Returns `true` once the region stores are flattened.
    pub fn is_closed(&self) -> bool {
        matches!(self.stores, RegionStores::Closed { .. })
    }

    fn range_index(slot: usize, level: usize, kind: usize) -> usize {
        slot * Self::RANGES_PER_SLOT + level * S::NUM_NODE_KINDS + kind
    }

    fn region_index(slot: usize, level: usize, section: usize, kind: usize) -> usize {
        let (section_base, kinds) = match section {
            SECTION_FORWARD => (0, S::NUM_EDGE_KINDS),
            SECTION_BACKWARD => (S::NUM_EDGE_KINDS, S::NUM_EDGE_KINDS),
            SECTION_PARENT => (2 * S::NUM_EDGE_KINDS, S::NUM_HIERARCHY_KINDS),
            _ => (2 * S::NUM_EDGE_KINDS + S::NUM_HIERARCHY_KINDS, S::NUM_HIERARCHY_KINDS),
        };

        debug_assert!(kind < kinds);

        slot * Self::REGIONS_PER_SLOT
            + level * 2 * (S::NUM_EDGE_KINDS + S::NUM_HIERARCHY_KINDS)
            + section_base
            + kind
    }

    fn slot_of(&self, tree: SubTreeRef) -> usize {
        let slot = tree.index();

        assert!(slot < self.num_slots(), "sub-tree outside the partition tree");

        slot
    }

    /// The node range of `(K, L)` assigned to a sub-tree.
    pub fn node_range<K: NodeKind, const L: usize>(&self, tree: SubTreeRef) -> NodeRange<K, L> {
        let store = self.node_range_raw(tree, L, K::INDEX);

        NodeRange::new(NodeRef::new(store.begin), NodeRef::new(store.end))
    }

    /// The untyped node range of `(kind, level)` assigned to a sub-tree.
    pub fn node_range_raw(&self, tree: SubTreeRef, level: usize, kind: usize) -> RangeStore {
        self.ranges[Self::range_index(self.slot_of(tree), level, kind)]
    }

    /// Assigns the node range of `(K, L)` for a sub-tree.
    pub fn set_node_range<K: NodeKind, const L: usize>(
        &mut self,
        tree: SubTreeRef,
        range: NodeRange<K, L>,
    ) {
        self.set_node_range_raw(
            tree,
            L,
            K::INDEX,
            RangeStore {
                begin: range.begin().id(),
                end: range.end().id(),
            },
        );
    }

    /// Assigns the untyped node range of `(kind, level)` for a sub-tree.
    pub fn set_node_range_raw(
        &mut self,
        tree: SubTreeRef,
        level: usize,
        kind: usize,
        range: RangeStore,
    ) {
        assert!(!self.is_closed(), "mutating a closed partition tree");

        let idx = Self::range_index(self.slot_of(tree), level, kind);

        self.ranges.make_mut()[idx] = range;
    }

    fn region_view(&self, slot: usize, level: usize, section: usize, kind: usize) -> MeshRegionView<'_> {
        let idx = Self::region_index(slot, level, section, kind);

        match &self.stores {
            RegionStores::Open(regions) => MeshRegionView::new(
                regions[idx].as_ref().map_or(&[], |r| r.refs()),
            ),
            RegionStores::Closed { spans, refs } => {
                let span = spans[idx];

                MeshRegionView::new(
                    &refs[span.offset as usize..(span.offset + span.length) as usize],
                )
            }
        }
    }

    fn set_region(&mut self, slot: usize, level: usize, section: usize, kind: usize, region: MeshRegion) {
        let idx = Self::region_index(slot, level, section, kind);

        match &mut self.stores {
            RegionStores::Open(regions) => regions[idx] = Some(region),
            RegionStores::Closed { .. } => panic!("mutating a closed partition tree"),
        }
    }

    /// The forward-edge closure of `(E, L)` for a sub-tree: a superset of
    /// the sub-meshes reachable over `E` from the sub-tree's nodes.
    pub fn forward_closure<E: EdgeKind, const L: usize>(&self, tree: SubTreeRef) -> MeshRegionView<'_> {
        self.region_view(self.slot_of(tree), L, SECTION_FORWARD, E::INDEX)
    }

    /// Assigns the forward-edge closure of `(E, L)` for a sub-tree.
    pub fn set_forward_closure<E: EdgeKind, const L: usize>(
        &mut self,
        tree: SubTreeRef,
        region: MeshRegion,
    ) {
        self.set_region(self.slot_of(tree), L, SECTION_FORWARD, E::INDEX, region);
    }

    /// The backward-edge closure of `(E, L)` for a sub-tree.
    pub fn backward_closure<E: EdgeKind, const L: usize>(&self, tree: SubTreeRef) -> MeshRegionView<'_> {
        self.region_view(self.slot_of(tree), L, SECTION_BACKWARD, E::INDEX)
    }

    /// Assigns the backward-edge closure of `(E, L)` for a sub-tree.
    pub fn set_backward_closure<E: EdgeKind, const L: usize>(
        &mut self,
        tree: SubTreeRef,
        region: MeshRegion,
    ) {
        self.set_region(self.slot_of(tree), L, SECTION_BACKWARD, E::INDEX, region);
    }

    /// The parent closure of `(H, L)` for a sub-tree, stored on the child
    /// level.
    pub fn parent_closure<H: HierarchyKind, const L: usize>(&self, tree: SubTreeRef) -> MeshRegionView<'_> {
        self.region_view(self.slot_of(tree), L, SECTION_PARENT, H::INDEX)
    }

    /// Assigns the parent closure of `(H, L)` for a sub-tree.
    pub fn set_parent_closure<H: HierarchyKind, const L: usize>(
        &mut self,
        tree: SubTreeRef,
        region: MeshRegion,
    ) {
        self.set_region(self.slot_of(tree), L, SECTION_PARENT, H::INDEX, region);
    }

    /// The child closure of `(H, L)` for a sub-tree, stored on the parent
    /// level.
    pub fn child_closure<H: HierarchyKind, const L: usize>(&self, tree: SubTreeRef) -> MeshRegionView<'_> {
        self.region_view(self.slot_of(tree), L, SECTION_CHILD, H::INDEX)
    }

    /// Assigns the child closure of `(H, L)` for a sub-tree.
    pub fn set_child_closure<H: HierarchyKind, const L: usize>(
        &mut self,
        tree: SubTreeRef,
        region: MeshRegion,
    ) {
        self.set_region(self.slot_of(tree), L, SECTION_CHILD, H::INDEX, region);
    }

    /// Untyped closure assignment used by partitioners.
    pub(crate) fn set_region_raw(
        &mut self,
        tree: SubTreeRef,
        level: usize,
        section: usize,
        kind: usize,
        region: MeshRegion,
    ) {
        self.set_region(self.slot_of(tree), level, section, kind, region);
    }

    /// Visits every sub-tree down to the leaves in pre-order.
    pub fn visit_pre_order<F: FnMut(SubTreeRef)>(&self, mut body: F) {
        SubTreeRef::root().visit_pre_order(self.depth, &mut body);
    }

    /// Applies `body` to every node of `(K, L)` whose sub-tree is covered by
    /// `region`.
    pub fn scan_region<K: NodeKind, const L: usize, F: FnMut(NodeRef<K, L>)>(
        &self,
        region: &MeshRegion,
        mut body: F,
    ) {
        region.scan(|sub| {
            for node in self.node_range::<K, L>(sub).iter() {
                body(node);
            }
        });
    }

    /// Flattens every region store into one contiguous reference table,
    /// transitioning the tree into its closed, read-only state.
    pub fn close(&mut self) {
        let RegionStores::Open(regions) = &mut self.stores else {
            panic!("closing an already closed partition tree");
        };

        let total = regions
            .iter()
            .map(|r| r.as_ref().map_or(0, |r| r.refs().len()))
            .sum::<usize>();

        let mut refs = Vec::with_capacity(total);
        let mut spans = Vec::with_capacity(regions.len());

        for region in regions.iter_mut() {
            match region.take() {
                Some(region) => {
                    let offset = refs.len() as u64;

                    refs.extend_from_slice(region.refs());
                    spans.push(RegionSpan {
                        offset,
                        length: region.refs().len() as u64,
                    });
                }
                None => spans.push(RegionSpan::default()),
            }
        }

        tracing::debug!(
            depth = self.depth,
            references = refs.len(),
            "partition tree closed"
        );

        self.stores = RegionStores::Closed {
            spans: spans.into(),
            refs: refs.into(),
        };
    }

    /// Writes the closed tree: the depth, the reference count, and the
    /// three flattened tables.
    pub fn store(&self, writer: &mut ArchiveWriter) {
        let RegionStores::Closed { spans, refs } = &self.stores else {
            panic!("storing a non-closed partition tree");
        };

        writer.write_trivial(&(self.depth as u64));
        writer.write_trivial(&(refs.len() as u64));
        self.ranges.store(writer);
        spans.store(writer);
        refs.store(writer);
    }
}

impl<'a, S: MeshSpec> PartitionTree<'a, S> {
    /// Restores an owning closed tree from an archive.
    pub fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<PartitionTree<'static, S>> {
        let (depth, num_refs) = Self::read_header(reader)?;

        Self::validate(
            depth,
            num_refs,
            Table::load(reader)?,
            Table::load(reader)?,
            Table::load(reader)?,
        )
    }

    /// Reconstructs a closed tree in place, borrowing the reader's buffer.
    pub fn interpret(reader: &mut ArchiveReader<'a>) -> anyhow::Result<PartitionTree<'a, S>> {
        let (depth, num_refs) = Self::read_header(reader)?;

        Self::validate(
            depth,
            num_refs,
            Table::interpret(reader)?,
            Table::interpret(reader)?,
            Table::interpret(reader)?,
        )
    }

    fn read_header(reader: &mut ArchiveReader<'_>) -> anyhow::Result<(u32, u64)> {
        let depth = reader.read_trivial::<u64>()?;
        let num_refs = reader.read_trivial::<u64>()?;

        anyhow::ensure!(depth < 31, "unsupported layout; invalid partition depth {depth}");

        Ok((depth as u32, num_refs))
    }

    fn validate<'b>(
        depth: u32,
        num_refs: u64,
        ranges: Table<'b, RangeStore>,
        spans: Table<'b, RegionSpan>,
        refs: Table<'b, SubMeshRef>,
    ) -> anyhow::Result<PartitionTree<'b, S>> {
        let slots = Self::num_slots_for(depth);

        anyhow::ensure!(
            ranges.len() == slots * Self::RANGES_PER_SLOT
                && spans.len() == slots * Self::REGIONS_PER_SLOT
                && refs.len() == num_refs as usize,
            "unsupported layout; partition tree tables do not match the mesh shape"
        );

        anyhow::ensure!(
            spans
                .iter()
                .all(|s| s.offset.checked_add(s.length).is_some_and(|end| end <= num_refs)),
            "unsupported layout; region span outside the reference table"
        );

        Ok(PartitionTree {
            depth,
            ranges,
            stores: RegionStores::Closed { spans, refs },
            _spec: PhantomData,
        })
    }
}

impl<S: MeshSpec> PartialEq for PartitionTree<'_, S> {
    fn eq(&self, other: &Self) -> bool {
        if self.depth != other.depth || self.ranges != other.ranges {
            return false;
        }

        match (&self.stores, &other.stores) {
            (
                RegionStores::Closed { spans, refs },
                RegionStores::Closed {
                    spans: other_spans,
                    refs: other_refs,
                },
            ) => spans == other_spans && refs == other_refs,
            _ => false,
        }
    }
}

impl<S: MeshSpec> fmt::Debug for PartitionTree<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionTree")
            .field("depth", &self.depth)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A policy assigning node ranges and dependency closures to the partition
/// tree of a mesh.
pub trait Partitioner<S: MeshSpec> {
    /// Builds a closed partition tree of the given depth over a closed
    /// topology.
    fn partition(&self, topology: &MeshTopology<'_, S>, depth: u32) -> PartitionTree<'static, S>;
}

/// The default partitioner: splits every node-id space in halves along the
/// tree and over-approximates every closure with the full mesh region.
///
/// The closure contract only requires a superset of the true dependency
/// set, so the full region is always legal; tighter partitioners can refine
/// it based on the actual topology.
pub struct NaivePartitioner;

impl<S: MeshSpec> Partitioner<S> for NaivePartitioner {
    fn partition(&self, topology: &MeshTopology<'_, S>, depth: u32) -> PartitionTree<'static, S> {
        assert!(topology.is_closed(), "partitioning a non-closed topology");

        let mut tree = PartitionTree::<S>::new(depth);
        let root = SubTreeRef::root();

        assign_ranges(&mut tree, topology, depth);

        // every closure starts out as the full mesh region
        let full = MeshRegion::full();

        for level in 0..S::LEVELS {
            for kind in 0..S::NUM_EDGE_KINDS {
                root.visit_pre_order(depth, &mut |sub| {
                    tree.set_region_raw(sub, level, SECTION_FORWARD, kind, full.clone());
                    tree.set_region_raw(sub, level, SECTION_BACKWARD, kind, full.clone());
                });
            }
        }

        for level in 1..S::LEVELS {
            for kind in 0..S::NUM_HIERARCHY_KINDS {
                root.visit_pre_order(depth, &mut |sub| {
                    tree.set_region_raw(sub, level - 1, SECTION_PARENT, kind, full.clone());
                    tree.set_region_raw(sub, level, SECTION_CHILD, kind, full.clone());
                });
            }
        }

        tree.close();
        tree
    }
}

/// A partitioner deriving exact dependency closures from the closed
/// topology.
///
/// Node ranges are assigned as in [`NaivePartitioner`]. Every closure is
/// then computed bottom-up: a leaf's closure is the union of the leaf
/// sub-trees holding its actual link targets, and an inner sub-tree's
/// closure is the union of its children's. The result is the tightest
/// leaf-granular superset of the true dependency set.
pub struct TopologyPartitioner;

impl<S: MeshSpec> Partitioner<S> for TopologyPartitioner {
    fn partition(&self, topology: &MeshTopology<'_, S>, depth: u32) -> PartitionTree<'static, S> {
        assert!(topology.is_closed(), "partitioning a non-closed topology");

        let mut tree = PartitionTree::<S>::new(depth);

        assign_ranges(&mut tree, topology, depth);

        for level in 0..S::LEVELS {
            for (e, &(src_kind, trg_kind)) in S::EDGE_ENDPOINTS.iter().enumerate() {
                let forward = leaf_closures(
                    &tree,
                    depth,
                    (level, src_kind),
                    (level, trg_kind),
                    &mut |id, visit| {
                        for &t in topology.sinks_raw(level, e, id) {
                            visit(t);
                        }
                    },
                );
                let backward = leaf_closures(
                    &tree,
                    depth,
                    (level, trg_kind),
                    (level, src_kind),
                    &mut |id, visit| {
                        for &s in topology.sources_raw(level, e, id) {
                            visit(s);
                        }
                    },
                );

                apply_closures(&mut tree, depth, level, SECTION_FORWARD, e, forward);
                apply_closures(&mut tree, depth, level, SECTION_BACKWARD, e, backward);
            }
        }

        for level in 1..S::LEVELS {
            for (h, &(parent_kind, child_kind)) in S::HIERARCHY_ENDPOINTS.iter().enumerate() {
                let parents = leaf_closures(
                    &tree,
                    depth,
                    (level - 1, child_kind),
                    (level, parent_kind),
                    &mut |id, visit| {
                        if let Some(p) = topology.parent_raw(level, h, id) {
                            visit(p);
                        }
                    },
                );
                let children = leaf_closures(
                    &tree,
                    depth,
                    (level, parent_kind),
                    (level - 1, child_kind),
                    &mut |id, visit| {
                        for &c in topology.children_raw(level, h, id) {
                            visit(c);
                        }
                    },
                );

                apply_closures(&mut tree, depth, level - 1, SECTION_PARENT, h, parents);
                apply_closures(&mut tree, depth, level, SECTION_CHILD, h, children);
            }
        }

        tree.close();
        tree
    }
}

/// Assigns the recursive range halving of every `(kind, level)` node-id
/// space to an open tree.
fn assign_ranges<S: MeshSpec>(
    tree: &mut PartitionTree<'static, S>,
    topology: &MeshTopology<'_, S>,
    depth: u32,
) {
    let root = SubTreeRef::root();

    for level in 0..S::LEVELS {
        for kind in 0..S::NUM_NODE_KINDS {
            let num_nodes = topology.node_count_raw(kind, level) as u32;

            tree.set_node_range_raw(
                root,
                level,
                kind,
                RangeStore {
                    begin: 0,
                    end: num_nodes,
                },
            );

            root.visit_pre_order(depth, &mut |sub| {
                if sub.is_root() {
                    return;
                }

                let parent = tree.node_range_raw(sub.parent(), level, kind);
                let mid = parent.begin + (parent.end - parent.begin) / 2;

                let range = if sub.is_left_child() {
                    RangeStore {
                        begin: parent.begin,
                        end: mid,
                    }
                } else {
                    RangeStore {
                        begin: mid,
                        end: parent.end,
                    }
                };

                tree.set_node_range_raw(sub, level, kind, range);
            });
        }
    }
}

/// The leaf sub-tree whose `(level, kind)` range holds `id`, found by
/// descending along the halved ranges.
fn leaf_for<S: MeshSpec>(
    tree: &PartitionTree<'static, S>,
    depth: u32,
    level: usize,
    kind: usize,
    id: u32,
) -> SubTreeRef {
    let mut cur = SubTreeRef::root();

    while cur.depth() < depth {
        let left = cur.left();

        cur = if id < tree.node_range_raw(left, level, kind).end {
            left
        } else {
            cur.right()
        };
    }

    cur
}

/// Computes one closure per slot, bottom-up: leaves collect the leaf
/// sub-trees of their link targets, inner slots merge their children.
///
/// `iterated` names the `(level, kind)` space whose ranges are walked,
/// `linked` the space the link targets live in; `link` visits the target
/// ids of one node.
fn leaf_closures<S: MeshSpec>(
    tree: &PartitionTree<'static, S>,
    depth: u32,
    iterated: (usize, usize),
    linked: (usize, usize),
    link: &mut dyn FnMut(usize, &mut dyn FnMut(u32)),
) -> Vec<MeshRegion> {
    let mut regions = vec![MeshRegion::empty(); tree.num_slots()];

    SubTreeRef::root().visit_post_order(depth, &mut |sub| {
        let slot = sub.index();

        if sub.depth() == depth {
            let range = tree.node_range_raw(sub, iterated.0, iterated.1);
            let mut refs = Vec::new();

            for id in range.begin..range.end {
                link(id as usize, &mut |t| {
                    refs.push(leaf_for(tree, depth, linked.0, linked.1, t).into());
                });
            }

            regions[slot] = MeshRegion::from_refs(refs);
        } else {
            let merged = MeshRegion::merge(
                &regions[sub.left().index()],
                &regions[sub.right().index()],
            );

            regions[slot] = merged;
        }
    });

    regions
}

/// Moves the computed per-slot closures into the tree.
fn apply_closures<S: MeshSpec>(
    tree: &mut PartitionTree<'static, S>,
    depth: u32,
    level: usize,
    section: usize,
    kind: usize,
    mut regions: Vec<MeshRegion>,
) {
    SubTreeRef::root().visit_pre_order(depth, &mut |sub| {
        let region = core::mem::take(&mut regions[sub.index()]);

        tree.set_region_raw(sub, level, section, kind, region);
    });
}
