use std::sync::atomic::{AtomicU32, Ordering};

use tessera::{
    EdgeKind, Fragment, HierarchyKind, Mesh, MeshBuilder, MeshDataFragment, MeshSpec, NodeKind,
    NodeRef, TopologyPartitioner,
};
use tessera_region::{MeshRegion, SubTreeRef};
use tessera_types::ArchiveWriter;

/// A one-dimensional bar of cells on two refinement levels.
struct Cell;

impl NodeKind for Cell {
    const INDEX: usize = 0;
}

/// Left-to-right connectivity between neighboring cells.
struct Link;

impl EdgeKind for Link {
    type Src = Cell;
    type Trg = Cell;

    const INDEX: usize = 0;
}

/// The refinement relation between a coarse cell and its fine cells.
struct Refine;

impl HierarchyKind for Refine {
    type Parent = Cell;
    type Child = Cell;

    const INDEX: usize = 0;
}

struct BarSpec;

impl MeshSpec for BarSpec {
    const LEVELS: usize = 2;
    const NUM_NODE_KINDS: usize = 1;
    const NUM_EDGE_KINDS: usize = 1;
    const NUM_HIERARCHY_KINDS: usize = 1;

    const EDGE_ENDPOINTS: &'static [(usize, usize)] = &[(0, 0)];
    const HIERARCHY_ENDPOINTS: &'static [(usize, usize)] = &[(0, 0)];
}

/// Builds a bar of `n` fine cells under `n / 2` coarse cells, linked
/// left-to-right on the fine level.
fn build_bar(n: u32, depth: u32) -> Mesh<'static, BarSpec> {
    let mut builder = MeshBuilder::<BarSpec>::new();

    let fine = builder.create_many::<Cell, 0>(n);
    let coarse = builder.create_many::<Cell, 1>(n / 2);

    for i in 0..n.saturating_sub(1) as usize {
        builder.link::<Link, 0>(fine.at(i), fine.at(i + 1));
    }

    for i in 0..(n / 2) as usize {
        builder.link_parent_child::<Refine, 1, 0>(coarse.at(i), fine.at(2 * i));
        builder.link_parent_child::<Refine, 1, 0>(coarse.at(i), fine.at(2 * i + 1));
    }

    builder.build(depth)
}

#[test]
fn root_partition_covers_all_nodes() {
    let mesh = build_bar(10, 0);
    let range = mesh.partition_tree().node_range::<Cell, 0>(SubTreeRef::root());

    assert_eq!(range.begin().id(), 0);
    assert_eq!(range.end().id(), 10);
}

#[test]
fn depth_two_partition_splits_into_disjoint_leaves() {
    let mesh = build_bar(10, 2);
    let tree = mesh.partition_tree();

    let root = SubTreeRef::root();
    let leaves = [
        root.left().left(),
        root.left().right(),
        root.right().left(),
        root.right().right(),
    ];

    let ranges: Vec<(u32, u32)> = leaves
        .iter()
        .map(|&leaf| {
            let r = tree.node_range::<Cell, 0>(leaf);

            (r.begin().id(), r.end().id())
        })
        .collect();

    assert_eq!(ranges, vec![(0, 2), (2, 5), (5, 7), (7, 10)]);

    // the union covers every node exactly once
    let mut seen = vec![0u32; 10];

    for &leaf in &leaves {
        for node in tree.node_range::<Cell, 0>(leaf).iter() {
            seen[node.ordinal()] += 1;
        }
    }

    assert!(seen.iter().all(|&c| c == 1));
}

#[test]
fn edge_queries_follow_the_chain() {
    let mesh = build_bar(6, 1);

    let sinks = mesh.sinks::<Link, 0>(NodeRef::new(2));

    assert_eq!(sinks, &[NodeRef::<Cell, 0>::new(3)]);
    assert_eq!(mesh.neighbor::<Link, 0>(NodeRef::new(2)), NodeRef::new(3));

    let sources = mesh.sources::<Link, 0>(NodeRef::new(3));

    assert_eq!(sources, &[NodeRef::<Cell, 0>::new(2)]);

    // boundary cells
    assert!(mesh.sources::<Link, 0>(NodeRef::new(0)).is_empty());
    assert!(mesh.sinks::<Link, 0>(NodeRef::new(5)).is_empty());
}

#[test]
fn hierarchy_queries_resolve_parents_and_children() {
    let mesh = build_bar(8, 1);

    let children = mesh.children::<Refine, 1, 0>(NodeRef::new(1));

    assert_eq!(children, &[NodeRef::<Cell, 0>::new(2), NodeRef::new(3)]);

    for i in 0..8u32 {
        let parent = mesh.parent::<Refine, 0, 1>(NodeRef::new(i));

        assert_eq!(parent, Some(NodeRef::<Cell, 1>::new(i / 2)));
    }
}

#[test]
fn closures_are_supersets_of_the_true_dependencies() {
    let mesh = build_bar(16, 2);
    let tree = mesh.partition_tree();

    let mut leaves = Vec::new();

    tree.visit_pre_order(|sub| {
        if sub.depth() == tree.depth() {
            leaves.push(sub);
        }
    });

    for &leaf in &leaves {
        // collect the node ids spanned by the backward closure
        let mut covered = std::collections::HashSet::new();

        tree.backward_closure::<Link, 0>(leaf).scan(|sub| {
            for node in tree.node_range::<Cell, 0>(sub).iter() {
                covered.insert(node.id());
            }
        });

        for node in tree.node_range::<Cell, 0>(leaf).iter() {
            for source in mesh.sources::<Link, 0>(node) {
                assert!(covered.contains(&source.id()));
            }
        }
    }
}

/// Builds the same bar with topology-derived closures instead of the naive
/// full-region over-approximation.
fn build_bar_with_tight_closures(n: u32, depth: u32) -> Mesh<'static, BarSpec> {
    let mut builder = MeshBuilder::<BarSpec>::new();

    let fine = builder.create_many::<Cell, 0>(n);
    let coarse = builder.create_many::<Cell, 1>(n / 2);

    for i in 0..n.saturating_sub(1) as usize {
        builder.link::<Link, 0>(fine.at(i), fine.at(i + 1));
    }

    for i in 0..(n / 2) as usize {
        builder.link_parent_child::<Refine, 1, 0>(coarse.at(i), fine.at(2 * i));
        builder.link_parent_child::<Refine, 1, 0>(coarse.at(i), fine.at(2 * i + 1));
    }

    builder.build_with(&TopologyPartitioner, depth)
}

/// The fine node ids spanned by a closure region.
fn covered_ids(
    tree: &tessera::PartitionTree<'_, BarSpec>,
    closure: tessera_region::MeshRegionView<'_>,
    level: usize,
) -> std::collections::BTreeSet<u32> {
    let mut covered = std::collections::BTreeSet::new();

    closure.scan(|sub| {
        let range = tree.node_range_raw(sub, level, 0);

        covered.extend(range.begin..range.end);
    });

    covered
}

#[test]
fn derived_edge_closures_are_tight_and_sufficient() {
    // 16 fine cells, depth 2: leaves [0,4) [4,8) [8,12) [12,16)
    let mesh = build_bar_with_tight_closures(16, 2);
    let tree = mesh.partition_tree();

    let leaf = SubTreeRef::root().right().left();

    // nodes 8..12 read their predecessors 7..11, living in the two middle
    // leaves only
    let backward = covered_ids(tree, tree.backward_closure::<Link, 0>(leaf), 0);

    assert_eq!(backward, (4..12).collect());

    // the closure stays a superset of the true dependencies
    for node in tree.node_range::<Cell, 0>(leaf).iter() {
        for source in mesh.sources::<Link, 0>(node) {
            assert!(backward.contains(&source.id()));
        }
    }

    // boundary leaf: nodes 0..4 write into 1..5
    let forward = covered_ids(
        tree,
        tree.forward_closure::<Link, 0>(SubTreeRef::root().left().left()),
        0,
    );

    assert_eq!(forward, (0..8).collect());
}

#[test]
fn derived_hierarchy_closures_follow_the_refinement() {
    let mesh = build_bar_with_tight_closures(16, 2);
    let tree = mesh.partition_tree();

    let leaf = SubTreeRef::root().left().left();

    // fine cells 0..4 have the coarse parents 0..2, held by the coarse
    // range of the first leaf
    let mut parents = std::collections::BTreeSet::new();

    tree.parent_closure::<Refine, 0>(leaf).scan(|sub| {
        let range = tree.node_range_raw(sub, 1, 0);

        parents.extend(range.begin..range.end);
    });

    assert_eq!(parents, (0..2).collect());

    // and the coarse cells 4..6 own exactly the fine cells 8..12
    let children = covered_ids(
        tree,
        tree.child_closure::<Refine, 1>(SubTreeRef::root().right().left()),
        0,
    );

    assert_eq!(children, (8..12).collect());
}

#[test]
fn store_then_interpret_is_structurally_equal() -> anyhow::Result<()> {
    let mesh = build_bar(12, 2);

    let mut writer = ArchiveWriter::new();

    mesh.store(&mut writer);

    let archive = writer.finish();

    let interpreted = Mesh::<BarSpec>::interpret(&mut archive.reader())?;

    assert!(mesh == interpreted);

    let loaded = Mesh::<BarSpec>::load(&mut archive.reader())?;

    assert!(mesh == loaded);

    // the reconstructed mesh answers the same queries
    assert_eq!(interpreted.node_count::<Cell, 0>(), 12);
    assert_eq!(
        interpreted.sinks::<Link, 0>(NodeRef::new(4)),
        &[NodeRef::<Cell, 0>::new(5)]
    );

    Ok(())
}

#[test]
fn truncated_mesh_image_is_rejected() {
    let mesh = build_bar(12, 2);

    let mut writer = ArchiveWriter::new();

    mesh.store(&mut writer);

    let archive = writer.finish();
    let truncated = &archive.as_bytes()[..archive.len() / 2];

    assert!(Mesh::<BarSpec>::interpret(&mut tessera_types::ArchiveReader::new(truncated)).is_err());
}

#[test]
fn parallel_for_applies_the_body_exactly_once_per_node() {
    let n = 1000u32;
    let mesh = build_bar(n, 4);

    let counters: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();

    mesh.pfor_all::<Cell, 0, _>(|node| {
        counters[node.ordinal()].fetch_add(1, Ordering::Relaxed);
    });

    assert!(counters.iter().all(|c| c.load(Ordering::Relaxed) == 1));
}

#[test]
fn node_data_is_indexed_by_the_partition_tree() {
    let mesh = build_bar(10, 2);

    let mut data = mesh.create_node_data::<Cell, u64, 0>();

    assert_eq!(data.size(), 10);

    for node in (0..10).map(NodeRef::<Cell, 0>::new) {
        data[node] = node.id() as u64 * 3;
    }

    for node in (0..10).map(NodeRef::<Cell, 0>::new) {
        assert_eq!(data[node], node.id() as u64 * 3);
    }
}

#[test]
fn node_data_fragments_transfer_leaf_regions() -> anyhow::Result<()> {
    let mesh = build_bar(10, 2);
    let tree = mesh.partition_tree();

    let mut src = MeshDataFragment::<BarSpec, Cell, u32, 0>::new(tree, MeshRegion::full());
    let mut dst = MeshDataFragment::<BarSpec, Cell, u32, 0>::new(tree, MeshRegion::full());

    for node in (0..10).map(NodeRef::<Cell, 0>::new) {
        src[node] = 100 + node.id();
    }

    // transfer the lower-left leaf only
    let region = MeshRegion::from(SubTreeRef::root().left().left());

    dst.insert_from(&src, &region);

    assert_eq!(dst[NodeRef::<Cell, 0>::new(0)], 100);
    assert_eq!(dst[NodeRef::<Cell, 0>::new(1)], 101);
    assert_eq!(dst[NodeRef::<Cell, 0>::new(2)], 0);

    // the region-driven scan visits exactly the transferred nodes
    let mut visited = 0;

    tree.scan_region::<Cell, 0, _>(&region, |node| {
        assert_eq!(dst[node], 100 + node.id());
        visited += 1;
    });

    assert_eq!(visited, 2);

    // and the same transfer through an archive
    let mut writer = ArchiveWriter::new();

    src.extract(&mut writer, &region);

    let archive = writer.finish();
    let mut restored = MeshDataFragment::<BarSpec, Cell, u32, 0>::new(tree, MeshRegion::full());

    restored.insert_archived(&mut archive.reader())?;

    assert_eq!(restored[NodeRef::<Cell, 0>::new(1)], 101);
    assert_eq!(restored[NodeRef::<Cell, 0>::new(5)], 0);

    Ok(())
}
