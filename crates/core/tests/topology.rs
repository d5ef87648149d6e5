use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera::{MeshBuilder, NodeRef};

tessera::mesh_spec! {
    /// A random directed graph over a single node kind.
    struct GraphSpec {
        levels: 1,
        nodes: [Point],
        edges: [Arrow: Point -> Point],
        hierarchies: [],
    }
}

#[test]
fn backward_edges_mirror_forward_edges() {
    let mut rng = StdRng::seed_from_u64(0x7e55e4a);
    let n = 64u32;

    let mut builder = MeshBuilder::<GraphSpec>::new();
    let nodes = builder.create_many::<Point, 0>(n);

    let mut edges = Vec::new();

    for _ in 0..500 {
        let s = rng.random_range(0..n);
        let t = rng.random_range(0..n);

        builder.link::<Arrow, 0>(nodes.at(s as usize), nodes.at(t as usize));
        edges.push((s, t));
    }

    let mesh = builder.build(3);

    // every staged edge is observable in both directions
    for &(s, t) in &edges {
        assert!(mesh
            .sinks::<Arrow, 0>(NodeRef::new(s))
            .contains(&NodeRef::new(t)));
        assert!(mesh
            .sources::<Arrow, 0>(NodeRef::new(t))
            .contains(&NodeRef::new(s)));
    }

    // the CSR mirrors hold exactly the staged multiset
    let forward: usize = (0..n).map(|s| mesh.sinks::<Arrow, 0>(NodeRef::new(s)).len()).sum();
    let backward: usize = (0..n)
        .map(|t| mesh.sources::<Arrow, 0>(NodeRef::new(t)).len())
        .sum();

    assert_eq!(forward, edges.len());
    assert_eq!(backward, edges.len());

    // degree counts agree with the staged list
    for s in 0..n {
        let expected = edges.iter().filter(|&&(a, _)| a == s).count();

        assert_eq!(mesh.sinks::<Arrow, 0>(NodeRef::new(s)).len(), expected);
    }
}
