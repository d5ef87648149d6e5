use tessera_region::{MeshRegion, SubTreeRef};
use tessera_types::{ArchiveReader, ArchiveWriter};

mod data;
mod kinds;
mod partition;
mod topology;

pub use data::*;
pub use kinds::*;
pub use partition::*;
pub use topology::*;

/// An immutable, partitioned hierarchical mesh: a closed topology bundled
/// with a closed partition tree.
///
/// Meshes are produced by a [`MeshBuilder`] or restored from an archive;
/// once built, all state is read-only and may be shared freely across
/// worker tasks.
pub struct Mesh<'a, S: MeshSpec> {
    topology: MeshTopology<'a, S>,
    partition: PartitionTree<'a, S>,
}

impl<'a, S: MeshSpec> Mesh<'a, S> {
    fn new(topology: MeshTopology<'a, S>, partition: PartitionTree<'a, S>) -> Self {
        assert!(topology.is_closed(), "mesh built over a non-closed topology");
        assert!(
            partition.is_closed(),
            "mesh built over a non-closed partition tree"
        );

        Self {
            topology,
            partition,
        }
    }

    /// The topological data of the mesh.
    pub fn topology(&self) -> &MeshTopology<'a, S> {
        &self.topology
    }

    /// The partition tree indexing the mesh.
    pub fn partition_tree(&self) -> &PartitionTree<'a, S> {
        &self.partition
    }

    /// The number of nodes of kind `K` on level `L`.
    pub fn node_count<K: NodeKind, const L: usize>(&self) -> usize {
        self.topology.node_count::<K, L>()
    }

    /// The targets of the edges of kind `E` leaving `src`.
    pub fn sinks<E: EdgeKind, const L: usize>(
        &self,
        src: NodeRef<E::Src, L>,
    ) -> &[NodeRef<E::Trg, L>] {
        self.topology.sinks::<E, L>(src)
    }

    /// The sources of the edges of kind `E` arriving at `trg`.
    pub fn sources<E: EdgeKind, const L: usize>(
        &self,
        trg: NodeRef<E::Trg, L>,
    ) -> &[NodeRef<E::Src, L>] {
        self.topology.sources::<E, L>(trg)
    }

    /// The neighbors of `src` over the edge kind `E`.
    pub fn neighbors<E: EdgeKind, const L: usize>(
        &self,
        src: NodeRef<E::Src, L>,
    ) -> &[NodeRef<E::Trg, L>] {
        self.sinks::<E, L>(src)
    }

    /// The unique neighbor of `src` over the edge kind `E`.
    ///
    /// More or fewer than one neighbor is a contract violation.
    pub fn neighbor<E: EdgeKind, const L: usize>(
        &self,
        src: NodeRef<E::Src, L>,
    ) -> NodeRef<E::Trg, L> {
        let sinks = self.sinks::<E, L>(src);

        assert!(sinks.len() == 1, "node without a unique neighbor");

        sinks[0]
    }

    /// The children of `parent` along hierarchy kind `H`.
    pub fn children<H: HierarchyKind, const PL: usize, const CL: usize>(
        &self,
        parent: NodeRef<H::Parent, PL>,
    ) -> &[NodeRef<H::Child, CL>] {
        self.topology.children::<H, PL, CL>(parent)
    }

    /// The parent of `child` along hierarchy kind `H`, if one was assigned.
    pub fn parent<H: HierarchyKind, const CL: usize, const PL: usize>(
        &self,
        child: NodeRef<H::Child, CL>,
    ) -> Option<NodeRef<H::Parent, PL>> {
        self.topology.parent::<H, CL, PL>(child)
    }

    /// Creates a property array over every node of kind `K` on level `L`,
    /// default-initialized and keyed by this mesh's partition tree.
    pub fn create_node_data<K: NodeKind, T: Default + Clone, const L: usize>(
        &self,
    ) -> MeshData<'static, '_, S, K, T, L> {
        MeshData::new(&self.partition, MeshRegion::full())
    }

    /// Applies `body` to every node of kind `K` on level `L`.
    ///
    /// The partition tree is descended in pre-order; each internal sub-tree
    /// forks its two children as independent tasks for the scheduler to
    /// place or inline, and each leaf applies the body sequentially over its
    /// node range. The call returns once the whole task tree has completed.
    ///
    /// No ordering is guaranteed between applications on distinct nodes,
    /// and the body runs at most once per node.
    pub fn pfor_all<K: NodeKind, const L: usize, F>(&self, body: F)
    where
        F: Fn(NodeRef<K, L>) + Sync,
    {
        self.descend::<K, L, F>(SubTreeRef::root(), &body);
    }

    fn descend<K: NodeKind, const L: usize, F>(&self, sub: SubTreeRef, body: &F)
    where
        F: Fn(NodeRef<K, L>) + Sync,
    {
        if sub.depth() == self.partition.depth() {
            for node in self.partition.node_range::<K, L>(sub).iter() {
                body(node);
            }

            return;
        }

        rayon::join(
            || self.descend::<K, L, F>(sub.left(), body),
            || self.descend::<K, L, F>(sub.right(), body),
        );
    }

    /// Writes the mesh: the partition tree followed by the topology.
    pub fn store(&self, writer: &mut ArchiveWriter) {
        self.partition.store(writer);
        self.topology.store(writer);
    }

    /// Restores an owning mesh from an archive.
    pub fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Mesh<'static, S>> {
        let partition = PartitionTree::load(reader)?;
        let topology = MeshTopology::load(reader)?;

        Ok(Mesh::new(topology, partition))
    }

    /// Reconstructs a mesh in place, borrowing the reader's buffer.
    pub fn interpret(reader: &mut ArchiveReader<'a>) -> anyhow::Result<Mesh<'a, S>> {
        let partition = PartitionTree::interpret(reader)?;
        let topology = MeshTopology::interpret(reader)?;

        Ok(Mesh::new(topology, partition))
    }
}

impl<S: MeshSpec> PartialEq for Mesh<'_, S> {
    fn eq(&self, other: &Self) -> bool {
        self.topology == other.topology && self.partition == other.partition
    }
}

/// A utility accumulating nodes and links before closing them into an
/// immutable [`Mesh`].
pub struct MeshBuilder<S: MeshSpec> {
    topology: MeshTopology<'static, S>,
}

impl<S: MeshSpec> MeshBuilder<S> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            topology: MeshTopology::new(),
        }
    }

    /// Creates one new node of kind `K` on level `L`.
    pub fn create<K: NodeKind, const L: usize>(&mut self) -> NodeRef<K, L> {
        self.topology.create::<K, L>()
    }

    /// Creates `num` new nodes of kind `K` on level `L`.
    pub fn create_many<K: NodeKind, const L: usize>(&mut self, num: u32) -> NodeRange<K, L> {
        self.topology.create_many::<K, L>(num)
    }

    /// Links `src` to `trg` with an edge of kind `E`.
    pub fn link<E: EdgeKind, const L: usize>(
        &mut self,
        src: NodeRef<E::Src, L>,
        trg: NodeRef<E::Trg, L>,
    ) {
        self.topology.add_edge::<E, L>(src, trg);
    }

    /// Links `parent` to `child` with a hierarchical relation of kind `H`.
    pub fn link_parent_child<H: HierarchyKind, const PL: usize, const CL: usize>(
        &mut self,
        parent: NodeRef<H::Parent, PL>,
        child: NodeRef<H::Child, CL>,
    ) {
        self.topology.add_child::<H, PL, CL>(parent, child);
    }

    /// Closes the topology and partitions it with the default
    /// [`NaivePartitioner`].
    pub fn build(self, depth: u32) -> Mesh<'static, S> {
        self.build_with(&NaivePartitioner, depth)
    }

    /// Closes the topology and partitions it with the given policy.
    pub fn build_with<P: Partitioner<S>>(mut self, partitioner: &P, depth: u32) -> Mesh<'static, S> {
        self.topology.close();

        let partition = partitioner.partition(&self.topology, depth);

        Mesh::new(self.topology, partition)
    }
}

impl<S: MeshSpec> Default for MeshBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
