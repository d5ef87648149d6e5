use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

use tessera_region::{is_sub_region, MeshRegion};
use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::{Fragment, FragmentRef, MeshSpec, NodeKind, NodeRef, PartitionTree};

/// The fragment of a per-node property array of kind `K` on level `L`,
/// backed by a contiguous vector indexed by node id.
///
/// The referenced partition tree is the single source for the node ranges a
/// covered region denotes; the fragment's length is the maximal end of the
/// covered ranges.
pub struct MeshDataFragment<'p, S: MeshSpec, K: NodeKind, T, const L: usize> {
    partition: &'p PartitionTree<'p, S>,
    covered: MeshRegion,
    data: Vec<T>,
    _kind: PhantomData<K>,
}

impl<'p, S: MeshSpec, K: NodeKind, T: Default + Clone, const L: usize>
    MeshDataFragment<'p, S, K, T, L>
{
    /// Creates a fragment covering `region` of the partition tree's node-id
    /// space.
    pub fn new(partition: &'p PartitionTree<'p, S>, region: MeshRegion) -> Self {
        let mut res = Self {
            partition,
            covered: MeshRegion::empty(),
            data: Vec::new(),
            _kind: PhantomData,
        };

        res.reshape(region);
        res
    }

    /// The number of addressable elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Produces a façade borrowing this fragment.
    pub fn mask(&mut self) -> MeshData<'_, 'p, S, K, T, L> {
        MeshData {
            fragment: FragmentRef::Borrow(self),
        }
    }

    fn required_len(&self, region: &MeshRegion) -> usize {
        let mut max = 0usize;

        region.scan(|sub| {
            max = max.max(self.partition.node_range::<K, L>(sub).end().ordinal());
        });

        max
    }

    fn reshape(&mut self, region: MeshRegion) {
        let len = self.required_len(&region);

        self.data.resize(len, T::default());
        self.covered = region;
    }

    /// Applies `body` to every node-id range covered by `region`.
    fn for_each_range(&self, region: &MeshRegion, mut body: impl FnMut(usize, usize)) {
        region.scan(|sub| {
            let range = self.partition.node_range::<K, L>(sub);

            body(range.begin().ordinal(), range.end().ordinal());
        });
    }
}

impl<S: MeshSpec, K: NodeKind, T: Default + Clone + Serializable, const L: usize> Fragment
    for MeshDataFragment<'_, S, K, T, L>
{
    type Region = MeshRegion;

    fn covered_region(&self) -> &MeshRegion {
        &self.covered
    }

    fn resize(&mut self, region: &MeshRegion) {
        self.reshape(region.clone());
    }

    fn insert_from(&mut self, other: &Self, region: &MeshRegion) {
        assert!(
            is_sub_region(region, &other.covered),
            "region not covered by the source fragment"
        );
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by the target fragment"
        );

        let mut runs = Vec::new();

        self.for_each_range(region, |begin, end| runs.push((begin, end)));

        for (begin, end) in runs {
            self.data[begin..end].clone_from_slice(&other.data[begin..end]);
        }
    }

    fn extract(&self, writer: &mut ArchiveWriter, region: &MeshRegion) {
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by this fragment"
        );

        writer.write(region);

        self.for_each_range(region, |begin, end| {
            for value in &self.data[begin..end] {
                writer.write(value);
            }
        });
    }

    fn insert_archived(&mut self, reader: &mut ArchiveReader<'_>) -> anyhow::Result<()> {
        let region = reader.read::<MeshRegion>()?;

        assert!(
            is_sub_region(&region, &self.covered),
            "archived region not covered by this fragment"
        );

        let mut runs = Vec::new();

        self.for_each_range(&region, |begin, end| runs.push((begin, end)));

        for (begin, end) in runs {
            for idx in begin..end {
                self.data[idx] = reader.read()?;
            }
        }

        Ok(())
    }
}

impl<S: MeshSpec, K: NodeKind, T, const L: usize> Index<NodeRef<K, L>>
    for MeshDataFragment<'_, S, K, T, L>
{
    type Output = T;

    fn index(&self, node: NodeRef<K, L>) -> &T {
        &self.data[node.ordinal()]
    }
}

impl<S: MeshSpec, K: NodeKind, T, const L: usize> IndexMut<NodeRef<K, L>>
    for MeshDataFragment<'_, S, K, T, L>
{
    fn index_mut(&mut self, node: NodeRef<K, L>) -> &mut T {
        &mut self.data[node.ordinal()]
    }
}

/// The façade presenting a mesh-data fragment as a dense per-node property
/// array.
pub struct MeshData<'f, 'p, S: MeshSpec, K: NodeKind, T, const L: usize> {
    fragment: FragmentRef<'f, MeshDataFragment<'p, S, K, T, L>>,
}

impl<'p, S: MeshSpec, K: NodeKind, T: Default + Clone, const L: usize>
    MeshData<'_, 'p, S, K, T, L>
{
    /// Creates a stand-alone property array covering `region`.
    pub fn new(partition: &'p PartitionTree<'p, S>, region: MeshRegion) -> Self {
        Self {
            fragment: FragmentRef::Own(Box::new(MeshDataFragment::new(partition, region))),
        }
    }

    /// The number of addressable elements.
    pub fn size(&self) -> usize {
        self.fragment.size()
    }
}

impl<S: MeshSpec, K: NodeKind, T: Default + Clone, const L: usize> Index<NodeRef<K, L>>
    for MeshData<'_, '_, S, K, T, L>
{
    type Output = T;

    fn index(&self, node: NodeRef<K, L>) -> &T {
        &self.fragment[node]
    }
}

impl<S: MeshSpec, K: NodeKind, T: Default + Clone, const L: usize> IndexMut<NodeRef<K, L>>
    for MeshData<'_, '_, S, K, T, L>
{
    fn index_mut(&mut self, node: NodeRef<K, L>) -> &mut T {
        &mut self.fragment[node]
    }
}
