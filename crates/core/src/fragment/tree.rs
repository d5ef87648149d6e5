use tessera_region::{is_sub_region, Region, TreeElementAddress, TreeRegion};
use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::{Fragment, FragmentRef};

/// The flattened storage of one sub-tree: `2^depth - 1` elements addressed
/// by their 1-based heap index.
struct SubTreeStore<T> {
    data: Vec<T>,
}

impl<T: Default + Clone> SubTreeStore<T> {
    fn new(depth: usize) -> Self {
        Self {
            data: vec![T::default(); (1 << depth) - 1],
        }
    }

    fn get(&self, i: usize) -> &T {
        assert!(0 < i && i <= self.data.len(), "tree index {i} out of range");

        &self.data[i - 1]
    }

    fn get_mut(&mut self, i: usize) -> &mut T {
        assert!(0 < i && i <= self.data.len(), "tree index {i} out of range");

        &mut self.data[i - 1]
    }
}

/// The fragment of a static balanced binary tree data item of depth `DEPTH`.
///
/// Storage is sliced along the region decomposition: one optional root
/// sub-tree array plus one optional array per leaf sub-tree. Resizing
/// allocates and drops whole sub-trees; transfers copy or serialize them
/// whole.
pub struct TreeFragment<T, const DEPTH: usize> {
    covered: TreeRegion<DEPTH>,
    root: Option<SubTreeStore<T>>,
    leaves: Vec<Option<SubTreeStore<T>>>,
}

impl<T: Default + Clone, const DEPTH: usize> TreeFragment<T, DEPTH> {
    const ROOT_DEPTH: usize = TreeRegion::<DEPTH>::ROOT_DEPTH;
    const LEAF_DEPTH: usize = DEPTH - TreeRegion::<DEPTH>::ROOT_DEPTH;
    const NUM_LEAF_TREES: usize = TreeRegion::<DEPTH>::NUM_LEAF_TREES;

    /// Creates a fragment covering `region`.
    pub fn new(region: TreeRegion<DEPTH>) -> Self {
        let mut res = Self {
            covered: TreeRegion::empty(),
            root: None,
            leaves: (0..Self::NUM_LEAF_TREES).map(|_| None).collect(),
        };

        res.reshape(&region);
        res
    }

    /// Reads the element at `addr`.
    pub fn get(&self, addr: &TreeElementAddress<DEPTH>) -> &T {
        if addr.subtree_index() == Self::NUM_LEAF_TREES {
            return self
                .root
                .as_ref()
                .expect("access outside the covered tree region")
                .get(addr.index_in_subtree());
        }

        self.leaves[addr.subtree_index()]
            .as_ref()
            .expect("access outside the covered tree region")
            .get(addr.index_in_subtree())
    }

    /// Mutable access to the element at `addr`.
    pub fn get_mut(&mut self, addr: &TreeElementAddress<DEPTH>) -> &mut T {
        if addr.subtree_index() == Self::NUM_LEAF_TREES {
            return self
                .root
                .as_mut()
                .expect("access outside the covered tree region")
                .get_mut(addr.index_in_subtree());
        }

        self.leaves[addr.subtree_index()]
            .as_mut()
            .expect("access outside the covered tree region")
            .get_mut(addr.index_in_subtree())
    }

    /// Produces a façade borrowing this fragment.
    pub fn mask(&mut self) -> StaticTree<'_, T, DEPTH> {
        StaticTree {
            fragment: FragmentRef::Borrow(self),
        }
    }

    fn reshape(&mut self, region: &TreeRegion<DEPTH>) {
        let remove = TreeRegion::difference(&self.covered, region);
        let add = TreeRegion::difference(region, &self.covered);

        if remove.contains_root_tree() {
            self.root = None;
        }

        remove.for_each_subtree(|i| {
            self.leaves[i] = None;
        });

        if add.contains_root_tree() {
            self.root = Some(SubTreeStore::new(Self::ROOT_DEPTH));
        }

        add.for_each_subtree(|i| {
            self.leaves[i] = Some(SubTreeStore::new(Self::LEAF_DEPTH));
        });

        self.covered = *region;
    }
}

impl<T: Default + Clone + Serializable, const DEPTH: usize> Fragment for TreeFragment<T, DEPTH> {
    type Region = TreeRegion<DEPTH>;

    fn covered_region(&self) -> &TreeRegion<DEPTH> {
        &self.covered
    }

    fn resize(&mut self, region: &TreeRegion<DEPTH>) {
        self.reshape(region);
    }

    fn insert_from(&mut self, other: &Self, region: &TreeRegion<DEPTH>) {
        assert!(
            is_sub_region(region, &other.covered),
            "region not covered by the source fragment"
        );
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by the target fragment"
        );

        if region.contains_root_tree() {
            let src = other.root.as_ref().expect("covered sub-tree missing");

            self.root
                .as_mut()
                .expect("covered sub-tree missing")
                .data
                .clone_from_slice(&src.data);
        }

        region.for_each_subtree(|i| {
            let src = other.leaves[i].as_ref().expect("covered sub-tree missing");

            self.leaves[i]
                .as_mut()
                .expect("covered sub-tree missing")
                .data
                .clone_from_slice(&src.data);
        });
    }

    fn extract(&self, writer: &mut ArchiveWriter, region: &TreeRegion<DEPTH>) {
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by this fragment"
        );

        writer.write(region);

        if region.contains_root_tree() {
            let store = self.root.as_ref().expect("covered sub-tree missing");

            writer.write(&store.data);
        }

        region.for_each_subtree(|i| {
            let store = self.leaves[i].as_ref().expect("covered sub-tree missing");

            writer.write(&store.data);
        });
    }

    fn insert_archived(&mut self, reader: &mut ArchiveReader<'_>) -> anyhow::Result<()> {
        let region = reader.read::<TreeRegion<DEPTH>>()?;

        assert!(
            is_sub_region(&region, &self.covered),
            "archived region not covered by this fragment"
        );

        if region.contains_root_tree() {
            let data = reader.read::<Vec<T>>()?;
            let store = self.root.as_mut().expect("covered sub-tree missing");

            anyhow::ensure!(
                data.len() == store.data.len(),
                "archived sub-tree of unexpected length {}",
                data.len()
            );

            store.data = data;
        }

        let mut failure = None;

        region.for_each_subtree(|i| {
            if failure.is_some() {
                return;
            }

            match reader.read::<Vec<T>>() {
                Ok(data) => {
                    let store = self.leaves[i].as_mut().expect("covered sub-tree missing");

                    if data.len() == store.data.len() {
                        store.data = data;
                    } else {
                        failure = Some(anyhow::anyhow!(
                            "archived sub-tree of unexpected length {}",
                            data.len()
                        ));
                    }
                }
                Err(e) => failure = Some(e),
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// The façade presenting a tree fragment as a full static balanced binary
/// tree.
pub struct StaticTree<'f, T, const DEPTH: usize> {
    fragment: FragmentRef<'f, TreeFragment<T, DEPTH>>,
}

impl<T: Default + Clone, const DEPTH: usize> StaticTree<'_, T, DEPTH> {
    /// Creates a stand-alone tree with default-initialized elements.
    pub fn new() -> Self {
        Self {
            fragment: FragmentRef::Own(Box::new(TreeFragment::new(TreeRegion::full()))),
        }
    }

    /// Reads the element at `addr`.
    pub fn get(&self, addr: &TreeElementAddress<DEPTH>) -> &T {
        self.fragment.get(addr)
    }

    /// Writes the element at `addr`.
    pub fn set(&mut self, addr: &TreeElementAddress<DEPTH>, value: T) {
        *self.fragment.get_mut(addr) = value;
    }
}

impl<T: Default + Clone, const DEPTH: usize> Default for StaticTree<'_, T, DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Region8 = TreeRegion<8>;

    #[test]
    fn facade_walks_the_tree() {
        let mut tree = StaticTree::<u32, 8>::new();
        let mut addr = TreeElementAddress::root();
        let mut depth = 0;

        while !addr.is_leaf() {
            tree.set(&addr, depth);
            addr = addr.left_child();
            depth += 1;
        }

        tree.set(&addr, depth);

        assert_eq!(depth, 7);

        let mut addr = TreeElementAddress::root();
        for expected in 0..=7 {
            assert_eq!(*tree.get(&addr), expected);

            if !addr.is_leaf() {
                addr = addr.left_child();
            }
        }
    }

    #[test]
    fn resize_drops_and_allocates_subtrees() {
        let mut fragment = TreeFragment::<u32, 8>::new(Region8::root());

        let root = TreeElementAddress::root();

        *fragment.get_mut(&root) = 5;

        // grow by a leaf sub-tree, keep the root data
        fragment.resize(&Region8::merge(&Region8::root(), &Region8::subtree(0)));

        assert_eq!(*fragment.get(&root), 5);

        // shrink away the root tree
        fragment.resize(&Region8::subtree(0));

        assert!(fragment.root.is_none());
        assert!(fragment.leaves[0].is_some());
    }

    #[test]
    fn archived_transfer_round_trips() -> anyhow::Result<()> {
        let region = Region8::merge(&Region8::root(), &Region8::subtree(3));

        let mut src = TreeFragment::<u64, 8>::new(region);

        let mut addr = TreeElementAddress::root();
        let mut value = 1u64;

        loop {
            if src.covered_region().contains(&addr) {
                *src.get_mut(&addr) = value;
                value += 1;
            }

            if addr.is_leaf() {
                break;
            }

            addr = addr.right_child();
        }

        let mut writer = ArchiveWriter::new();

        src.extract(&mut writer, &region);

        let archive = writer.finish();
        let mut dst = TreeFragment::<u64, 8>::new(region);

        dst.insert_archived(&mut archive.reader())?;

        let mut addr = TreeElementAddress::root();
        loop {
            if region.contains(&addr) {
                assert_eq!(dst.get(&addr), src.get(&addr));
            }

            if addr.is_leaf() {
                break;
            }

            addr = addr.right_child();
        }

        Ok(())
    }
}
