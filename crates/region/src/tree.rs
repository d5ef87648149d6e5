use core::fmt;

use bitvec::prelude::{BitArr, Lsb0};
use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::Region;

/// Bit capacity of the sub-tree mask: up to `2^10` leaf trees plus the root
/// tree bit.
const MASK_BITS: usize = 1025;

type Mask = BitArr!(for MASK_BITS, in u64, Lsb0);

/// A subset of the elements of a static balanced binary tree of depth
/// `DEPTH`.
///
/// The tree is logically split into one root sub-tree of depth
/// [`TreeRegion::ROOT_DEPTH`] and [`TreeRegion::NUM_LEAF_TREES`] leaf
/// sub-trees holding the remaining levels. The region is a bit mask with one
/// bit per leaf sub-tree plus one for the root sub-tree; all set operations
/// are bitwise.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TreeRegion<const DEPTH: usize> {
    mask: Mask,
}

impl<const DEPTH: usize> TreeRegion<DEPTH> {
    /// The depth of the root sub-tree, capped to produce at most 1K leaf
    /// trees.
    pub const ROOT_DEPTH: usize = if DEPTH / 2 < 10 { DEPTH / 2 } else { 10 };

    /// The number of leaf sub-trees.
    pub const NUM_LEAF_TREES: usize = 1 << Self::ROOT_DEPTH;

    /// The number of mask words carrying significant bits.
    const WORDS: usize = (Self::NUM_LEAF_TREES + 1 + 63) / 64;

    /// The empty region.
    pub fn empty() -> Self {
        Self { mask: Mask::ZERO }
    }

    /// The region covering the root sub-tree and every leaf sub-tree.
    pub fn full() -> Self {
        let mut res = Self::empty();

        for i in 0..=Self::NUM_LEAF_TREES {
            res.mask.set(i, true);
        }

        res
    }

    /// The region covering only the root sub-tree.
    pub fn root() -> Self {
        let mut res = Self::empty();

        res.mask.set(Self::NUM_LEAF_TREES, true);
        res
    }

    /// The region covering the leaf sub-tree `i`.
    pub fn subtree(i: usize) -> Self {
        assert!(i < Self::NUM_LEAF_TREES, "no leaf sub-tree {i}");

        let mut res = Self::empty();

        res.mask.set(i, true);
        res
    }

    /// Returns `true` if the root sub-tree is covered.
    pub fn contains_root_tree(&self) -> bool {
        self.mask[Self::NUM_LEAF_TREES]
    }

    /// Returns `true` if the leaf sub-tree `i` is covered.
    pub fn contains_subtree(&self, i: usize) -> bool {
        i < Self::NUM_LEAF_TREES && self.mask[i]
    }

    /// Returns `true` if the sub-tree holding `addr` is covered.
    pub fn contains(&self, addr: &TreeElementAddress<DEPTH>) -> bool {
        self.mask[addr.subtree_index()]
    }

    /// Applies `op` to the index of every covered leaf sub-tree.
    pub fn for_each_subtree<F: FnMut(usize)>(&self, mut op: F) {
        for i in self.mask.iter_ones() {
            if i < Self::NUM_LEAF_TREES {
                op(i);
            }
        }
    }

    /// The dependency closure of the region.
    ///
    /// A region containing the root sub-tree reaches into every leaf
    /// sub-tree, so its closure is the full region; any other region is its
    /// own closure.
    pub fn closure(&self) -> Self {
        if self.contains_root_tree() {
            return Self::full();
        }

        *self
    }

    /// The sub-trees of the full region not covered by this one.
    pub fn complement(&self) -> Self {
        Self::difference(&Self::full(), self)
    }

    fn zip<F: Fn(u64, u64) -> u64>(a: &Self, b: &Self, f: F) -> Self {
        let mut res = Self::empty();
        let out = res.mask.as_raw_mut_slice();

        for (i, (x, y)) in a
            .mask
            .as_raw_slice()
            .iter()
            .zip(b.mask.as_raw_slice())
            .enumerate()
        {
            out[i] = f(*x, *y);
        }

        res
    }
}

impl<const DEPTH: usize> Region for TreeRegion<DEPTH> {
    fn is_empty(&self) -> bool {
        self.mask.not_any()
    }

    fn merge(a: &Self, b: &Self) -> Self {
        Self::zip(a, b, |x, y| x | y)
    }

    fn intersect(a: &Self, b: &Self) -> Self {
        Self::zip(a, b, |x, y| x & y)
    }

    fn difference(a: &Self, b: &Self) -> Self {
        Self::zip(a, b, |x, y| x & !y)
    }
}

impl<const DEPTH: usize> Default for TreeRegion<DEPTH> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const DEPTH: usize> fmt::Debug for TreeRegion<DEPTH> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;

        if self.contains_root_tree() {
            write!(f, " R")?;
        }

        for i in self.mask.iter_ones() {
            if i < Self::NUM_LEAF_TREES {
                write!(f, " {i}")?;
            }
        }

        write!(f, " }}")
    }
}

impl<const DEPTH: usize> Serializable for TreeRegion<DEPTH> {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_slice(&self.mask.as_raw_slice()[..Self::WORDS]);
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        let mut res = Self::empty();

        for i in 0..Self::WORDS {
            res.mask.as_raw_mut_slice()[i] = reader.read_trivial()?;
        }

        Ok(res)
    }
}

/// The address of one element of a static balanced binary tree of depth
/// `DEPTH`: the sub-tree it lives in, its 1-based heap index within that
/// sub-tree, and its global level.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct TreeElementAddress<const DEPTH: usize> {
    subtree: u32,
    index: u32,
    level: u32,
}

impl<const DEPTH: usize> TreeElementAddress<DEPTH> {
    const NUM_LEAF_TREES: u32 = TreeRegion::<DEPTH>::NUM_LEAF_TREES as u32;
    const ROOT_DEPTH: u32 = TreeRegion::<DEPTH>::ROOT_DEPTH as u32;

    /// The address of the tree root.
    pub fn root() -> Self {
        Self {
            subtree: Self::NUM_LEAF_TREES,
            index: 1,
            level: 0,
        }
    }

    /// Returns `true` if the addressed node has no children.
    pub fn is_leaf(&self) -> bool {
        self.level as usize == DEPTH - 1
    }

    /// The global level of the addressed node.
    pub fn level(&self) -> usize {
        self.level as usize
    }

    /// The index of the sub-tree holding the node; the root sub-tree is
    /// [`TreeRegion::NUM_LEAF_TREES`].
    pub fn subtree_index(&self) -> usize {
        self.subtree as usize
    }

    /// The 1-based heap index of the node within its sub-tree.
    pub fn index_in_subtree(&self) -> usize {
        self.index as usize
    }

    /// The address of the left child.
    ///
    /// At the boundary level the child migrates into a leaf sub-tree with a
    /// reset local index.
    pub fn left_child(&self) -> Self {
        debug_assert!(!self.is_leaf());

        if self.level + 1 == Self::ROOT_DEPTH {
            return Self {
                subtree: (2 * self.index) % Self::NUM_LEAF_TREES,
                index: 1,
                level: self.level + 1,
            };
        }

        Self {
            subtree: self.subtree,
            index: 2 * self.index,
            level: self.level + 1,
        }
    }

    /// The address of the right child.
    pub fn right_child(&self) -> Self {
        debug_assert!(!self.is_leaf());

        if self.level + 1 == Self::ROOT_DEPTH {
            return Self {
                subtree: (2 * self.index + 1) % Self::NUM_LEAF_TREES,
                index: 1,
                level: self.level + 1,
            };
        }

        Self {
            subtree: self.subtree,
            index: 2 * self.index + 1,
            level: self.level + 1,
        }
    }
}

impl<const DEPTH: usize> fmt::Debug for TreeElementAddress<DEPTH> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subtree == Self::NUM_LEAF_TREES {
            write!(f, "R")?;
        } else {
            write!(f, "{}", self.subtree)?;
        }

        write!(f, "/{}(l={})", self.index, self.level)
    }
}

impl<const DEPTH: usize> Serializable for TreeElementAddress<DEPTH> {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(&self.subtree);
        writer.write_trivial(&self.index);
        writer.write_trivial(&self.level);
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        Ok(Self {
            subtree: reader.read_trivial()?,
            index: reader.read_trivial()?,
            level: reader.read_trivial()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_closure_is_full() {
        type R = TreeRegion<3>;

        let r = R::merge(&R::subtree(0), &R::root());

        assert_eq!(r.closure(), R::full());
        assert_eq!(R::subtree(0).closure(), R::subtree(0));
    }

    #[test]
    fn left_descent_crosses_into_leaf_tree() {
        // depth 8 => root depth 4; four left steps reach leaf tree 0
        let addr = TreeElementAddress::<8>::root();

        let addr = addr.left_child();
        assert_eq!((addr.subtree_index(), addr.index_in_subtree()), (16, 2));

        let addr = addr.left_child();
        assert_eq!((addr.subtree_index(), addr.index_in_subtree()), (16, 4));

        let addr = addr.left_child();
        assert_eq!((addr.subtree_index(), addr.index_in_subtree()), (16, 8));

        let addr = addr.left_child();
        assert_eq!((addr.subtree_index(), addr.index_in_subtree()), (0, 1));
        assert_eq!(addr.level(), 4);
    }

    #[test]
    fn leaf_detection() {
        let mut addr = TreeElementAddress::<4>::root();

        while !addr.is_leaf() {
            addr = addr.right_child();
        }

        assert_eq!(addr.level(), 3);
    }
}
