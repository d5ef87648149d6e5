use core::ops::{Deref, DerefMut};

use tessera_region::Region;
use tessera_types::{ArchiveReader, ArchiveWriter};

mod grid;
mod scalar;
mod tree;

pub use grid::*;
pub use scalar::*;
pub use tree::*;

/// The storage of a data item restricted to a region.
///
/// A fragment owns one region value and the backing storage for exactly that
/// region; the region algebra drives resizing and structural transfer
/// between fragments, either directly or through a serialized archive.
pub trait Fragment {
    /// The region type describing subsets of the item's index space.
    type Region: Region;

    /// The region this fragment currently owns data for.
    fn covered_region(&self) -> &Self::Region;

    /// Reshapes the fragment: allocates storage for `new − covered`, frees
    /// storage for `covered − new`.
    fn resize(&mut self, region: &Self::Region);

    /// Copies the cells of `region` from `other` into this fragment.
    ///
    /// `region` must be covered by both fragments.
    fn insert_from(&mut self, other: &Self, region: &Self::Region);

    /// Writes the region value followed by the cell data of `region`.
    ///
    /// `region` must be covered by this fragment.
    fn extract(&self, writer: &mut ArchiveWriter, region: &Self::Region);

    /// Reads a region value and its cell data produced by
    /// [`Fragment::extract`] and applies it to this fragment.
    ///
    /// The archived region must be covered by this fragment.
    fn insert_archived(&mut self, reader: &mut ArchiveReader<'_>) -> anyhow::Result<()>;
}

/// A fragment held by a façade: owned when the façade was created
/// stand-alone, borrowed when it was produced by a fragment's `mask`.
pub(crate) enum FragmentRef<'f, F> {
    Own(Box<F>),
    Borrow(&'f mut F),
}

impl<F> Deref for FragmentRef<'_, F> {
    type Target = F;

    fn deref(&self) -> &F {
        match self {
            Self::Own(f) => f,
            Self::Borrow(f) => f,
        }
    }
}

impl<F> DerefMut for FragmentRef<'_, F> {
    fn deref_mut(&mut self) -> &mut F {
        match self {
            Self::Own(f) => f,
            Self::Borrow(f) => f,
        }
    }
}
