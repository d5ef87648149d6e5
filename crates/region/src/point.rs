use core::fmt;
use core::ops::{Index, IndexMut};

use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// The coordinate type of grid points.
pub type Coordinate = i64;

/// A point in a `D`-dimensional grid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct GridPoint<const D: usize>([Coordinate; D]);

impl<const D: usize> Default for GridPoint<D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const D: usize> GridPoint<D> {
    /// Creates a point from its coordinates.
    pub const fn new(coordinates: [Coordinate; D]) -> Self {
        Self(coordinates)
    }

    /// Creates a point with every coordinate set to `value`.
    pub fn splat(value: Coordinate) -> Self {
        Self([value; D])
    }

    /// The origin.
    pub fn zero() -> Self {
        Self([0; D])
    }

    /// Returns the coordinates as an array.
    pub fn coordinates(&self) -> &[Coordinate; D] {
        &self.0
    }

    /// Returns `true` if every coordinate is less than or equal to the
    /// corresponding coordinate of `other`.
    pub fn dominated_by(&self, other: &Self) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a <= b)
    }

    /// Returns `true` if every coordinate is strictly less than the
    /// corresponding coordinate of `other`.
    pub fn strictly_dominated_by(&self, other: &Self) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a < b)
    }

    /// The component-wise minimum of two points.
    pub fn min(a: &Self, b: &Self) -> Self {
        let mut res = *a;

        for i in 0..D {
            res.0[i] = res.0[i].min(b.0[i]);
        }

        res
    }

    /// The component-wise maximum of two points.
    pub fn max(a: &Self, b: &Self) -> Self {
        let mut res = *a;

        for i in 0..D {
            res.0[i] = res.0[i].max(b.0[i]);
        }

        res
    }

    /// The product of all coordinates, saturating at zero for non-positive
    /// extents.
    pub fn volume(&self) -> usize {
        let mut res = 1usize;

        for c in self.0 {
            if c <= 0 {
                return 0;
            }

            res *= c as usize;
        }

        res
    }
}

impl<const D: usize> From<[Coordinate; D]> for GridPoint<D> {
    fn from(coordinates: [Coordinate; D]) -> Self {
        Self(coordinates)
    }
}

impl<const D: usize> Index<usize> for GridPoint<D> {
    type Output = Coordinate;

    fn index(&self, i: usize) -> &Coordinate {
        &self.0[i]
    }
}

impl<const D: usize> IndexMut<usize> for GridPoint<D> {
    fn index_mut(&mut self, i: usize) -> &mut Coordinate {
        &mut self.0[i]
    }
}

impl<const D: usize> fmt::Debug for GridPoint<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<const D: usize> Serializable for GridPoint<D> {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(self);
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        reader.read_trivial()
    }
}
