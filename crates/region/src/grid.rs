use alloc::vec::Vec;
use core::fmt;

use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::{Coordinate, GridBox, GridPoint, Region};

/// A subset of a dense grid: the enclosing domain plus a canonical list of
/// pairwise disjoint boxes whose union is the denoted set.
///
/// After every mutating operation the box list is re-compressed by removing
/// covered boxes and greedily fusing adjacent coplanar ones.
#[derive(Clone, Default)]
pub struct GridRegion<const D: usize> {
    total: GridPoint<D>,
    boxes: Vec<GridBox<D>>,
}

impl<const D: usize> GridRegion<D> {
    /// Creates an empty region over the given domain.
    pub fn empty(total: GridPoint<D>) -> Self {
        Self {
            total,
            boxes: Vec::new(),
        }
    }

    /// Creates the region covering the whole domain.
    pub fn full(total: GridPoint<D>) -> Self {
        Self::of(total, GridPoint::zero(), total)
    }

    /// Creates the region covering `[min, max)` within the domain.
    pub fn of(total: GridPoint<D>, min: GridPoint<D>, max: GridPoint<D>) -> Self {
        debug_assert!(min.dominated_by(&total));
        debug_assert!(max.dominated_by(&total));

        let bx = GridBox::new(min, max);

        Self {
            total,
            boxes: if bx.is_empty() {
                Vec::new()
            } else {
                alloc::vec![bx]
            },
        }
    }

    /// Creates the cube region `[a, b)` on every axis.
    pub fn cube(total: GridPoint<D>, a: Coordinate, b: Coordinate) -> Self {
        Self::of(total, GridPoint::splat(a), GridPoint::splat(b))
    }

    /// The enclosing domain.
    pub fn total(&self) -> &GridPoint<D> {
        &self.total
    }

    /// The canonical box list.
    pub fn boxes(&self) -> &[GridBox<D>] {
        &self.boxes
    }

    /// The number of cells covered.
    pub fn area(&self) -> usize {
        self.boxes.iter().map(GridBox::area).sum()
    }

    /// The smallest box containing the region.
    pub fn bounding_box(&self) -> GridBox<D> {
        let mut it = self.boxes.iter();

        let Some(first) = it.next() else {
            return GridBox::from_origin(GridPoint::zero());
        };

        it.fold(*first, |acc, b| {
            GridBox::new(
                GridPoint::min(acc.min(), b.min()),
                GridPoint::max(acc.max(), b.max()),
            )
        })
    }

    /// Returns `true` if `point` lies within the region.
    pub fn covers_point(&self, point: &GridPoint<D>) -> bool {
        self.boxes.iter().any(|b| b.covers_point(point))
    }

    /// The cells of the domain not covered by this region.
    pub fn complement(&self) -> Self {
        Self::difference(&Self::full(self.total), self)
    }

    /// Scans the covered cells, emitting one `(a, b)` pair per contiguous
    /// run along the last axis.
    pub fn scan_lines<F: FnMut(GridPoint<D>, GridPoint<D>)>(&self, mut body: F) {
        for b in &self.boxes {
            b.scan_lines(&mut body);
        }
    }

    /// Resolves the combined domain of a binary operation.
    fn unify_total(a: &Self, b: &Self) -> GridPoint<D> {
        if a.total == GridPoint::zero() {
            return b.total;
        }

        debug_assert!(
            b.total == GridPoint::zero() || a.total == b.total,
            "regions of distinct domains"
        );

        a.total
    }

    fn compress(&mut self) {
        // drop boxes covered by others
        let mut i = 0;
        while i < self.boxes.len() {
            let covered = self
                .boxes
                .iter()
                .enumerate()
                .any(|(j, b)| j != i && b.covers(&self.boxes[i]));

            if covered {
                self.boxes.swap_remove(i);
            } else {
                i += 1;
            }
        }

        // greedy fusion across every axis until a fixed point
        let mut changed = true;
        while changed {
            changed = false;

            'outer: for i in 0..self.boxes.len() {
                for j in i + 1..self.boxes.len() {
                    for d in 0..D {
                        if GridBox::fusable(d, &self.boxes[i], &self.boxes[j]) {
                            let fused = GridBox::fuse(d, &self.boxes[i], &self.boxes[j]);

                            self.boxes[i] = fused;
                            self.boxes.swap_remove(j);
                            changed = true;

                            break 'outer;
                        }
                    }
                }
            }
        }
    }
}

impl<const D: usize> Region for GridRegion<D> {
    fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    fn merge(a: &Self, b: &Self) -> Self {
        if a.is_empty() && b.is_empty() {
            return a.clone();
        }

        let mut res = a.clone();

        res.total = Self::unify_total(a, b);
        res.boxes.extend(Self::difference(b, a).boxes);
        res.compress();
        res
    }

    fn intersect(a: &Self, b: &Self) -> Self {
        if a.is_empty() {
            return a.clone();
        }

        if b.is_empty() {
            return b.clone();
        }

        let mut res = Self::empty(Self::unify_total(a, b));

        for ba in &a.boxes {
            for bb in &b.boxes {
                let cut = GridBox::intersect(ba, bb);

                if !cut.is_empty() {
                    res.boxes.push(cut);
                }
            }
        }

        res.compress();
        res
    }

    fn difference(a: &Self, b: &Self) -> Self {
        if a.is_empty() || b.is_empty() {
            return a.clone();
        }

        let mut res = a.clone();

        res.total = Self::unify_total(a, b);

        for bb in &b.boxes {
            let mut next = Vec::new();

            for ba in &res.boxes {
                next.extend(GridBox::difference(ba, bb));
            }

            res.boxes = next;
        }

        res.compress();
        res
    }
}

impl<const D: usize> PartialEq for GridRegion<D> {
    fn eq(&self, other: &Self) -> bool {
        self.boxes == other.boxes
            || (Self::difference(self, other).is_empty()
                && Self::difference(other, self).is_empty())
    }
}

impl<const D: usize> Eq for GridRegion<D> {}

impl<const D: usize> fmt::Debug for GridRegion<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.total, self.boxes)
    }
}

impl<const D: usize> Serializable for GridRegion<D> {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(&self.total);
        writer.write(&self.boxes);
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        let total = reader.read_trivial()?;
        let boxes = reader.read()?;

        Ok(Self { total, boxes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type R = GridRegion<2>;

    fn total() -> GridPoint<2> {
        [16, 16].into()
    }

    fn region(min: [Coordinate; 2], max: [Coordinate; 2]) -> R {
        R::of(total(), min.into(), max.into())
    }

    #[test]
    fn merge_of_adjacent_halves_fuses() {
        let lower = region([0, 0], [8, 16]);
        let upper = region([8, 0], [16, 16]);

        let merged = R::merge(&lower, &upper);

        assert_eq!(merged.boxes().len(), 1);
        assert_eq!(merged, R::full(total()));
    }

    #[test]
    fn difference_complement_identity() {
        let a = region([0, 0], [10, 10]);
        let b = region([4, 4], [12, 12]);

        assert_eq!(
            R::difference(&a, &b),
            R::intersect(&a, &b.complement())
        );
    }

    #[test]
    fn area_splits_along_difference() {
        let a = region([0, 0], [10, 10]);
        let b = region([3, 3], [7, 7]);

        let outside = R::difference(&a, &b);
        let inside = R::intersect(&a, &b);

        assert_eq!(outside.area() + inside.area(), a.area());
    }
}
