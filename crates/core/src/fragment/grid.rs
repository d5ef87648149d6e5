use tessera_region::{is_sub_region, GridPoint, GridRegion, Region};
use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::{Fragment, FragmentRef, LargeArray};

/// The fragment of a dense `D`-dimensional grid data item.
///
/// One sparse backing array spans the full domain volume; physical memory is
/// committed only for the covered region, line by line.
pub struct GridFragment<T, const D: usize> {
    covered: GridRegion<D>,
    data: LargeArray<T>,
}

impl<T: Default + Clone, const D: usize> GridFragment<T, D> {
    /// Creates a fragment covering `region` within its domain.
    pub fn new(region: GridRegion<D>) -> Self {
        let mut data = LargeArray::new(region.total().volume());
        let strides = strides(region.total());

        region.scan_lines(|a, b| {
            data.allocate(flatten(&strides, &a), flatten(&strides, &b));
        });

        Self {
            covered: region,
            data,
        }
    }

    /// The extent of the full grid domain.
    pub fn total_size(&self) -> &GridPoint<D> {
        self.covered.total()
    }

    /// Reads the cell at `pos`.
    pub fn get(&self, pos: &GridPoint<D>) -> &T {
        &self.data[self.flatten_pos(pos)]
    }

    /// Writes the cell at `pos`.
    pub fn set(&mut self, pos: &GridPoint<D>, value: T) {
        let idx = self.flatten_pos(pos);

        self.data[idx] = value;
    }

    /// Produces a façade borrowing this fragment.
    pub fn mask(&mut self) -> Grid<'_, T, D> {
        Grid {
            fragment: FragmentRef::Borrow(self),
        }
    }

    fn flatten_pos(&self, pos: &GridPoint<D>) -> usize {
        flatten(&strides(self.covered.total()), pos)
    }
}

impl<T: Default + Clone + Serializable, const D: usize> Fragment for GridFragment<T, D> {
    type Region = GridRegion<D>;

    fn covered_region(&self) -> &GridRegion<D> {
        &self.covered
    }

    fn resize(&mut self, region: &GridRegion<D>) {
        assert_eq!(
            self.covered.total(),
            region.total(),
            "resize must keep the grid domain fixed"
        );

        let plus = GridRegion::difference(region, &self.covered);
        let minus = GridRegion::difference(&self.covered, region);
        let strides = strides(region.total());

        self.covered = region.clone();

        plus.scan_lines(|a, b| {
            self.data.allocate(flatten(&strides, &a), flatten(&strides, &b));
        });

        minus.scan_lines(|a, b| {
            self.data.free(flatten(&strides, &a), flatten(&strides, &b));
        });

        tracing::debug!(
            allocated = plus.area(),
            freed = minus.area(),
            "grid fragment resized"
        );
    }

    fn insert_from(&mut self, other: &Self, region: &GridRegion<D>) {
        assert!(
            is_sub_region(region, &other.covered),
            "region not covered by the source fragment"
        );
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by the target fragment"
        );

        let strides = strides(self.covered.total());

        region.scan_lines(|a, b| {
            self.data
                .copy_run_from(&other.data, flatten(&strides, &a), flatten(&strides, &b));
        });
    }

    fn extract(&self, writer: &mut ArchiveWriter, region: &GridRegion<D>) {
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by this fragment"
        );

        writer.write(region);

        let strides = strides(self.covered.total());

        region.scan_lines(|a, b| {
            self.data
                .for_each_chunk(flatten(&strides, &a), flatten(&strides, &b), |chunk| {
                    for value in chunk {
                        writer.write(value);
                    }
                });
        });
    }

    fn insert_archived(&mut self, reader: &mut ArchiveReader<'_>) -> anyhow::Result<()> {
        let region = reader.read::<GridRegion<D>>()?;

        assert!(
            is_sub_region(&region, &self.covered),
            "archived region not covered by this fragment"
        );

        let strides = strides(self.covered.total());
        let mut failure = None;

        region.scan_lines(|a, b| {
            if failure.is_some() {
                return;
            }

            let start = flatten(&strides, &a);
            let end = flatten(&strides, &b);

            self.data.for_each_chunk_mut(start, end, |chunk| {
                for value in chunk {
                    match reader.read() {
                        Ok(v) => *value = v,
                        Err(e) => {
                            failure.get_or_insert(e);
                            return;
                        }
                    }
                }
            });
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Row-major strides of a domain: the last axis is contiguous.
fn strides<const D: usize>(total: &GridPoint<D>) -> [usize; D] {
    let mut res = [1usize; D];

    for i in (0..D.saturating_sub(1)).rev() {
        res[i] = res[i + 1] * total[i + 1].max(0) as usize;
    }

    res
}

/// Row-major flattening of a point.
fn flatten<const D: usize>(strides: &[usize; D], pos: &GridPoint<D>) -> usize {
    let mut res = 0usize;

    for i in 0..D {
        res += pos[i] as usize * strides[i];
    }

    res
}

/// The façade presenting a grid fragment as a dense grid.
pub struct Grid<'f, T, const D: usize> {
    fragment: FragmentRef<'f, GridFragment<T, D>>,
}

impl<T: Default + Clone, const D: usize> Grid<'_, T, D> {
    /// Creates a stand-alone grid covering the full domain.
    pub fn new(size: GridPoint<D>) -> Self {
        Self {
            fragment: FragmentRef::Own(Box::new(GridFragment::new(GridRegion::full(size)))),
        }
    }

    /// The extent of the grid.
    pub fn size(&self) -> &GridPoint<D> {
        self.fragment.total_size()
    }

    /// Reads the cell at `pos`.
    pub fn get(&self, pos: &GridPoint<D>) -> &T {
        self.fragment.get(pos)
    }

    /// Writes the cell at `pos`.
    pub fn set(&mut self, pos: &GridPoint<D>, value: T) {
        self.fragment.set(pos, value);
    }
}
