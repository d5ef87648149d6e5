use alloc::vec::Vec;
use core::fmt;

use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::{Region, SubMeshRef, SubTreeRef};

/// A union of [`SubMeshRef`]s in canonical form.
///
/// After every mutation the reference list is sorted, duplicate-free, free
/// of references covered by others, and free of sibling pairs fusable into a
/// single wildcarded reference.
#[derive(Clone, Default)]
pub struct MeshRegion {
    refs: Vec<SubMeshRef>,
}

impl MeshRegion {
    /// The empty region.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The region covering the whole mesh.
    pub fn full() -> Self {
        SubMeshRef::root().into()
    }

    /// Builds a region from arbitrary references, restoring the canonical
    /// form.
    pub fn from_refs<I: IntoIterator<Item = SubMeshRef>>(refs: I) -> Self {
        let mut res = Self {
            refs: refs.into_iter().collect(),
        };

        res.restore_set();
        res.compress();
        res
    }

    /// The canonical sorted references.
    pub fn refs(&self) -> &[SubMeshRef] {
        &self.refs
    }

    /// Returns `true` if `r` lies entirely within the region.
    pub fn covers(&self, r: &SubMeshRef) -> bool {
        self.refs.iter().any(|a| a.covers(r))
            || Self::merge(self, &Self::from(*r)) == *self
    }

    /// The sub-meshes not covered by this region.
    pub fn complement(&self) -> Self {
        let mut res = Self::full();

        for cur in &self.refs {
            let mut tmp = Self {
                refs: cur.complement(),
            };

            tmp.restore_set();
            tmp.compress();

            res = Self::intersect(&res, &tmp);
        }

        res
    }

    /// Visits every sub-tree covered by the region.
    pub fn scan<F: FnMut(SubTreeRef)>(&self, mut body: F) {
        for cur in &self.refs {
            cur.scan(&mut body);
        }
    }

    /// Sorts the references and drops duplicates.
    fn restore_set(&mut self) {
        self.refs.sort();
        self.refs.dedup();
    }

    /// Restores canonical form: repeatedly drops covered references and
    /// fuses sibling pairs until stable.
    fn compress(&mut self) {
        loop {
            let removed = self.remove_covered();
            let fused = self.fuse_siblings();

            if !removed && !fused {
                break;
            }
        }
    }

    fn remove_covered(&mut self) -> bool {
        let mut changed = false;
        let mut i = 0;

        while i < self.refs.len() {
            let covered = self
                .refs
                .iter()
                .enumerate()
                .any(|(j, r)| j != i && r.covers(&self.refs[i]) && !self.refs[i].covers(r));

            if covered {
                self.refs.remove(i);
                changed = true;
            } else {
                i += 1;
            }
        }

        changed
    }

    fn fuse_siblings(&mut self) -> bool {
        let mut changed = false;
        let mut i = 0;

        while i < self.refs.len() {
            let mut fused = false;

            for j in i + 1..self.refs.len() {
                let mut merged = self.refs[i];

                if merged.try_merge(&self.refs[j]) {
                    self.refs[i] = merged;
                    self.refs.remove(j);
                    fused = true;
                    changed = true;

                    break;
                }
            }

            if !fused {
                i += 1;
            }
        }

        if changed {
            self.restore_set();
        }

        changed
    }
}

impl Region for MeshRegion {
    fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    fn merge(a: &Self, b: &Self) -> Self {
        let mut refs = Vec::with_capacity(a.refs.len() + b.refs.len());

        // sorted set union
        let (mut i, mut j) = (0, 0);
        while i < a.refs.len() && j < b.refs.len() {
            match a.refs[i].cmp(&b.refs[j]) {
                core::cmp::Ordering::Less => {
                    refs.push(a.refs[i]);
                    i += 1;
                }
                core::cmp::Ordering::Greater => {
                    refs.push(b.refs[j]);
                    j += 1;
                }
                core::cmp::Ordering::Equal => {
                    refs.push(a.refs[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        refs.extend_from_slice(&a.refs[i..]);
        refs.extend_from_slice(&b.refs[j..]);

        let mut res = Self { refs };

        res.compress();
        res
    }

    fn intersect(a: &Self, b: &Self) -> Self {
        let mut res = Self::empty();

        for ra in &a.refs {
            for rb in &b.refs {
                let mut cut = *ra;

                if cut.try_intersect(rb) {
                    res.refs.push(cut);
                }
            }
        }

        res.restore_set();
        res.compress();
        res
    }

    fn difference(a: &Self, b: &Self) -> Self {
        Self::intersect(a, &b.complement())
    }
}

impl From<SubMeshRef> for MeshRegion {
    fn from(r: SubMeshRef) -> Self {
        Self {
            refs: alloc::vec![r],
        }
    }
}

impl From<SubTreeRef> for MeshRegion {
    fn from(r: SubTreeRef) -> Self {
        SubMeshRef::from(r).into()
    }
}

impl PartialEq for MeshRegion {
    fn eq(&self, other: &Self) -> bool {
        self.refs == other.refs
            || (Self::difference(self, other).is_empty()
                && Self::difference(other, self).is_empty())
    }
}

impl Eq for MeshRegion {}

impl fmt::Debug for MeshRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.refs).finish()
    }
}

impl Serializable for MeshRegion {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write(&self.refs);
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        // references written from a canonical region are already canonical
        Ok(Self {
            refs: reader.read()?,
        })
    }
}

/// A borrowed view of a [`MeshRegion`], e.g. a closure slice of a closed
/// partition tree's reference table.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MeshRegionView<'a> {
    refs: &'a [SubMeshRef],
}

impl<'a> MeshRegionView<'a> {
    /// Wraps a canonical reference slice.
    pub fn new(refs: &'a [SubMeshRef]) -> Self {
        Self { refs }
    }

    /// The referenced slice.
    pub fn refs(&self) -> &'a [SubMeshRef] {
        self.refs
    }

    /// Returns `true` if the view denotes the empty region.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Visits every sub-tree covered by the view.
    pub fn scan<F: FnMut(SubTreeRef)>(&self, mut body: F) {
        for cur in self.refs {
            cur.scan(&mut body);
        }
    }

    /// Copies the view into an owning region.
    pub fn to_region(&self) -> MeshRegion {
        MeshRegion {
            refs: self.refs.to_vec(),
        }
    }
}

impl fmt::Debug for MeshRegionView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.refs).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_and_right_compress_to_root() {
        let left = MeshRegion::from(SubTreeRef::root().left());
        let right = MeshRegion::from(SubTreeRef::root().right());

        let merged = MeshRegion::merge(&left, &right);

        assert_eq!(merged.refs().len(), 1);
        assert_eq!(merged, MeshRegion::full());
    }

    #[test]
    fn complement_splits_and_rejoins() {
        let left = MeshRegion::from(SubTreeRef::root().left());
        let complement = left.complement();

        assert_eq!(complement, MeshRegion::from(SubTreeRef::root().right()));
        assert_eq!(MeshRegion::merge(&left, &complement), MeshRegion::full());
        assert!(MeshRegion::intersect(&left, &complement).is_empty());
    }

    #[test]
    fn difference_with_self_is_empty() {
        let region = MeshRegion::from_refs([
            SubTreeRef::root().left().left().into(),
            SubTreeRef::root().right().into(),
        ]);

        assert!(MeshRegion::difference(&region, &region).is_empty());
    }

    #[test]
    fn scan_enumerates_leaf_subtrees() {
        let region = MeshRegion::from(SubTreeRef::root().left());
        let mut seen = Vec::new();

        region.scan(|r| seen.push(r));

        assert_eq!(seen, alloc::vec![SubTreeRef::root().left()]);
    }
}
