use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::Region;

/// The region of a scalar data item: the unit value is either present or
/// absent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScalarRegion(
    /// Whether the unit value is present.
    pub bool,
);

impl ScalarRegion {
    /// The region containing the scalar value.
    pub fn full() -> Self {
        Self(true)
    }

    /// The empty region.
    pub fn empty() -> Self {
        Self(false)
    }

    /// The present/absent complement.
    pub fn complement(&self) -> Self {
        Self(!self.0)
    }
}

impl Region for ScalarRegion {
    fn is_empty(&self) -> bool {
        !self.0
    }

    fn merge(a: &Self, b: &Self) -> Self {
        Self(a.0 || b.0)
    }

    fn intersect(a: &Self, b: &Self) -> Self {
        Self(a.0 && b.0)
    }

    fn difference(a: &Self, b: &Self) -> Self {
        Self(a.0 && !b.0)
    }
}

impl Serializable for ScalarRegion {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write(&self.0);
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        Ok(Self(reader.read()?))
    }
}
