use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Deref;

use crate::{ArchiveReader, ArchiveWriter, TriviallySerializable};

/// A contiguous array of POD elements that is either owned or a zero-copy
/// view into an archive buffer.
///
/// Views share the backing buffer with its owner and must not outlive it;
/// cloning always produces an owning table.
pub enum Table<'a, T: TriviallySerializable> {
    /// Heap-allocated elements destructed with the table.
    Owned(Box<[T]>),
    /// A borrowed slice of a buffer produced by [`Table::store`].
    View(&'a [T]),
}

impl<T: TriviallySerializable> Table<'_, T> {
    /// Creates an empty owning table.
    pub fn new() -> Self {
        Self::Owned(Box::default())
    }

    /// Creates an owning table filled with `len` copies of `value`.
    pub fn filled(len: usize, value: T) -> Self {
        Self::Owned(alloc::vec![value; len].into_boxed_slice())
    }

    /// Returns the elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Owned(data) => data,
            Self::View(data) => data,
        }
    }

    /// Returns `true` if the table owns its elements.
    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Mutable access to the elements, promoting a view into an owning
    /// table first.
    pub fn make_mut(&mut self) -> &mut [T] {
        if let Self::View(data) = self {
            *self = Self::Owned((*data).into());
        }

        let Self::Owned(data) = self else {
            unreachable!("view promoted to owned");
        };

        data
    }

    /// Copies the elements into an owning table of unconstrained lifetime.
    pub fn to_owned(&self) -> Table<'static, T> {
        Table::Owned(self.as_slice().into())
    }

    /// Writes the element count, alignment padding, and the raw elements.
    pub fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(&(self.len() as u64));
        writer.align_to(core::mem::align_of::<T>().max(1));
        writer.write_slice(self.as_slice());
    }

    /// Restores an owning table from the reader's current position.
    pub fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Table<'static, T>> {
        let len = reader.read_trivial::<u64>()? as usize;

        reader.align_to(core::mem::align_of::<T>().max(1))?;

        Ok(Table::Owned(reader.consume_slice::<T>(len)?.into()))
    }

    /// Reconstructs a table in place as a view into the reader's buffer.
    pub fn interpret<'b>(reader: &mut ArchiveReader<'b>) -> anyhow::Result<Table<'b, T>> {
        let len = reader.read_trivial::<u64>()? as usize;

        reader.align_to(core::mem::align_of::<T>().max(1))?;

        Ok(Table::View(reader.consume_slice::<T>(len)?))
    }
}

impl<T: TriviallySerializable> From<Vec<T>> for Table<'_, T> {
    fn from(values: Vec<T>) -> Self {
        Self::Owned(values.into_boxed_slice())
    }
}

impl<T: TriviallySerializable> Default for Table<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TriviallySerializable> Clone for Table<'_, T> {
    fn clone(&self) -> Self {
        Self::Owned(self.as_slice().into())
    }
}

impl<T: TriviallySerializable> Deref for Table<'_, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: TriviallySerializable + PartialEq> PartialEq for Table<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: TriviallySerializable + Eq> Eq for Table<'_, T> {}

impl<T: TriviallySerializable + fmt::Debug> fmt::Debug for Table<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArchiveWriter;

    #[test]
    fn store_load_interpret() -> anyhow::Result<()> {
        let table = Table::from(alloc::vec![3u32, 1, 4, 1, 5]);

        let mut writer = ArchiveWriter::new();

        writer.write_trivial(&0xffu8);
        table.store(&mut writer);

        let archive = writer.finish();

        let mut reader = archive.reader();
        reader.read_trivial::<u8>()?;
        let loaded = Table::<u32>::load(&mut reader)?;

        assert!(loaded.is_owner());
        assert_eq!(loaded, table);

        let mut reader = archive.reader();
        reader.read_trivial::<u8>()?;
        let view = Table::<u32>::interpret(&mut reader)?;

        assert!(!view.is_owner());
        assert_eq!(view.as_slice(), table.as_slice());

        Ok(())
    }

    #[test]
    fn truncated_table_fails() {
        let table = Table::from(alloc::vec![1u64, 2, 3]);

        let mut writer = ArchiveWriter::new();

        table.store(&mut writer);

        let archive = writer.finish();
        let truncated = &archive.as_bytes()[..archive.len() - 8];

        assert!(Table::<u64>::load(&mut ArchiveReader::new(truncated)).is_err());
    }
}
