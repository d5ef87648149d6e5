use alloc::vec;
use alloc::vec::Vec;
use zerocopy::{FromBytes, IntoBytes};

use crate::{Serializable, TriviallySerializable};

/// A finalized, immutable byte stream produced by an [`ArchiveWriter`].
///
/// The backing storage is 8-byte aligned so that positional views produced by
/// [`ArchiveReader::consume_slice`] satisfy the alignment of every trivially
/// serializable element type up to `u64`.
pub struct Archive {
    words: Vec<u64>,
    len: usize,
}

impl Archive {
    /// Wraps raw bytes, copying them into aligned storage.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len();
        let mut words = vec![0u64; len.div_ceil(8)];
        words.as_mut_bytes()[..len].copy_from_slice(bytes);

        Self { words, len }
    }

    /// Returns the serialized bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.words.as_bytes()[..self.len]
    }

    /// Returns the number of bytes in the archive.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the archive holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Creates a positional reader over the archive contents.
    pub fn reader(&self) -> ArchiveReader<'_> {
        ArchiveReader::new(self.as_bytes())
    }
}

/// An append-only serialization sink.
#[derive(Debug, Default, Clone)]
pub struct ArchiveWriter {
    bytes: Vec<u8>,
}

impl ArchiveWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes a value at the current position.
    pub fn write<T: Serializable>(&mut self, value: &T) {
        value.store(self);
    }

    /// Appends the raw bytes of a trivially serializable value.
    pub fn write_trivial<T: TriviallySerializable>(&mut self, value: &T) {
        self.bytes.extend_from_slice(value.as_bytes());
    }

    /// Appends the raw bytes of a slice of trivially serializable values.
    ///
    /// No length prefix is emitted; the framing is positional.
    pub fn write_slice<T: TriviallySerializable>(&mut self, values: &[T]) {
        self.bytes.extend_from_slice(values.as_bytes());
    }

    /// Pads the stream with zero bytes so the next write lands on a position
    /// that is a multiple of `align`.
    pub fn align_to(&mut self, align: usize) {
        debug_assert!(align.is_power_of_two());

        while self.bytes.len() % align != 0 {
            self.bytes.push(0);
        }
    }

    /// Returns the current write position in bytes.
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    /// Finalizes the stream into an [`Archive`].
    pub fn finish(self) -> Archive {
        Archive::from_bytes(&self.bytes)
    }
}

/// A positional cursor over a serialized byte stream.
///
/// There is no type framing; reads must mirror the writes that produced the
/// stream. Reads past the end fail with an end-of-archive error.
pub struct ArchiveReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ArchiveReader<'a> {
    /// Creates a reader positioned at the start of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Deserializes a value at the current position.
    pub fn read<T: Serializable>(&mut self) -> anyhow::Result<T> {
        T::load(self)
    }

    /// Reads a trivially serializable value by copying its bytes.
    pub fn read_trivial<T: TriviallySerializable>(&mut self) -> anyhow::Result<T> {
        let bytes = self.take(core::mem::size_of::<T>())?;

        T::read_from_bytes(bytes).map_err(|_| anyhow::anyhow!("inconsistent value bytes"))
    }

    /// Interprets the next `n` elements in place, advancing the cursor by
    /// `n * size_of::<T>()` bytes.
    ///
    /// The view borrows the underlying buffer; the current position must be
    /// aligned for `T` (see [`ArchiveReader::align_to`]).
    pub fn consume_slice<T: TriviallySerializable>(&mut self, n: usize) -> anyhow::Result<&'a [T]> {
        let bytes = self.take(n * core::mem::size_of::<T>())?;

        <[T]>::ref_from_bytes(bytes)
            .map_err(|_| anyhow::anyhow!("unsupported layout; misaligned table in archive"))
    }

    /// Advances the cursor past the padding emitted by
    /// [`ArchiveWriter::align_to`].
    pub fn align_to(&mut self, align: usize) -> anyhow::Result<()> {
        debug_assert!(align.is_power_of_two());

        while self.cursor % align != 0 {
            self.take(1)?;
        }

        Ok(())
    }

    /// Returns the current read position in bytes.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Returns the number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        if self.remaining() < n {
            anyhow::bail!(
                "unexpected end of archive; {n} bytes requested at position {}, {} available",
                self.cursor,
                self.remaining()
            );
        }

        let bytes = &self.bytes[self.cursor..self.cursor + n];

        self.cursor += n;

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn positional_round_trip() -> anyhow::Result<()> {
        let mut writer = ArchiveWriter::new();

        writer.write(&42u32);
        writer.write(&u64::MAX);
        writer.write_slice(&[1u16, 2, 3]);

        let archive = writer.finish();
        let mut reader = archive.reader();

        assert_eq!(reader.read::<u32>()?, 42);
        assert_eq!(reader.read::<u64>()?, u64::MAX);
        assert_eq!(reader.consume_slice::<u16>(3)?, &[1, 2, 3]);
        assert_eq!(reader.remaining(), 0);

        Ok(())
    }

    #[test]
    fn read_past_end_fails() {
        let mut writer = ArchiveWriter::new();

        writer.write(&7u8);

        let archive = writer.finish();
        let mut reader = archive.reader();

        assert!(reader.read::<u64>().is_err());
    }

    #[test]
    fn alignment_padding_is_consumed() -> anyhow::Result<()> {
        let mut writer = ArchiveWriter::new();

        writer.write(&1u8);
        writer.align_to(8);
        writer.write_slice(&[3u64, 4]);

        let archive = writer.finish();
        let mut reader = archive.reader();

        assert_eq!(reader.read::<u8>()?, 1);

        reader.align_to(8)?;

        assert_eq!(reader.consume_slice::<u64>(2)?, &[3, 4]);

        Ok(())
    }

    #[test]
    fn container_round_trip() -> anyhow::Result<()> {
        let values: Vec<u32> = (0..17).collect();

        let mut writer = ArchiveWriter::new();

        writer.write(&values);

        let archive = writer.finish();

        assert_eq!(archive.reader().read::<Vec<u32>>()?, values);

        Ok(())
    }
}
