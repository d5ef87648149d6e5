use alloc::string::String;
use alloc::vec::Vec;
use core::hash::{BuildHasher, Hash};

use hashbrown::HashMap;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{ArchiveReader, ArchiveWriter};

/// A type whose bytes carry its full value.
///
/// Writing and reading such a type reduces to a copy of `size_of::<T>()`
/// bytes; slices of it can additionally be interpreted in place from an
/// archive buffer. Satisfied by any `Copy` type implementing the zerocopy
/// byte-transmutation traits.
pub trait TriviallySerializable: FromBytes + IntoBytes + KnownLayout + Immutable + Copy {}

impl<T> TriviallySerializable for T where T: FromBytes + IntoBytes + KnownLayout + Immutable + Copy {}

/// A type that can be written to and restored from an archive.
///
/// The encoding is positional; `load` must mirror `store` exactly.
pub trait Serializable: Sized {
    /// Writes the value at the writer's current position.
    fn store(&self, writer: &mut ArchiveWriter);

    /// Restores a value from the reader's current position.
    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self>;
}

/// Implements [`Serializable`] through the raw byte copy of
/// [`TriviallySerializable`].
#[macro_export]
macro_rules! impl_trivial_serialization {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::Serializable for $ty {
            fn store(&self, writer: &mut $crate::ArchiveWriter) {
                writer.write_trivial(self);
            }

            fn load(reader: &mut $crate::ArchiveReader<'_>) -> ::anyhow::Result<Self> {
                reader.read_trivial()
            }
        }
    )*};
}

impl_trivial_serialization!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl Serializable for bool {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(&(*self as u8));
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        Ok(reader.read_trivial::<u8>()? != 0)
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(&(self.len() as u64));

        for value in self {
            value.store(writer);
        }
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        let len = reader.read_trivial::<u64>()? as usize;
        let mut values = Vec::with_capacity(len.min(reader.remaining()));

        for _ in 0..len {
            values.push(T::load(reader)?);
        }

        Ok(values)
    }
}

impl Serializable for String {
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(&(self.len() as u64));
        writer.write_slice(self.as_bytes());
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        let len = reader.read_trivial::<u64>()? as usize;
        let bytes = reader.consume_slice::<u8>(len)?;

        String::from_utf8(bytes.to_vec()).map_err(|_| anyhow::anyhow!("invalid utf-8 in archive"))
    }
}

impl<A: Serializable, B: Serializable> Serializable for (A, B) {
    fn store(&self, writer: &mut ArchiveWriter) {
        self.0.store(writer);
        self.1.store(writer);
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        Ok((A::load(reader)?, B::load(reader)?))
    }
}

impl<K, V, S> Serializable for HashMap<K, V, S>
where
    K: Serializable + Eq + Hash,
    V: Serializable,
    S: BuildHasher + Default,
{
    fn store(&self, writer: &mut ArchiveWriter) {
        writer.write_trivial(&(self.len() as u64));

        for (key, value) in self {
            key.store(writer);
            value.store(writer);
        }
    }

    fn load(reader: &mut ArchiveReader<'_>) -> anyhow::Result<Self> {
        let len = reader.read_trivial::<u64>()? as usize;
        let mut map = Self::with_capacity_and_hasher(len.min(reader.remaining()), S::default());

        for _ in 0..len {
            let key = K::load(reader)?;
            let value = V::load(reader)?;

            map.insert(key, value);
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;
    use crate::ArchiveWriter;

    #[test]
    fn nested_containers() -> anyhow::Result<()> {
        let mut map = HashMap::<u32, Vec<u64>>::new();

        map.insert(1, alloc::vec![2, 3]);
        map.insert(4, alloc::vec![]);

        let value = ("label".to_string(), map);

        let mut writer = ArchiveWriter::new();

        writer.write(&value);

        let archive = writer.finish();
        let restored = archive.reader().read::<(String, HashMap<u32, Vec<u64>>)>()?;

        assert_eq!(restored, value);

        Ok(())
    }
}
