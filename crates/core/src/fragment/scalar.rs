use tessera_region::{is_sub_region, Region, ScalarRegion};
use tessera_types::{ArchiveReader, ArchiveWriter, Serializable};

use crate::{Fragment, FragmentRef};

/// The fragment of a scalar data item: at most one value, present exactly
/// when the covered region is non-empty.
pub struct ScalarFragment<T> {
    covered: ScalarRegion,
    value: Option<T>,
}

impl<T: Default> ScalarFragment<T> {
    /// Creates a fragment covering `region`.
    pub fn new(region: ScalarRegion) -> Self {
        let mut res = Self {
            covered: ScalarRegion::empty(),
            value: None,
        };

        if !region.is_empty() {
            res.value = Some(T::default());
        }

        res.covered = region;
        res
    }

    /// The stored value, if present.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Mutable access to the stored value, if present.
    pub fn value_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// Produces a façade borrowing this fragment.
    pub fn mask(&mut self) -> Scalar<'_, T> {
        Scalar {
            fragment: FragmentRef::Borrow(self),
        }
    }
}

impl<T: Default + Clone + Serializable> Fragment for ScalarFragment<T> {
    type Region = ScalarRegion;

    fn covered_region(&self) -> &ScalarRegion {
        &self.covered
    }

    fn resize(&mut self, region: &ScalarRegion) {
        if region.is_empty() {
            self.value = None;
        } else if self.value.is_none() {
            self.value = Some(T::default());
        }

        self.covered = *region;
    }

    fn insert_from(&mut self, other: &Self, region: &ScalarRegion) {
        if region.is_empty() {
            return;
        }

        assert!(
            is_sub_region(region, &other.covered),
            "region not covered by the source fragment"
        );
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by the target fragment"
        );

        self.value = other.value.clone();
    }

    fn extract(&self, writer: &mut ArchiveWriter, region: &ScalarRegion) {
        assert!(
            is_sub_region(region, &self.covered),
            "region not covered by this fragment"
        );

        writer.write(region);

        if !region.is_empty() {
            let value = self.value.as_ref().expect("covered fragment without value");

            writer.write(value);
        }
    }

    fn insert_archived(&mut self, reader: &mut ArchiveReader<'_>) -> anyhow::Result<()> {
        let region = reader.read::<ScalarRegion>()?;

        assert!(
            is_sub_region(&region, &self.covered),
            "archived region not covered by this fragment"
        );

        if !region.is_empty() {
            self.value = Some(reader.read()?);
        }

        Ok(())
    }
}

/// The façade presenting a scalar fragment as a plain value holder.
pub struct Scalar<'f, T> {
    fragment: FragmentRef<'f, ScalarFragment<T>>,
}

impl<T: Default> Scalar<'_, T> {
    /// Creates a stand-alone scalar holding `value`.
    pub fn new(value: T) -> Self {
        let mut fragment = ScalarFragment::new(ScalarRegion::full());

        fragment.value = Some(value);

        Self {
            fragment: FragmentRef::Own(Box::new(fragment)),
        }
    }

    /// Returns `true` if the value is locally present.
    pub fn is_present(&self) -> bool {
        !self.fragment.covered.is_empty()
    }

    /// Reads the value.
    ///
    /// Accessing an absent value is a contract violation.
    pub fn get(&self) -> &T {
        self.fragment
            .value
            .as_ref()
            .expect("scalar value accessed outside its covered region")
    }

    /// Replaces the value.
    ///
    /// Assigning to an absent value is a contract violation.
    pub fn set(&mut self, value: T) {
        assert!(
            !self.fragment.covered.is_empty(),
            "scalar value assigned outside its covered region"
        );

        self.fragment.value = Some(value);
    }
}

impl<T: Default> Default for Scalar<'_, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_toggles_presence() {
        let mut fragment = ScalarFragment::<u32>::new(ScalarRegion::empty());

        assert!(fragment.value().is_none());

        fragment.resize(&ScalarRegion::full());

        assert_eq!(fragment.value(), Some(&0));

        fragment.resize(&ScalarRegion::empty());

        assert!(fragment.value().is_none());
    }

    #[test]
    fn value_round_trip_through_archive() -> anyhow::Result<()> {
        let mut src = ScalarFragment::<u32>::new(ScalarRegion::full());

        *src.value_mut().unwrap() = 42;

        let mut writer = ArchiveWriter::new();

        src.extract(&mut writer, &ScalarRegion::full());

        let archive = writer.finish();
        let mut dst = ScalarFragment::<u32>::new(ScalarRegion::full());

        dst.insert_archived(&mut archive.reader())?;

        assert_eq!(dst.value(), Some(&42));

        Ok(())
    }

    #[test]
    fn empty_insert_is_a_no_op() {
        let mut src = ScalarFragment::<u32>::new(ScalarRegion::full());
        let mut dst = ScalarFragment::<u32>::new(ScalarRegion::full());

        *src.value_mut().unwrap() = 9;
        *dst.value_mut().unwrap() = 5;

        dst.insert_from(&src, &ScalarRegion::empty());

        assert_eq!(dst.value(), Some(&5));
    }

    #[test]
    #[should_panic(expected = "outside its covered region")]
    fn assignment_to_absent_value_is_rejected() {
        let mut fragment = ScalarFragment::<u32>::new(ScalarRegion::empty());
        let mut facade = fragment.mask();

        facade.set(7);
    }
}
