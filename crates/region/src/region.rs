use tessera_types::Serializable;

/// The algebra every region type satisfies.
///
/// Implementations must uphold the set laws: `merge` and `intersect` are
/// commutative, associative, and idempotent, `intersect` distributes over
/// `merge`, and `difference(a, a)` is empty.
pub trait Region: Clone + PartialEq + Serializable {
    /// Returns `true` if the region denotes the empty set.
    fn is_empty(&self) -> bool;

    /// The set union of two regions.
    fn merge(a: &Self, b: &Self) -> Self;

    /// The set intersection of two regions.
    fn intersect(a: &Self, b: &Self) -> Self;

    /// The elements of `a` not contained in `b`.
    fn difference(a: &Self, b: &Self) -> Self;
}

/// Returns `true` if `a` denotes a subset of `b`.
pub fn is_sub_region<R: Region>(a: &R, b: &R) -> bool {
    R::difference(a, b).is_empty()
}
