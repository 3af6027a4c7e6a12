//! Bitwise checks for NOR flash programming rules.
//!
//! Programming NOR flash can only clear bits; a write is only
//! representable if every '1' it wants is still a '1' in the cell.

use core::ops::BitOr;

/// Checks that every '1' bit is a '1' on the
/// right hand side.
pub trait BitSubset: Copy {
    fn is_subset_of(self, rhs: Self) -> bool;
}

/// Variant of the BitSubset trait for slices.
pub trait SliceBitSubset {
    /// Checks that every '1' in self is '1' in rhs
    fn is_subset_of(self, rhs: Self) -> bool;
}

impl<U: Copy + BitOr<Output = Self> + PartialEq> BitSubset for U {
    fn is_subset_of(self, rhs: Self) -> bool { (self | rhs) == rhs }
}

impl<T: BitSubset> SliceBitSubset for &[T] {
    fn is_subset_of(self, rhs: Self) -> bool {
        self.len() <= rhs.len() && self.iter().zip(rhs.iter()).all(|(a, b)| a.is_subset_of(*b))
    }
}
