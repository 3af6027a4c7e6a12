//! Utilities to reason about flash offsets and granularity.
#![macro_use]

#[macro_export]
macro_rules! kb {
    ($val:expr) => {
        $val * 1024
    };
}
#[macro_export]
macro_rules! mb {
    ($val:expr) => {
        $val * 1024 * 1024
    };
}

/// Whether `value` is a multiple of `granularity`.
pub const fn is_aligned(value: usize, granularity: usize) -> bool { value % granularity == 0 }

/// Rounds `value` up to the next multiple of `granularity`.
pub const fn align_up(value: usize, granularity: usize) -> usize {
    match value % granularity {
        0 => value,
        rest => value + (granularity - rest),
    }
}

/// Rounds `value` down to the previous multiple of `granularity`.
pub const fn align_down(value: usize, granularity: usize) -> usize {
    value - (value % granularity)
}

/// Range of sector indices spanned by `size` bytes starting at `offset`.
/// The start is expected to be sector aligned; a partial trailing
/// sector counts as a whole one.
pub fn sectors_spanned(
    offset: usize,
    size: usize,
    sector_size: usize,
) -> core::ops::Range<usize> {
    let first = offset / sector_size;
    first..(first + align_up(size, sector_size) / sector_size)
}
