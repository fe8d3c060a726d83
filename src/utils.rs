//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

use crate::{ALIGNMENT, HEADER_SIZE, MIN_PAYLOAD};

/// It aligns `to_be_aligned` using `aligment`.
///
/// This method is used to align segment sizes to be a multiple of [`crate::kernel::page_size`]
/// and block sizes to be a multiple of [`ALIGNMENT`] because every header has to
/// start at an aligned address. `aligment` must be a power of two.
pub fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}

/// Same as [`align`] but returns `None` instead of wrapping around on huge inputs.
pub fn checked_align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    to_be_aligned
        .checked_add(aligment - 1)
        .map(|value| value & !(aligment - 1))
}

/// Total block size needed to serve a request of `requested` payload bytes.
///
/// The payload is aligned to [`ALIGNMENT`] and never smaller than
/// [`MIN_PAYLOAD`], otherwise the block could not hold its free list links
/// once released. The header overhead is added on top.
///
/// ```text
///   requested     payload     block
///       1    ->     16    ->    24
///      16    ->     16    ->    24
///      17    ->     24    ->    32
///     100    ->    104    ->   112
/// ```
///
/// Returns `None` if the computation overflows.
pub fn round_up(requested: usize) -> Option<usize> {
    let payload = checked_align(requested, ALIGNMENT)?.max(MIN_PAYLOAD);

    payload.checked_add(HEADER_SIZE)
}
