//! Error types of the allocator.
//!
//! Running out of memory is an expected outcome and is reported through
//! [`AllocError`]. A broken heap is not, and it gets its own type,
//! [`IntegrityViolation`], so callers can tell them apart.

use thiserror::Error;

use crate::{ALIGNMENT, MIN_BLOCK_SIZE};

/// Reasons for [`crate::Heap::init`] to refuse an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// Not even one minimal block fits in the arena.
    #[error("arena of {len} bytes is smaller than the minimum of {} bytes", MIN_BLOCK_SIZE)]
    TooSmall { len: usize },

    /// The last block would not end on an aligned boundary.
    #[error("arena length {len} is not a multiple of {}", ALIGNMENT)]
    UnalignedLength { len: usize },

    /// Headers have to live at aligned addresses.
    #[error("arena base {base:#x} is not aligned to {} bytes", ALIGNMENT)]
    MisalignedBase { base: usize },
}

/// Reasons for an allocation request to fail. None of them modify the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("zero sized allocation")]
    ZeroSize,

    /// Request above the configured maximum (or so large the block size
    /// computation overflows).
    #[error("request of {requested} bytes exceeds the maximum of {max} bytes")]
    TooLarge { requested: usize, max: usize },

    /// No free block is large enough, or the arena would be over committed.
    #[error("out of memory: {needed} bytes needed, {used} of {capacity} bytes in use")]
    OutOfMemory {
        needed: usize,
        used: usize,
        capacity: usize,
    },
}

/// Inconsistency found by [`crate::Heap::check`]. Any of these means a bug
/// in the allocator or a client writing outside of its blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("{used} bytes in use but the arena only has {capacity}")]
    Overcommitted { used: usize, capacity: usize },

    #[error("block at offset {offset} (address {address:#x}) is not aligned to {} bytes", ALIGNMENT)]
    Misaligned { offset: usize, address: usize },

    #[error("block at offset {offset} has invalid size {size}")]
    BadSize { offset: usize, size: usize },

    #[error("block at offset {offset} of size {size} crosses the end of the arena ({capacity} bytes)")]
    Overrun {
        offset: usize,
        size: usize,
        capacity: usize,
    },

    #[error("{recorded} bytes recorded in use but used blocks add up to {actual}")]
    UsageMismatch { recorded: usize, actual: usize },

    #[error("free list link of block at offset {offset} is broken")]
    BrokenLink { offset: usize },
}

/// Failure to obtain memory for a [`crate::kernel::Segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("cannot map an empty segment")]
    Empty,

    #[error("the operating system refused to map {len} bytes")]
    MapFailed { len: usize },
}

/// Errors produced while parsing or replaying an allocator script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: unknown block id {id}")]
    UnknownId { line: usize, id: usize },

    /// `a <id>` for an id that still owns a block.
    #[error("line {line}: block {id} is already allocated")]
    AlreadyLive { line: usize, id: usize },

    #[error("line {line}: contents of block {id} were corrupted")]
    Corrupted { line: usize, id: usize },

    #[error("line {line}: heap is inconsistent: {source}")]
    Integrity {
        line: usize,
        #[source]
        source: IntegrityViolation,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
