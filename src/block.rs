use std::fmt;

use crate::{ALIGNMENT, arena::Arena};

/// Header size of a block. The header is a single machine word, the payload
/// starts right after it.
pub const HEADER_SIZE: usize = 8;

/// Bit of the header that holds the [`Status`] of the block.
const STATUS_MASK: u64 = 1;

/// Whether a block is available or owned by the client. Encoded in the least
/// significant bit of the header, which is always zero in the size because
/// sizes are multiples of [`ALIGNMENT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Free = 0,
    Used = 1,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Free => f.write_str("free"),
            Status::Used => f.write_str("used"),
        }
    }
}

/// This is the structure of a block. Everything is stored in a single word
/// at the beginning of the block, content is placed after it.
///
/// ```text
/// +---------------------+ <------+
/// | size (63b) | status |        | -> Header (8 bytes)
/// +---------------------+ <------+
/// |       Content       |        |
/// |         ...         |        |
/// |         ...         |        | -> Payload (size - 8 bytes)
/// |         ...         |        |
/// |                     |        |
/// +---------------------+ <------+
/// ```
///
/// `size` counts the header too, so jumping from one header to the next one
/// is just `offset + size`. This struct is only a decoded copy of the header,
/// writing to it doesn't change the arena, see [`encode`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Offset of the header from the arena base.
    pub offset: usize,
    /// Total size of the block, header included.
    pub size: usize,
    /// Free or used.
    pub status: Status,
}

impl Block {
    /// Decodes the header located at `offset`.
    #[inline]
    pub(crate) fn read(arena: &Arena<'_>, offset: usize) -> Self {
        Self {
            offset,
            size: size_of(arena, offset),
            status: status_of(arena, offset),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.status == Status::Free
    }

    /// Offset of the first payload byte.
    #[inline]
    pub fn payload(&self) -> usize {
        self.offset + HEADER_SIZE
    }

    /// Number of bytes available to the client.
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.size - HEADER_SIZE
    }

    /// Offset of the block located right after this one in memory.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Writes the header of a block of `size` bytes at `offset`.
#[inline]
pub(crate) fn encode(arena: &mut Arena<'_>, offset: usize, size: usize, status: Status) {
    debug_assert_eq!(size % ALIGNMENT, 0, "block size {size} is not aligned");

    arena.write_word(offset, size as u64 | status as u64);
}

/// Size of the block at `offset`, header included.
#[inline]
pub(crate) fn size_of(arena: &Arena<'_>, offset: usize) -> usize {
    (arena.read_word(offset) & !STATUS_MASK) as usize
}

/// Returns true if the block at `offset` is free.
#[inline]
pub(crate) fn is_free(arena: &Arena<'_>, offset: usize) -> bool {
    arena.read_word(offset) & STATUS_MASK == 0
}

#[inline]
pub(crate) fn status_of(arena: &Arena<'_>, offset: usize) -> Status {
    if is_free(arena, offset) {
        Status::Free
    } else {
        Status::Used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_size_or_status() {
        let mut buf = [0u8; 32];
        let mut arena = Arena::new(&mut buf);

        encode(&mut arena, 0, 32, Status::Used);
        assert_eq!(arena.read_word(0), 33);

        encode(&mut arena, 8, 24, Status::Free);
        assert_eq!(arena.read_word(8), 24);
    }

    #[test]
    fn decode_masks_status_bit() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::new(&mut buf);

        encode(&mut arena, 0, 48, Status::Used);
        encode(&mut arena, 48, 16, Status::Free);

        assert_eq!(size_of(&arena, 0), 48);
        assert!(!is_free(&arena, 0));
        assert_eq!(size_of(&arena, 48), 16);
        assert!(is_free(&arena, 48));

        let block = Block::read(&arena, 0);
        assert_eq!(block.status, Status::Used);
        assert_eq!(block.payload(), 8);
        assert_eq!(block.payload_size(), 40);
        assert_eq!(block.end(), 48);
    }
}
