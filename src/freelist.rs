use crate::{
    arena::{Arena, WORD_SIZE},
    block::{Block, HEADER_SIZE},
};

/// Size of one free list link.
pub const LINK_SIZE: usize = WORD_SIZE;

/// Offset of the `prev` link relative to the block header.
const PREV_LINK: usize = HEADER_SIZE;

/// Offset of the `next` link relative to the block header.
const NEXT_LINK: usize = HEADER_SIZE + LINK_SIZE;

/// The free list keeps track of free blocks. We don't actually need to store
/// any additional structure for it, the payload of every free block is empty
/// and won't be used by the user, so that's where the links go:
///
/// ```text
/// +------------------------+ <--------+
/// |     size | status 0    |          |-------> Block Header
/// +------------------------+ <--------+
/// |   prev free address    |          |
/// +------------------------+          |-------> Free list node
/// |   next free address    |          |
/// +------------------------+ <--------+
/// |                        |
/// |      Free Payload      |
/// |        (unused)        |
/// |          ...           |
/// +------------------------+
/// ```
///
/// Links are absolute addresses so the layout matches dumps produced by other
/// implementations of the same heap format. `0` means there is no link.
///
/// Inside of the arena this looks something like this:
///
/// ```text
///                        Next free block                  Next free block
///                +----------------------------+  +-------------------------------+
///                |                            |  |                               |
/// +--------------|-------------------------+--|--|-------------------------------|---+
/// | +------+   +-|----+   +-------+   +------+--+  +-------+   +-------+   +-------+ |
/// | | Used | > | Free | > | Used  | > | Free |  >  | Used  | > | Used  | > | Free  | |
/// | +------+   +------+   +-------+   +------+     +-------+   +-------+   +-------+ |
/// +-----------------------------------------------------------------------------------+
/// ```
///
/// These helpers must only be called on free blocks, otherwise they would
/// overwrite client data.
#[inline]
pub(crate) fn prev_of(arena: &Arena<'_>, block: usize) -> Option<usize> {
    link(arena.read_word(block + PREV_LINK))
}

/// Address of the next free block, see [`prev_of`].
#[inline]
pub(crate) fn next_of(arena: &Arena<'_>, block: usize) -> Option<usize> {
    link(arena.read_word(block + NEXT_LINK))
}

#[inline]
pub(crate) fn set_prev(arena: &mut Arena<'_>, block: usize, prev: Option<usize>) {
    arena.write_word(block + PREV_LINK, prev.unwrap_or(0) as u64);
}

#[inline]
pub(crate) fn set_next(arena: &mut Arena<'_>, block: usize, next: Option<usize>) {
    arena.write_word(block + NEXT_LINK, next.unwrap_or(0) as u64);
}

#[inline]
fn link(word: u64) -> Option<usize> {
    (word != 0).then_some(word as usize)
}

/// Rebuilds every link of the free list from scratch.
///
/// Walks the whole arena in address order. Each free block is linked back to
/// the previous free block found (if any), that block's `next` is pointed
/// at it, and its own `next` is cleared until a later free block shows up.
/// Nothing from the previous state of the list is trusted, so this also
/// repairs the links after multiple blocks have been merged.
///
/// Returns the number of free blocks.
pub(crate) fn rebuild(arena: &mut Arena<'_>) -> usize {
    let mut offset = 0;
    let mut prev: Option<usize> = None;
    let mut count = 0;

    while offset < arena.len() {
        let block = Block::read(arena, offset);

        // Only a corrupted header can have size 0, stop instead of spinning.
        if block.size == 0 {
            break;
        }

        if block.is_free() {
            let prev_address = prev.map(|prev| arena.address_of(prev));
            set_prev(arena, offset, prev_address);

            if let Some(prev) = prev {
                let address = arena.address_of(offset);
                set_next(arena, prev, Some(address));
            }

            set_next(arena, offset, None);
            prev = Some(offset);
            count += 1;
        }

        offset = block.end();
    }

    log::trace!("free list rebuilt: {count} free blocks");

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Status, encode};

    fn arena_of(buf: &mut [u64]) -> Arena<'_> {
        let len = buf.len() * 8;
        Arena::new(unsafe { std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), len) })
    }

    #[test]
    fn links_live_in_the_payload() {
        let mut buf = [0u64; 4];
        let mut arena = arena_of(&mut buf);
        encode(&mut arena, 0, 32, Status::Free);

        set_prev(&mut arena, 0, Some(0x1000));
        set_next(&mut arena, 0, None);

        assert_eq!(arena.read_word(8), 0x1000);
        assert_eq!(arena.read_word(16), 0);
        assert_eq!(prev_of(&arena, 0), Some(0x1000));
        assert_eq!(next_of(&arena, 0), None);
    }

    #[test]
    fn rebuild_links_free_blocks_in_address_order() {
        let mut buf = [0u64; 16];
        let mut arena = arena_of(&mut buf);

        // free(24) used(32) free(24) used(24) free(24)
        encode(&mut arena, 0, 24, Status::Free);
        encode(&mut arena, 24, 32, Status::Used);
        encode(&mut arena, 56, 24, Status::Free);
        encode(&mut arena, 80, 24, Status::Used);
        encode(&mut arena, 104, 24, Status::Free);

        assert_eq!(rebuild(&mut arena), 3);

        let (a, b, c) = (arena.address_of(0), arena.address_of(56), arena.address_of(104));

        assert_eq!(prev_of(&arena, 0), None);
        assert_eq!(next_of(&arena, 0), Some(b));
        assert_eq!(prev_of(&arena, 56), Some(a));
        assert_eq!(next_of(&arena, 56), Some(c));
        assert_eq!(prev_of(&arena, 104), Some(b));
        assert_eq!(next_of(&arena, 104), None);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let mut buf = [0u64; 12];
        let mut arena = arena_of(&mut buf);

        encode(&mut arena, 0, 32, Status::Free);
        encode(&mut arena, 32, 32, Status::Used);
        encode(&mut arena, 64, 32, Status::Free);

        rebuild(&mut arena);
        let first = arena.bytes(0, 96).to_vec();
        rebuild(&mut arena);

        assert_eq!(arena.bytes(0, 96), first.as_slice());
    }

    #[test]
    fn rebuild_leaves_used_payload_alone() {
        let mut buf = [0u64; 6];
        let mut arena = arena_of(&mut buf);

        encode(&mut arena, 0, 24, Status::Used);
        arena.write_word(8, 0xAAAA);
        arena.write_word(16, 0xBBBB);
        encode(&mut arena, 24, 24, Status::Free);

        rebuild(&mut arena);

        assert_eq!(arena.read_word(8), 0xAAAA);
        assert_eq!(arena.read_word(16), 0xBBBB);
    }
}
