use std::iter::FusedIterator;

use crate::{
    ALIGNMENT,
    arena::Arena,
    block::{self, Block},
    freelist,
};

/// Returns the offset of the first free block, walking the headers one by one
/// from the beginning of the arena.
///
/// This is only the entry point of the allocation search. Once we are
/// standing on a free block, the rest of the search follows the free list
/// links and skips every used block in between.
pub(crate) fn first_free(arena: &Arena<'_>) -> Option<usize> {
    Blocks::new(arena).find(Block::is_free).map(|block| block.offset)
}

/// Iterator over every block of the arena in address order, free or not.
///
/// The walk is driven by the sizes stored in the headers and stops as soon
/// as it reaches the end of the arena. A header with size 0, or one that
/// would cross the end of the arena, ends the iteration too, since it could
/// only come from a corrupted heap. The validator reports those cases, this
/// iterator simply refuses to go further.
pub struct Blocks<'h> {
    arena: &'h Arena<'h>,
    offset: usize,
}

impl<'h> Blocks<'h> {
    pub(crate) fn new(arena: &'h Arena<'h>) -> Self {
        Self { arena, offset: 0 }
    }
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.arena.len() {
            return None;
        }

        let block = Block::read(self.arena, self.offset);

        if block.size == 0 || block.end() > self.arena.len() {
            self.offset = self.arena.len();
            return None;
        }

        self.offset = block.end();

        Some(block)
    }
}

impl FusedIterator for Blocks<'_> {}

/// Iterator over the free list. Starts at [`first_free`] and follows the
/// `next` links stored in the payload of each free block.
///
/// Links pointing outside of the arena or to a block that is not free end
/// the iteration.
pub struct FreeBlocks<'h> {
    arena: &'h Arena<'h>,
    current: Option<usize>,
}

impl<'h> FreeBlocks<'h> {
    pub(crate) fn new(arena: &'h Arena<'h>) -> Self {
        Self {
            arena,
            current: first_free(arena),
        }
    }
}

impl Iterator for FreeBlocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.current.take()?;
        let block = Block::read(self.arena, offset);

        self.current = freelist::next_of(self.arena, offset)
            .and_then(|address| self.arena.offset_of(address))
            .filter(|next| {
                *next > offset && *next % ALIGNMENT == 0 && block::is_free(self.arena, *next)
            });

        Some(block)
    }
}

impl FusedIterator for FreeBlocks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Status, encode};

    fn arena_of(buf: &mut [u64]) -> Arena<'_> {
        let len = buf.len() * 8;
        Arena::new(unsafe { std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast(), len) })
    }

    #[test]
    fn blocks_walk_every_header() {
        let mut buf = [0u64; 12];
        let mut arena = arena_of(&mut buf);

        encode(&mut arena, 0, 24, Status::Used);
        encode(&mut arena, 24, 40, Status::Free);
        encode(&mut arena, 64, 32, Status::Used);

        let blocks: Vec<(usize, usize, Status)> = Blocks::new(&arena)
            .map(|block| (block.offset, block.size, block.status))
            .collect();

        assert_eq!(
            blocks,
            vec![(0, 24, Status::Used), (24, 40, Status::Free), (64, 32, Status::Used)]
        );
    }

    #[test]
    fn blocks_stop_on_corrupted_size() {
        let mut buf = [0u64; 8];
        let mut arena = arena_of(&mut buf);

        encode(&mut arena, 0, 24, Status::Used);
        encode(&mut arena, 24, 0, Status::Free);

        assert_eq!(Blocks::new(&arena).count(), 1);
    }

    #[test]
    fn first_free_skips_used_blocks() {
        let mut buf = [0u64; 12];
        let mut arena = arena_of(&mut buf);

        encode(&mut arena, 0, 24, Status::Used);
        encode(&mut arena, 24, 24, Status::Used);
        encode(&mut arena, 48, 48, Status::Free);

        assert_eq!(first_free(&arena), Some(48));

        encode(&mut arena, 48, 48, Status::Used);
        assert_eq!(first_free(&arena), None);
    }

    #[test]
    fn free_blocks_follow_links() {
        let mut buf = [0u64; 16];
        let mut arena = arena_of(&mut buf);

        encode(&mut arena, 0, 24, Status::Used);
        encode(&mut arena, 24, 24, Status::Free);
        encode(&mut arena, 48, 32, Status::Used);
        encode(&mut arena, 80, 48, Status::Free);
        freelist::rebuild(&mut arena);

        let free: Vec<usize> = FreeBlocks::new(&arena).map(|block| block.offset).collect();

        assert_eq!(free, vec![24, 80]);
    }
}
