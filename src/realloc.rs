use std::ptr::NonNull;

use crate::{
    MIN_BLOCK_SIZE,
    block::{self, Block, Status},
    freelist,
    heap::Heap,
    utils::round_up,
};

/// This is used to carry resize metadata around so we don't have to pass
/// the same parameters over and over again.
struct Realloc {
    /// Source block, the one whose contents we are trying to resize.
    block: Block,
    /// Current client address, payload of `block`.
    address: NonNull<u8>,
    /// Size the client asked for.
    size: usize,
    /// Block size needed to hold `size`, header included.
    needed: usize,
}

impl Realloc {
    /// Number of bytes that should be copied if the contents have to move. If
    /// we are shrinking, we only need to copy enough bytes to fill the new
    /// size, otherwise we'll copy the whole previous payload.
    fn count(&self) -> usize {
        self.block.payload_size().min(self.size)
    }
}

impl Heap<'_> {
    /// Changes the size of the block at `address` to `size` bytes.
    ///
    /// - `address == None` behaves like [`Heap::allocate`].
    /// - `size == 0` behaves like [`Heap::release`] and returns `None`.
    ///
    /// Otherwise, if the block right after this one is free and both together
    /// have room for `size` bytes plus a new free block, the resize happens in
    /// place and the same address is returned:
    ///
    /// ```text
    /// Before:
    /// +--------+--------------+--------+----------------------------+
    /// | Header |   Payload    | Header |            Free            |
    /// +--------+--------------+--------+----------------------------+
    ///
    /// After:
    /// +--------+-----------------------------+--------+-------------+
    /// | Header |           Payload           | Header |    Free     |
    /// +--------+-----------------------------+--------+-------------+
    /// ```
    ///
    /// If not, a new block is allocated, the contents are copied over and the
    /// old block is released. When that allocation fails `None` is returned
    /// and the old block is left exactly as it was, still owned by the
    /// client.
    pub fn resize(&mut self, address: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let Some(address) = address else {
            return self.allocate(size);
        };

        if size == 0 {
            self.release(Some(address));
            return None;
        }

        let block = self.used_block_of(address, "resize")?;
        let max = self.config().max_request_size();

        let Some(needed) = round_up(size).filter(|needed| *needed <= max) else {
            log::debug!("resize({address:p}, {size}) failed: request exceeds {max} bytes");
            return None;
        };

        let realloc = Realloc {
            block,
            address,
            size,
            needed,
        };

        if self.resize_in_place(&realloc) {
            return Some(address);
        }

        self.move_to_new_block(&realloc)
    }

    /// Tries to absorb the free block right after `realloc.block`. Returns
    /// false without touching anything if there's no room.
    fn resize_in_place(&mut self, realloc: &Realloc) -> bool {
        let Realloc { block, needed, .. } = *realloc;
        let next = block.end();

        if next >= self.capacity() || !block::is_free(self.arena(), next) {
            return false;
        }

        let combined = block.size + block::size_of(self.arena(), next);

        if combined < needed + MIN_BLOCK_SIZE {
            return false;
        }

        let arena = self.arena_mut();
        block::encode(arena, block.offset, needed, Status::Used);
        block::encode(arena, block.offset + needed, combined - needed, Status::Free);
        freelist::rebuild(arena);

        self.set_used(self.used() - block.size + needed);

        log::trace!(
            "resize({:p}, {}): in place, {} -> {needed} bytes, {} bytes in use",
            realloc.address,
            realloc.size,
            block.size,
            self.used()
        );

        true
    }

    /// Allocate, copy, release. The old block is only released once the
    /// contents are safe in the new one.
    fn move_to_new_block(&mut self, realloc: &Realloc) -> Option<NonNull<u8>> {
        let Some(new_address) = self.allocate(realloc.size) else {
            log::debug!(
                "resize({:p}, {}) failed: no room for a new block, old block kept",
                realloc.address,
                realloc.size
            );
            return None;
        };

        let destination = new_address.as_ptr() as usize - self.arena().base().as_ptr() as usize;
        let count = realloc.count();

        self.arena_mut()
            .copy_within(realloc.block.payload(), destination, count);
        self.release(Some(realloc.address));

        log::trace!(
            "resize({:p}, {}): moved {count} bytes to {new_address:p}",
            realloc.address,
            realloc.size
        );

        Some(new_address)
    }
}
