use std::ptr::NonNull;

use crate::{
    ALIGNMENT, MIN_BLOCK_SIZE,
    arena::Arena,
    block::{self, Block, HEADER_SIZE, Status},
    config::HeapConfig,
    error::{AllocError, InitError},
    freelist,
    list::{self, Blocks, FreeBlocks},
    utils::round_up,
};

/// Explicit free list allocator working inside a single [`Arena`].
///
/// ```text
///                      Next free block                    Next free block
///           +------------------------------+  +------------------------------------+
///           |                              |  |                                    |
/// +---------|------------------------------|--|------------------------------------|-------+
/// | +------+--+   +-------+   +-------+   +--|---+   +-------+   +-------+   +-----+--+    |
/// | | Free    | > | Used  | > | Used  | > | Free | > | Used  | > | Used  | > | Free   |    |
/// | +---------+   +-------+   +-------+   +------+   +-------+   +-------+   +--------+    |
/// +-----------------------------------------------------------------------------------------+
///   base                                                                       base + len
/// ```
///
/// Every byte of the arena belongs to exactly one block. Free blocks are
/// chained in address order through their own payload (see
/// [`crate::freelist`]) and the whole chain is rebuilt after each operation
/// that changes a header. That costs a walk over every block per call, but
/// the list can never drift out of sync with the headers.
///
/// The heap keeps a running count of bytes in use (headers included) so
/// hopeless requests are rejected without scanning.
pub struct Heap<'a> {
    /// Memory we are managing.
    arena: Arena<'a>,
    /// Sum of the sizes of every used block.
    nused: usize,
    /// Policy knobs.
    config: HeapConfig,
}

impl<'a> Heap<'a> {
    /// Takes ownership of `arena` and formats it as a single free block.
    pub fn init(arena: Arena<'a>) -> Result<Self, InitError> {
        Self::with_config(arena, HeapConfig::default())
    }

    /// Same as [`Self::init`] with a custom [`HeapConfig`].
    pub fn with_config(arena: Arena<'a>, config: HeapConfig) -> Result<Self, InitError> {
        let len = arena.len();
        let base = arena.base().as_ptr() as usize;

        if len < MIN_BLOCK_SIZE {
            return Err(InitError::TooSmall { len });
        }

        if len % ALIGNMENT != 0 {
            return Err(InitError::UnalignedLength { len });
        }

        if base % ALIGNMENT != 0 {
            return Err(InitError::MisalignedBase { base });
        }

        let mut heap = Self {
            arena,
            nused: 0,
            config,
        };

        heap.reset();

        Ok(heap)
    }

    /// Forgets every allocation and turns the arena back into a single free
    /// block. Addresses handed out before are no longer valid.
    pub fn reset(&mut self) {
        let len = self.arena.len();

        block::encode(&mut self.arena, 0, len, Status::Free);
        freelist::rebuild(&mut self.arena);
        self.nused = 0;

        log::debug!("heap reset: {len} bytes at {:p}", self.arena.base());
    }

    /// Bytes currently in use, headers included.
    #[inline]
    pub fn used(&self) -> usize {
        self.nused
    }

    /// Total size of the arena.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Every block of the heap in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks::new(&self.arena)
    }

    /// Every free block of the heap, following the free list.
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks::new(&self.arena)
    }

    /// Returns `size` bytes of uninitialized memory or `None` if the request
    /// can't be served. See [`Self::try_allocate`] for the failure reasons.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        match self.try_allocate(size) {
            Ok(address) => Some(address),
            Err(err) => {
                log::debug!("allocate({size}) failed: {err}");
                None
            }
        }
    }

    /// First fit allocation.
    ///
    /// The first free block is found by walking the headers, the rest of the
    /// search follows the free list. The first block large enough wins. If
    /// what's left after carving the request out of it can still be a free
    /// block on its own, the block is split:
    ///
    /// ```text
    /// Before:
    /// +--------+--------------------------------------------------+
    /// | Header |                  Free payload                    |
    /// +--------+--------------------------------------------------+
    ///
    /// After:
    /// +--------+----------------+     +--------+------------------+
    /// | Header | Client payload | --> | Header |  Free payload    |
    /// +--------+----------------+     +--------+------------------+
    /// <---------- needed -------->    <------- remainder --------->
    /// ```
    ///
    /// Otherwise the client gets the whole block and the few extra bytes are
    /// wasted until it is released.
    ///
    /// On failure nothing in the arena changes.
    pub fn try_allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }

        let max = self.config.max_request_size();

        let needed = match round_up(size) {
            Some(needed) if needed <= max => needed,
            _ => return Err(AllocError::TooLarge { requested: size, max }),
        };

        let out_of_memory = AllocError::OutOfMemory {
            needed,
            used: self.nused,
            capacity: self.arena.len(),
        };

        if needed > self.arena.len().saturating_sub(self.nused) {
            return Err(out_of_memory);
        }

        let block = self.find_free_block(needed).ok_or(out_of_memory)?;
        let consumed = self.take(block, needed);

        self.nused += consumed;
        freelist::rebuild(&mut self.arena);

        log::trace!(
            "allocate({size}): block at offset {} of {consumed} bytes, {} bytes in use",
            block.offset,
            self.nused
        );

        Ok(self.arena.pointer_at(block.payload()))
    }

    /// Releases the block whose payload starts at `address`.
    ///
    /// The block is marked free and then merged with every free block that
    /// follows it directly in memory:
    ///
    /// ```text
    /// Before:
    /// +------+----------+------+------+------+
    /// | Used | Released | Free | Free | Used |
    /// +------+----------+------+------+------+
    ///
    /// After:
    /// +------+--------------------+------+
    /// | Used |        Free        | Used |
    /// +------+--------------------+------+
    /// ```
    ///
    /// Blocks on the left are never merged, a free block followed by a
    /// released one stays as two separate free blocks.
    ///
    /// `None` is a no-op. So are addresses that don't belong to a used block
    /// of this heap, those are logged and otherwise ignored.
    pub fn release(&mut self, address: Option<NonNull<u8>>) {
        let Some(address) = address else {
            return;
        };

        let Some(block) = self.used_block_of(address, "release") else {
            return;
        };

        block::encode(&mut self.arena, block.offset, block.size, Status::Free);
        self.nused -= block.size;

        let size = self.merge_with_next(block.offset);
        freelist::rebuild(&mut self.arena);

        log::trace!(
            "release({address:p}): {} bytes freed, free block of {size} bytes, {} bytes in use",
            block.size,
            self.nused
        );
    }

    /// Follows the free list looking for the first block of at least
    /// `needed` bytes.
    fn find_free_block(&self, needed: usize) -> Option<Block> {
        let mut current = list::first_free(&self.arena);

        while let Some(offset) = current {
            let block = Block::read(&self.arena, offset);

            if block.size >= needed {
                return Some(block);
            }

            current = freelist::next_of(&self.arena, offset)
                .and_then(|address| self.arena.offset_of(address))
                .filter(|next| *next > offset);
        }

        None
    }

    /// Marks `needed` bytes at the beginning of the free `block` as used,
    /// splitting off the rest if it is large enough to stand on its own.
    /// Returns the number of bytes that became used.
    pub(crate) fn take(&mut self, block: Block, needed: usize) -> usize {
        let remainder = block.size - needed;

        if remainder >= MIN_BLOCK_SIZE {
            block::encode(&mut self.arena, block.offset + needed, remainder, Status::Free);
            block::encode(&mut self.arena, block.offset, needed, Status::Used);

            needed
        } else {
            block::encode(&mut self.arena, block.offset, block.size, Status::Used);

            block.size
        }
    }

    /// Absorbs every free block located right after the free block at
    /// `offset`. Returns the final size of the block.
    fn merge_with_next(&mut self, offset: usize) -> usize {
        let mut size = block::size_of(&self.arena, offset);

        while offset + size < self.arena.len() && block::is_free(&self.arena, offset + size) {
            let next = block::size_of(&self.arena, offset + size);

            if next == 0 {
                break;
            }

            size += next;
            block::encode(&mut self.arena, offset, size, Status::Free);
        }

        size
    }

    /// Resolves a client address to the used block it belongs to.
    ///
    /// Returns `None` (after logging why) if the address is not the payload
    /// of a used block that fits in the arena. The header is located by
    /// walking the blocks from the start of the arena, so pointers into the
    /// middle of a payload are rejected whatever the payload contains.
    pub(crate) fn used_block_of(&self, address: NonNull<u8>, operation: &str) -> Option<Block> {
        let offset = self
            .arena
            .offset_of(address.as_ptr() as usize)
            .and_then(|payload| payload.checked_sub(HEADER_SIZE))
            .filter(|offset| offset % ALIGNMENT == 0);

        let Some(offset) = offset else {
            log::warn!("{operation}({address:p}): address does not belong to this heap");
            return None;
        };

        // Only headers reached by walking the chain are real, a word inside a
        // payload can look exactly like one.
        let block = self
            .blocks()
            .take_while(|block| block.offset <= offset)
            .find(|block| block.offset == offset);

        let Some(block) = block else {
            log::warn!("{operation}({address:p}): address is not the start of a block");
            return None;
        };

        if block.is_free() {
            log::warn!("{operation}({address:p}): block is not in use");
            return None;
        }

        if block.size < MIN_BLOCK_SIZE || block.end() > self.arena.len() {
            log::warn!("{operation}({address:p}): block header is invalid ({} bytes)", block.size);
            return None;
        }

        Some(block)
    }

    /// Number of bytes the client can use at `address`, which may be more
    /// than it asked for.
    pub fn usable_size(&self, address: NonNull<u8>) -> Option<usize> {
        self.used_block_of(address, "usable_size")
            .map(|block| block.payload_size())
    }

    /// Contents of the used block at `address`.
    pub fn payload(&self, address: NonNull<u8>) -> Option<&[u8]> {
        let block = self.used_block_of(address, "payload")?;

        Some(self.arena.bytes(block.payload(), block.payload_size()))
    }

    /// Mutable contents of the used block at `address`.
    pub fn payload_mut(&mut self, address: NonNull<u8>) -> Option<&mut [u8]> {
        let block = self.used_block_of(address, "payload_mut")?;

        Some(self.arena.bytes_mut(block.payload(), block.payload_size()))
    }

    #[inline]
    pub(crate) fn arena(&self) -> &Arena<'a> {
        &self.arena
    }

    #[inline]
    pub(crate) fn arena_mut(&mut self) -> &mut Arena<'a> {
        &mut self.arena
    }

    #[inline]
    pub(crate) fn set_used(&mut self, nused: usize) {
        self.nused = nused;
    }
}
