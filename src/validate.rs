//! Heap consistency checks and diagnostic output.
//!
//! Both walk the headers by byte offset from the beginning of the arena, so
//! they don't depend on the free list being right. That's the point, the
//! free list is checked against the headers and not the other way around.

use std::fmt;

use crate::{
    ALIGNMENT, MIN_BLOCK_SIZE,
    block::{self, Block},
    error::IntegrityViolation,
    freelist,
    heap::Heap,
};

impl Heap<'_> {
    /// Checks every invariant of the heap, stopping at the first broken one:
    ///
    /// - Bytes in use never exceed the arena.
    /// - Every header sits at an aligned address.
    /// - Every size is a multiple of [`ALIGNMENT`] and at least
    ///   [`MIN_BLOCK_SIZE`].
    /// - The walk from the first header lands exactly on the end of the
    ///   arena.
    /// - Used blocks add up to the bytes recorded in use.
    /// - The free list holds exactly the free blocks, in address order, with
    ///   matching `prev` and `next` links.
    ///
    /// Never modifies the heap.
    pub fn check(&self) -> Result<(), IntegrityViolation> {
        let arena = self.arena();
        let capacity = arena.len();

        if self.used() > capacity {
            return Err(IntegrityViolation::Overcommitted {
                used: self.used(),
                capacity,
            });
        }

        let mut offset = 0;
        let mut used = 0;
        let mut prev_free: Option<usize> = None;

        while offset < capacity {
            let address = arena.address_of(offset);

            if address % ALIGNMENT != 0 {
                return Err(IntegrityViolation::Misaligned { offset, address });
            }

            let size = block::size_of(arena, offset);

            if size % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE {
                return Err(IntegrityViolation::BadSize { offset, size });
            }

            if size > capacity - offset {
                return Err(IntegrityViolation::Overrun {
                    offset,
                    size,
                    capacity,
                });
            }

            if block::is_free(arena, offset) {
                let expected_prev = prev_free.map(|prev| arena.address_of(prev));

                if freelist::prev_of(arena, offset) != expected_prev {
                    return Err(IntegrityViolation::BrokenLink { offset });
                }

                if let Some(prev) = prev_free {
                    if freelist::next_of(arena, prev) != Some(address) {
                        return Err(IntegrityViolation::BrokenLink { offset: prev });
                    }
                }

                prev_free = Some(offset);
            } else {
                used += size;
            }

            offset += size;
        }

        if let Some(last) = prev_free {
            if freelist::next_of(arena, last).is_some() {
                return Err(IntegrityViolation::BrokenLink { offset: last });
            }
        }

        if used != self.used() {
            return Err(IntegrityViolation::UsageMismatch {
                recorded: self.used(),
                actual: used,
            });
        }

        Ok(())
    }

    /// Same as [`Self::check`] but only says whether the heap is fine. The
    /// violation, if any, is logged.
    pub fn validate(&self) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(violation) => {
                log::error!("heap validation failed: {violation}");
                false
            }
        }
    }

    /// Printable listing of every block and every free list node. Meant for
    /// debugging, works on any heap state.
    pub fn dump(&self) -> HeapDump<'_, '_> {
        HeapDump { heap: self }
    }
}

/// See [`Heap::dump`].
pub struct HeapDump<'h, 'a> {
    heap: &'h Heap<'a>,
}

impl fmt::Display for HeapDump<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heap = self.heap;
        let arena = heap.arena();
        let start = arena.base().as_ptr() as usize;

        writeln!(
            f,
            "heap {start:#x}..{:#x}, {} of {} bytes in use",
            start + arena.len(),
            heap.used(),
            heap.capacity()
        )?;

        let mut walked = 0;

        for (index, block) in heap.blocks().enumerate() {
            writeln!(
                f,
                "  #{:<4} offset {:>8}  address {:#x}  size {:>8}  {}",
                index + 1,
                block.offset,
                arena.address_of(block.offset),
                block.size,
                block.status
            )?;
            walked = block.end();
        }

        if walked != arena.len() {
            writeln!(f, "  walk stopped at offset {walked}, heap is corrupted")?;
        }

        let free: Vec<Block> = heap.free_blocks().collect();

        if free.is_empty() {
            return writeln!(f, "no free blocks");
        }

        writeln!(f, "free list:")?;

        for (index, block) in free.iter().enumerate() {
            writeln!(
                f,
                "  #{:<4} address {:#x}  size {:>8}  prev {:#x}  next {:#x}",
                index + 1,
                arena.address_of(block.offset),
                block.size,
                freelist::prev_of(arena, block.offset).unwrap_or(0),
                freelist::next_of(arena, block.offset).unwrap_or(0),
            )?;
        }

        Ok(())
    }
}
