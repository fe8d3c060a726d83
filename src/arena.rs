use std::{marker::PhantomData, ptr::NonNull, slice};

/// Size in bytes of every word the allocator stores inside the arena.
pub(crate) const WORD_SIZE: usize = 8;

/// Contiguous region of memory handed to the allocator by the host.
///
/// The allocator never overlays structs on this memory. Headers and free list
/// links are plain 8 byte words read and written at byte offsets through the
/// helpers below, which check every access against the arena bounds. The
/// "pointers" stored inside the arena are just integers, so there are no
/// lifetimes or aliasing rules involved in following them.
///
/// ```text
///  base                                                         base + len
///   |                                                                |
///   v                                                                v
///   +--------+-----------+--------+-----------------+--------+-------+
///   | header |  payload  | header |     payload     | header |  ...  |
///   +--------+-----------+--------+-----------------+--------+-------+
///   0        8                                                     len
/// ```
pub struct Arena<'a> {
    /// First byte of the region.
    base: NonNull<u8>,
    /// Length of the region in bytes.
    len: usize,
    /// The arena behaves like an exclusive borrow of `len` bytes.
    marker: PhantomData<&'a mut [u8]>,
}

impl<'a> Arena<'a> {
    /// Builds an arena over the given bytes. The slice stays borrowed for as
    /// long as the arena (and the heap built on top of it) lives.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let len = bytes.len();

        Self {
            base: NonNull::from(bytes).cast(),
            len,
            marker: PhantomData,
        }
    }

    /// Builds an arena from a raw base address and a length.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes during `'a`
    /// and nothing else may access that memory during `'a` except through
    /// addresses handed out by the allocator.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> Self {
        Self {
            base,
            len,
            marker: PhantomData,
        }
    }

    /// Address of the first byte of the arena.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Arena length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute address of `offset`.
    #[inline]
    pub(crate) fn address_of(&self, offset: usize) -> usize {
        self.base.as_ptr() as usize + offset
    }

    /// Inverse of [`Self::address_of`]. Returns `None` for addresses outside
    /// of the arena.
    #[inline]
    pub(crate) fn offset_of(&self, address: usize) -> Option<usize> {
        let offset = address.checked_sub(self.base.as_ptr() as usize)?;

        (offset < self.len).then_some(offset)
    }

    /// Pointer to the byte at `offset`.
    #[inline]
    pub(crate) fn pointer_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.len, "offset {offset} outside arena of {} bytes", self.len);

        // SAFETY: offset is within (or one past) the region.
        unsafe { self.base.add(offset) }
    }

    /// Reads the word stored at `offset`.
    ///
    /// Panics if the word doesn't fit inside the arena. A header or a link
    /// pointing outside of the arena can only come from a corrupted heap, so
    /// we stop right there instead of touching memory we don't own.
    #[inline]
    pub(crate) fn read_word(&self, offset: usize) -> u64 {
        self.check_word(offset);

        // SAFETY: bounds checked above, the region is valid for reads.
        unsafe { self.base.add(offset).cast::<u64>().read_unaligned() }
    }

    /// Writes `value` as a word at `offset`. Same bounds rules as
    /// [`Self::read_word`].
    #[inline]
    pub(crate) fn write_word(&mut self, offset: usize, value: u64) {
        self.check_word(offset);

        // SAFETY: bounds checked above, we have exclusive access to the region.
        unsafe { self.base.add(offset).cast::<u64>().write_unaligned(value) }
    }

    /// Bytes in `offset..offset + len`.
    pub(crate) fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.check_range(offset, len);

        // SAFETY: range checked above.
        unsafe { slice::from_raw_parts(self.base.add(offset).as_ptr(), len) }
    }

    /// Mutable bytes in `offset..offset + len`.
    pub(crate) fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.check_range(offset, len);

        // SAFETY: range checked above and `&mut self` guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.base.add(offset).as_ptr(), len) }
    }

    /// Copies `len` bytes from `src` to `dst`. Both ranges must lie inside
    /// the arena, they may overlap.
    pub(crate) fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.check_range(src, len);
        self.check_range(dst, len);

        // SAFETY: both ranges checked above.
        unsafe {
            std::ptr::copy(
                self.base.add(src).as_ptr(),
                self.base.add(dst).as_ptr(),
                len,
            );
        }
    }

    #[inline]
    fn check_word(&self, offset: usize) {
        self.check_range(offset, WORD_SIZE);
    }

    #[inline]
    fn check_range(&self, offset: usize, len: usize) {
        let in_bounds = offset.checked_add(len).is_some_and(|end| end <= self.len);

        assert!(
            in_bounds,
            "access of {len} bytes at offset {offset} outside arena of {} bytes",
            self.len
        );
    }
}
