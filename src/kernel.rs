//! Host side of the allocator: getting an arena from the operating system.
//!
//! The heap itself never asks for memory, it is handed an [`Arena`] once and
//! works inside of it until it's dropped. A [`Segment`] is the simplest way to
//! obtain one: a page aligned, zeroed region mapped directly from the kernel
//! and returned to it when the segment is dropped.

use std::{
    ptr::NonNull,
    slice,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{arena::Arena, error::SegmentError, utils::align};

/// Virtual memory page size of the computer. This is usually 4096.
/// We don't know the value at compile time, so it's queried once and cached.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Zero sized type implementing [`PlatformMemory`] for the current target.
struct Kernel;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The allocator has nothing to do with the concrete
/// implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a Pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: NonNull<u8>, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);

    if cached != 0 {
        return cached;
    }

    let size = unsafe { Kernel::page_size() };
    PAGE_SIZE.store(size, Ordering::Relaxed);

    size
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    return None;
                }

                NonNull::new(addr.cast::<u8>())
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            unsafe {
                munmap(addr.as_ptr().cast::<c_void>(), len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{Kernel, PlatformMemory};

    use ::windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

/// Memory region obtained directly from the kernel.
///
/// The mapping is rounded up to a whole number of pages but only the
/// requested `len` bytes are exposed. Freshly mapped pages are zeroed and
/// page aligned, so any length that is a multiple of [`crate::ALIGNMENT`]
/// gives an arena [`crate::Heap::init`] accepts.
///
/// ```text
///  addr (page aligned)                 addr + len      addr + mapped
///   |                                       |               |
///   v                                       v               v
///   +---------------------------------------+---------------+
///   |            exposed as arena           |  page padding |
///   +---------------------------------------+---------------+
/// ```
pub struct Segment {
    /// Start of the mapping returned by the kernel.
    addr: NonNull<u8>,
    /// Bytes exposed to the user.
    len: usize,
    /// Bytes actually mapped (multiple of [`page_size`]).
    mapped: usize,
}

impl Segment {
    /// Maps a new segment of at least `len` bytes.
    pub fn new(len: usize) -> Result<Self, SegmentError> {
        if len == 0 {
            return Err(SegmentError::Empty);
        }

        let mapped = align(len, page_size());

        let addr = unsafe { Kernel::request_memory(mapped) }
            .ok_or(SegmentError::MapFailed { len: mapped })?;

        log::debug!("mapped segment of {mapped} bytes at {addr:p}");

        Ok(Self { addr, len, mapped })
    }

    /// Number of bytes exposed by this segment.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The segment as a byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is valid for `mapped >= len` bytes until drop
        // and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.addr.as_ptr(), self.len) }
    }

    /// Borrows the whole segment as an allocator [`Arena`].
    pub fn arena(&mut self) -> Arena<'_> {
        Arena::new(self.as_mut_slice())
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        log::debug!("returning segment of {} bytes at {:p}", self.mapped, self.addr);

        unsafe { Kernel::return_memory(self.addr, self.mapped) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();

        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn segment_is_zeroed_and_writable() {
        let mut segment = Segment::new(1000).unwrap();

        assert_eq!(segment.len(), 1000);
        assert!(segment.as_mut_slice().iter().all(|byte| *byte == 0));

        segment.as_mut_slice()[999] = 0xFF;
        assert_eq!(segment.as_mut_slice()[999], 0xFF);
    }

    #[test]
    fn segment_is_page_aligned() {
        let mut segment = Segment::new(64).unwrap();
        let arena = segment.arena();

        assert_eq!(arena.base().as_ptr() as usize % page_size(), 0);
        assert_eq!(arena.len(), 64);
    }

    #[test]
    fn empty_segment_is_rejected() {
        assert!(matches!(Segment::new(0), Err(SegmentError::Empty)));
    }
}
