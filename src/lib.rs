//! # arenalloc - explicit free list allocator over a fixed arena
//!
//! This crate implements the classic `allocate / resize / release` API on
//! top of one contiguous region of memory handed over by the host once. The
//! allocator never asks for more memory and never gives any back, it only
//! decides which parts of the region are in use.
//!
//! ## Crate Structure
//!
//! ```text
//!   arenalloc
//!   ├── arena     - Byte offset access to the host region
//!   ├── block     - Header codec (size + status in one word)
//!   ├── freelist  - Free list links stored in free payloads, list rebuild
//!   ├── list      - Block scanners (physical order and free list order)
//!   ├── heap      - Heap state, allocate and release
//!   ├── realloc   - resize
//!   ├── validate  - Consistency checks and dump
//!   ├── kernel    - Segments mapped from the operating system
//!   ├── script    - Script replay harness
//!   ├── config    - HeapConfig
//!   └── error     - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use arenalloc::{Heap, Segment};
//!
//! let mut segment = Segment::new(4096).unwrap();
//! let mut heap = Heap::init(segment.arena()).unwrap();
//!
//! let address = heap.allocate(100).unwrap();
//! heap.payload_mut(address).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let address = heap.resize(Some(address), 200).unwrap();
//! assert_eq!(&heap.payload(address).unwrap()[..5], b"hello");
//!
//! heap.release(Some(address));
//! assert!(heap.validate());
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   Used block:
//!   +-------------------+--------------------------------------+
//!   | size | 1          |            client payload            |
//!   +-------------------+--------------------------------------+
//!        8 bytes        ^
//!                       └── address returned to the client
//!
//!   Free block:
//!   +-------------------+-----------+-----------+--------------+
//!   | size | 0          | prev free | next free |    unused    |
//!   +-------------------+-----------+-----------+--------------+
//!        8 bytes           8 bytes     8 bytes
//! ```
//!
//! Sizes count the header and are multiples of [`ALIGNMENT`], which leaves
//! the lowest bit free for the status.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: every operation needs `&mut Heap`.
//! - **Right-only coalescing**: a released block absorbs the free blocks
//!   after it, never the one before it.
//! - **Linear costs**: the free list is rebuilt with a full walk of the
//!   arena after every operation.

mod arena;
mod block;
mod config;
mod error;
mod freelist;
mod heap;
mod kernel;
mod list;
mod realloc;
mod script;
mod utils;
mod validate;

pub use arena::Arena;
pub use block::{Block, HEADER_SIZE, Status};
pub use config::HeapConfig;
pub use error::{AllocError, InitError, IntegrityViolation, ScriptError, SegmentError};
pub use freelist::LINK_SIZE;
pub use heap::Heap;
pub use kernel::{Segment, page_size};
pub use list::{Blocks, FreeBlocks};
pub use script::{Op, ReplayStats, Request, Script, replay};
pub use utils::{align, round_up};
pub use validate::HeapDump;

/// Minimum alignment of every block and every address handed to clients.
pub const ALIGNMENT: usize = 8;

/// Smallest payload a block can have: room for the two free list links.
pub const MIN_PAYLOAD: usize = 2 * LINK_SIZE;

/// Smallest block that can exist. Splits leaving less than this are skipped
/// and arenas shorter than this are rejected.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + MIN_PAYLOAD;

/// Default maximum block size of a single request.
pub const MAX_REQUEST_SIZE: usize = 1 << 30;
