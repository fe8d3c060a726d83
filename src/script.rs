//! Replays allocator scripts against a [`Heap`].
//!
//! A script is a plain text list of requests, one per line:
//!
//! ```text
//! # comment
//! a <id> <size>    allocate <size> bytes and call the block <id>
//! r <id> <size>    resize block <id> to <size> bytes
//! f <id>           free block <id>
//! ```
//!
//! While replaying, every block is filled with a byte pattern derived from
//! its id. The pattern is checked after each resize and before each free, so
//! a block clobbered by the allocator is caught at the request that exposes
//! it. The heap is validated after every request.

use std::{collections::HashMap, fs, path::Path, ptr::NonNull};

use crate::{error::ScriptError, heap::Heap};

/// A single request of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Alloc { id: usize, size: usize },
    Resize { id: usize, size: usize },
    Free { id: usize },
}

/// Request plus the line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub line: usize,
    pub op: Op,
}

/// Parsed script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    requests: Vec<Request>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut requests = Vec::new();

        for (index, text) in source.lines().enumerate() {
            let line = index + 1;
            let text = text.trim();

            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            requests.push(Request {
                line,
                op: parse_op(line, text)?,
            });
        }

        Ok(Self { requests })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

fn parse_op(line: usize, text: &str) -> Result<Op, ScriptError> {
    let mut fields = text.split_whitespace();
    let error = |message: String| ScriptError::Parse { line, message };

    let kind = fields.next().unwrap_or_default();

    let mut number = |what: &str| -> Result<usize, ScriptError> {
        let field = fields
            .next()
            .ok_or_else(|| error(format!("missing {what}")))?;

        field
            .parse()
            .map_err(|_| error(format!("invalid {what} {field:?}")))
    };

    let op = match kind {
        "a" => Op::Alloc {
            id: number("id")?,
            size: number("size")?,
        },
        "r" => Op::Resize {
            id: number("id")?,
            size: number("size")?,
        },
        "f" => Op::Free { id: number("id")? },
        other => return Err(error(format!("unknown request {other:?}"))),
    };

    if let Some(extra) = fields.next() {
        return Err(error(format!("unexpected {extra:?}")));
    }

    Ok(op)
}

/// Summary of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Requests executed.
    pub requests: usize,
    /// Allocations and resizes the heap could not serve.
    pub failed: usize,
    /// Highest number of bytes in use at any point.
    pub peak_used: usize,
    /// Sum of the sizes of the blocks live at the peak, as requested by the
    /// script. Compared to `peak_used` it tells how much went to headers and
    /// padding.
    pub peak_payload: usize,
}

/// Block owned by the script.
#[derive(Debug, Clone, Copy)]
struct Live {
    address: NonNull<u8>,
    size: usize,
}

/// Runs every request of `script` against `heap`.
///
/// Requests the heap can't serve are counted in [`ReplayStats::failed`].
/// The block keeps whatever it had before: a failed allocation leaves the id
/// without memory (freeing it is a no-op, resizing it allocates), a failed
/// resize leaves the old block in place.
///
/// Errors stop the replay: a request that names an id the script never
/// allocated, an allocation for an id that still owns a block, a block whose
/// contents changed behind the client's back, or a heap that fails
/// [`Heap::check`].
pub fn replay(heap: &mut Heap<'_>, script: &Script) -> Result<ReplayStats, ScriptError> {
    let mut blocks: HashMap<usize, Option<Live>> = HashMap::new();
    let mut stats = ReplayStats::default();
    let mut payload = 0;

    for &Request { line, op } in script.requests() {
        match op {
            Op::Alloc { id, size } => {
                if let Some(Some(_)) = blocks.get(&id) {
                    return Err(ScriptError::AlreadyLive { line, id });
                }

                let live = heap.allocate(size).map(|address| Live { address, size });

                match live {
                    Some(live) => {
                        fill(heap, id, live);
                        payload += size;
                    }
                    None => stats.failed += 1,
                }

                blocks.insert(id, live);
            }

            Op::Resize { id, size } => {
                let old = *blocks.get(&id).ok_or(ScriptError::UnknownId { line, id })?;

                if let Some(old) = old {
                    verify(heap, line, id, old)?;
                }

                let address = heap.resize(old.map(|old| old.address), size);
                let old_size = old.map_or(0, |old| old.size);

                match address {
                    Some(address) => {
                        let live = Live { address, size };

                        verify_prefix(heap, line, id, live, old_size.min(size))?;
                        fill(heap, id, live);
                        payload = payload - old_size + size;
                        blocks.insert(id, Some(live));
                    }
                    None if size == 0 => {
                        payload -= old_size;
                        blocks.insert(id, None);
                    }
                    None => stats.failed += 1,
                }
            }

            Op::Free { id } => {
                let old = blocks
                    .get_mut(&id)
                    .ok_or(ScriptError::UnknownId { line, id })?
                    .take();

                if let Some(old) = old {
                    verify(heap, line, id, old)?;
                    payload -= old.size;
                }

                heap.release(old.map(|old| old.address));
            }
        }

        heap.check()
            .map_err(|source| ScriptError::Integrity { line, source })?;

        stats.requests += 1;

        if heap.used() > stats.peak_used {
            stats.peak_used = heap.used();
            stats.peak_payload = payload;
        }

        log::trace!("line {line}: {op:?}, {} bytes in use", heap.used());
    }

    log::debug!(
        "replayed {} requests, {} failed, peak {} bytes in use",
        stats.requests,
        stats.failed,
        stats.peak_used
    );

    Ok(stats)
}

/// Byte stored at position `index` of block `id`.
fn pattern(id: usize, index: usize) -> u8 {
    (id.wrapping_mul(31) ^ index) as u8
}

fn fill(heap: &mut Heap<'_>, id: usize, live: Live) {
    if let Some(bytes) = heap.payload_mut(live.address) {
        for (index, byte) in bytes[..live.size].iter_mut().enumerate() {
            *byte = pattern(id, index);
        }
    }
}

fn verify(heap: &Heap<'_>, line: usize, id: usize, live: Live) -> Result<(), ScriptError> {
    verify_prefix(heap, line, id, live, live.size)
}

/// Checks the first `len` bytes of the block against its pattern.
fn verify_prefix(
    heap: &Heap<'_>,
    line: usize,
    id: usize,
    live: Live,
    len: usize,
) -> Result<(), ScriptError> {
    let intact = heap.payload(live.address).is_some_and(|bytes| {
        bytes[..len]
            .iter()
            .enumerate()
            .all(|(index, byte)| *byte == pattern(id, index))
    });

    if intact {
        Ok(())
    } else {
        Err(ScriptError::Corrupted { line, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_requests() {
        let script = Script::parse(
            "# header\n\
             a 0 24\n\
             \n\
             r 0 100\n\
             f 0\n",
        )
        .unwrap();

        assert_eq!(
            script.requests(),
            &[
                Request { line: 2, op: Op::Alloc { id: 0, size: 24 } },
                Request { line: 4, op: Op::Resize { id: 0, size: 100 } },
                Request { line: 5, op: Op::Free { id: 0 } },
            ]
        );
    }

    #[test]
    fn parse_errors_carry_line() {
        let cases = ["x 1 2", "a 1", "a one 2", "f 1 2"];

        for case in cases {
            let source = format!("a 0 8\n{case}\n");

            match Script::parse(&source) {
                Err(ScriptError::Parse { line, .. }) => assert_eq!(line, 2, "{case}"),
                other => panic!("{case}: expected parse error, got {other:?}"),
            }
        }
    }

    #[test]
    fn pattern_differs_between_ids() {
        assert_ne!(pattern(1, 0), pattern(2, 0));
        assert_ne!(pattern(1, 0), pattern(1, 1));
    }
}
