use std::ptr::NonNull;

use arenalloc::{ALIGNMENT, HEADER_SIZE, Heap, HeapConfig, MIN_BLOCK_SIZE, Segment, Status};

fn addr(address: NonNull<u8>) -> usize {
    address.as_ptr() as usize
}

#[test]
fn addresses_are_aligned() {
    let mut segment = Segment::new(8192).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    for size in 1..=100 {
        let address = heap.allocate(size).unwrap();

        assert_eq!(addr(address) % ALIGNMENT, 0, "size {size}");
        assert!(heap.usable_size(address).unwrap() >= size);
    }

    assert!(heap.validate());
}

#[test]
fn blocks_cover_the_whole_arena() {
    let mut segment = Segment::new(4096).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let mut live = Vec::new();

    for size in [10, 200, 33, 8, 512, 64, 1] {
        live.push(heap.allocate(size).unwrap());
    }

    for address in live.iter().step_by(2) {
        heap.release(Some(*address));
    }

    let total: usize = heap.blocks().map(|block| block.size).sum();
    let used: usize = heap
        .blocks()
        .filter(|block| block.status == Status::Used)
        .map(|block| block.size)
        .sum();

    assert_eq!(total, heap.capacity());
    assert_eq!(used, heap.used());
    assert_eq!(heap.check(), Ok(()));
}

#[test]
fn live_blocks_never_overlap() {
    let mut segment = Segment::new(4096).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

    for (index, size) in [24, 100, 7, 300, 16, 48, 90].into_iter().enumerate() {
        let address = heap.allocate(size).unwrap();
        heap.payload_mut(address).unwrap().fill(index as u8);
        live.push((address, size));

        if index % 3 == 2 {
            let (old, _) = live.remove(0);
            heap.release(Some(old));
        }
    }

    let mut ranges: Vec<(usize, usize)> = live
        .iter()
        .map(|(address, _)| {
            let start = addr(*address) - HEADER_SIZE;
            (start, start + HEADER_SIZE + heap.usable_size(*address).unwrap())
        })
        .collect();

    ranges.sort();

    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "{pair:?}");
    }

    assert!(heap.validate());
}

#[test]
fn contents_survive_other_operations() {
    let mut segment = Segment::new(4096).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let keep = heap.allocate(64).unwrap();
    heap.payload_mut(keep).unwrap()[..64].copy_from_slice(&[0xAB; 64]);

    let a = heap.allocate(100).unwrap();
    let b = heap.allocate(20).unwrap();
    heap.release(Some(a));
    let c = heap.resize(Some(b), 400).unwrap();
    heap.allocate(50).unwrap();
    heap.release(Some(c));

    assert_eq!(&heap.payload(keep).unwrap()[..64], &[0xAB; 64]);
}

#[test]
fn release_then_allocate_reuses_the_block() {
    let mut segment = Segment::new(1024).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let a = heap.allocate(40).unwrap();
    let _guard = heap.allocate(40).unwrap();
    let used = heap.used();

    heap.release(Some(a));
    let b = heap.allocate(40).unwrap();

    assert_eq!(a, b);
    assert_eq!(heap.used(), used);
}

#[test]
fn released_neighbours_merge_to_the_right() {
    let mut segment = Segment::new(1024).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let _a = heap.allocate(32).unwrap();
    let b = heap.allocate(32).unwrap();
    let c = heap.allocate(32).unwrap();
    let _d = heap.allocate(32).unwrap();

    // Releasing c first lets b absorb it.
    heap.release(Some(c));
    heap.release(Some(b));

    assert_eq!(heap.usable_size(b), None);
    assert_eq!(heap.free_blocks().next().map(|block| block.size), Some(80));

    let e = heap.allocate(2 * 32 + HEADER_SIZE).unwrap();

    assert_eq!(e, b);
    assert!(heap.validate());
}

#[test]
fn released_neighbours_do_not_merge_to_the_left() {
    let mut segment = Segment::new(1024).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let _a = heap.allocate(32).unwrap();
    let b = heap.allocate(32).unwrap();
    let c = heap.allocate(32).unwrap();
    let _d = heap.allocate(32).unwrap();

    heap.release(Some(b));
    heap.release(Some(c));

    let free: Vec<usize> = heap.free_blocks().map(|block| block.size).collect();

    // b and c stay apart, followed by the tail of the arena.
    assert_eq!(free.len(), 3);
    assert_eq!(&free[..2], &[40, 40]);

    let e = heap.allocate(2 * 32 + HEADER_SIZE).unwrap();

    assert_ne!(e, b);
    assert!(addr(e) > addr(c));
}

#[test]
fn resize_in_place_keeps_address_and_contents() {
    let mut segment = Segment::new(2048).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let a = heap.allocate(40).unwrap();
    heap.payload_mut(a).unwrap()[..11].copy_from_slice(b"hello world");

    let b = heap.resize(Some(a), 800).unwrap();

    assert_eq!(a, b);
    assert_eq!(&heap.payload(b).unwrap()[..11], b"hello world");
    assert!(heap.usable_size(b).unwrap() >= 800);
    assert!(heap.validate());
}

#[test]
fn resize_moves_when_blocked() {
    let mut segment = Segment::new(2048).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let a = heap.allocate(40).unwrap();
    let _wall = heap.allocate(8).unwrap();
    heap.payload_mut(a).unwrap()[..40].copy_from_slice(&[0x5A; 40]);

    let b = heap.resize(Some(a), 500).unwrap();

    assert_ne!(a, b);
    assert_eq!(&heap.payload(b).unwrap()[..40], &[0x5A; 40]);
    assert_eq!(heap.usable_size(a), None);
    assert!(heap.validate());
}

#[test]
fn resize_edges() {
    let mut segment = Segment::new(512).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let a = heap.resize(None, 64).unwrap();
    assert!(heap.used() > 0);

    assert_eq!(heap.resize(Some(a), 0), None);
    assert_eq!(heap.used(), 0);

    heap.release(None);
    assert_eq!(heap.allocate(0), None);
    assert!(heap.validate());
}

#[test]
fn exhaustion_and_recovery() {
    let mut segment = Segment::new(4096).unwrap();
    let mut heap = Heap::init(segment.arena()).unwrap();

    let mut live = Vec::new();

    while let Some(address) = heap.allocate(100) {
        live.push(address);
    }

    assert!(!live.is_empty());
    assert!(heap.capacity() - heap.used() < 100 + HEADER_SIZE);

    for address in live.drain(..).rev() {
        heap.release(Some(address));
    }

    assert_eq!(heap.used(), 0);
    assert_eq!(heap.free_blocks().count(), 1);
    assert!(heap.allocate(4096 - HEADER_SIZE).is_some());
}

#[test]
fn request_limit_is_configurable() {
    let mut segment = Segment::new(4096).unwrap();
    let config = HeapConfig::new().with_max_request_size(256);
    let mut heap = Heap::with_config(segment.arena(), config).unwrap();

    assert!(heap.allocate(256 - HEADER_SIZE).is_some());
    assert_eq!(heap.allocate(256), None);

    let a = heap.allocate(16).unwrap();
    assert_eq!(heap.resize(Some(a), 1000), None);
    assert_eq!(heap.usable_size(a), Some(MIN_BLOCK_SIZE - HEADER_SIZE));
}
