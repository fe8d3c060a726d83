use std::ptr::NonNull;

use arenalloc::{Heap, Segment};

fn log_alloc(heap: &Heap<'_>, requested: usize, addr: Option<NonNull<u8>>) {
    println!("Requested {requested} bytes of memory");
    match addr {
        Some(addr) => println!(
            "Received this address: {addr:p} ({} usable bytes)",
            heap.usable_size(addr).unwrap_or(0)
        ),
        None => println!("Request failed"),
    }
}

fn main() {
    let mut segment = Segment::new(1024).expect("could not map segment");
    let mut heap = Heap::init(segment.arena()).expect("segment is a valid arena");

    let addr1 = heap.allocate(8);
    log_alloc(&heap, 8, addr1);

    let addr2 = heap.allocate(100);
    log_alloc(&heap, 100, addr2);

    let addr3 = heap.allocate(16);
    log_alloc(&heap, 16, addr3);

    if let Some(bytes) = addr2.and_then(|addr| heap.payload_mut(addr)) {
        bytes[..12].copy_from_slice(b"Heap Testing");
    }

    println!("\n{}", heap.dump());

    heap.release(addr1);
    let addr2 = heap.resize(addr2, 400);
    log_alloc(&heap, 400, addr2);

    if let Some(bytes) = addr2.and_then(|addr| heap.payload(addr)) {
        println!("Contents after resize: {:?}", String::from_utf8_lossy(&bytes[..12]));
    }

    println!("\n{}", heap.dump());

    heap.release(addr2);
    heap.release(addr3);

    println!("\n{}", heap.dump());
    println!("Heap is valid: {}", heap.validate());
}
