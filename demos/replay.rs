//! Replays an allocator script against a fresh heap and prints a summary.
//!
//! ```text
//! cargo run --example replay -- demos/scripts/example.script [arena bytes]
//! ```

use std::{env, process::ExitCode};

use arenalloc::{Heap, Script, Segment, replay};

const DEFAULT_ARENA_SIZE: usize = 1 << 20;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);

    let Some(path) = args.next() else {
        eprintln!("usage: replay <script> [arena bytes]");
        return ExitCode::FAILURE;
    };

    let len = match args.next().map(|arg| arg.parse::<usize>()) {
        None => DEFAULT_ARENA_SIZE,
        Some(Ok(len)) => len,
        Some(Err(err)) => {
            eprintln!("invalid arena size: {err}");
            return ExitCode::FAILURE;
        }
    };

    let script = match Script::from_path(&path) {
        Ok(script) => script,
        Err(err) => {
            eprintln!("{path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut segment = match Segment::new(len) {
        Ok(segment) => segment,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut heap = match Heap::init(segment.arena()) {
        Ok(heap) => heap,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match replay(&mut heap, &script) {
        Ok(stats) => {
            println!("{path}: {} requests, {} failed", stats.requests, stats.failed);
            println!(
                "peak: {} bytes in use for {} bytes requested ({:.1}% utilization)",
                stats.peak_used,
                stats.peak_payload,
                100.0 * stats.peak_payload as f64 / stats.peak_used.max(1) as f64
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{path}: {err}");
            eprintln!("{}", heap.dump());
            ExitCode::FAILURE
        }
    }
}
