//! Per-frame scratch memory: a scratchpad is filled during each simulated
//! frame and reset at the end of it, while long-lived data sits in a region
//! arena and is resized as it grows.

use region_alloc::{checks, Error, RegionArena, Scratchpad};

const FRAMES: usize = 8;
const SCRATCH_BYTES: usize = 4 * 1024;

fn main() -> Result<(), Error> {
    env_logger::init();

    let mut scratch = Scratchpad::create(SCRATCH_BYTES)?;
    let mut arena = RegionArena::create(64 * 1024)?;
    let mut history = arena.acquire(16)?;
    let mut recorded = 0;

    for frame in 0..FRAMES {
        // Transient per-frame work: each "system" grabs a buffer.
        for system in 0..4 {
            let len = 256 * (system + 1);
            match scratch.allocate_bytes(len) {
                Ok(bytes) => {
                    for b in bytes.iter_mut() {
                        *b = frame as u8;
                    }
                }
                Err(Error::OutOfSpace { available, .. }) => {
                    println!("frame {}: system {} skipped, {} bytes left", frame, system, available);
                }
                Err(e) => return Err(e),
            }
        }

        // Long-lived data grows by one record per frame.
        let needed = (recorded + 1) * 8;
        if needed > arena.size_of(history)? {
            history = arena.resize(history, needed * 2)?;
        }
        let record = (frame as u64).to_le_bytes();
        arena.payload_mut(history)?[recorded * 8..needed].copy_from_slice(&record);
        recorded += 1;

        println!(
            "frame {}: scratch used {} / {}, history {} bytes, arena {}",
            frame,
            scratch.used(),
            scratch.capacity(),
            arena.size_of(history)?,
            arena
        );
        scratch.reset();
    }

    let (validity, stats) = checks::stats(&arena);
    println!("arena: {:?} {:?}", validity, stats);

    arena.release(history)?;
    arena.destroy()?;
    scratch.destroy()?;
    Ok(())
}
