//! An example program that shares one arena between several threads through a
//! `LockedArena`, creates and destroys a large number of regions, and checks
//! validity along the way.

use std::sync::Arc;
use std::thread;

use region_alloc::{Error, LockedArena, RegionHandle};

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, RngCore, SeedableRng};

// Size of the shared arena
const CAPACITY: usize = 1024 * 1024;
// Total number of allocations / deallocations per thread
const ALLOCATIONS: usize = 16 * 1024;
// Maximum number of bytes in one region
const MAX_SIZE: usize = 1024;
// Number of threads sharing the arena
const THREADS: usize = 4;

struct RandomRegions {
    arena: Arc<LockedArena>,
    held: Vec<RegionHandle>,
    max_size: usize,
    full: usize,
}

impl RandomRegions {
    fn new(arena: Arc<LockedArena>, max_size: usize) -> Self {
        RandomRegions {
            arena,
            held: Vec::new(),
            max_size,
            full: 0,
        }
    }

    fn create<R: Rng>(&mut self, rng: &mut R) {
        let range = Uniform::new_inclusive(1usize, self.max_size);
        let size = range.sample(rng);
        let acquired = self.arena.lock().acquire(size);
        match acquired {
            Ok(handle) => self.held.push(handle),
            Err(Error::OutOfSpace { .. }) => self.full += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    fn destroy<R: Rng>(&mut self, rng: &mut R) {
        if self.held.is_empty() {
            return;
        }
        let range = Uniform::new(0, self.held.len());
        let handle = self.held.swap_remove(range.sample(rng));
        let released = self.arena.lock().release(handle);
        if let Err(e) = released {
            panic!("Failed to release {:?}: {}", handle, e);
        }
    }
}

fn run(arena: Arc<LockedArena>, id: usize, seed: u64, allocations: usize) -> usize {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed.wrapping_add(id as u64));
    let mut regions = RandomRegions::new(arena, MAX_SIZE);

    for i in 1..=allocations {
        if rng.gen_bool(0.55) {
            regions.create(&mut rng);
        } else {
            regions.destroy(&mut rng);
        }

        if i % 4096 == 0 {
            let (validity, stats) = regions.arena.stats();
            println!("Thread {} step {} / {}", id, i, allocations);
            println!("    Held regions: {}", regions.held.len());
            println!("    Arena stats: {:?}", stats);
            assert!(validity.is_valid());
        }
    }

    while !regions.held.is_empty() {
        regions.destroy(&mut rng);
    }
    regions.full
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.contains(&"--help".to_owned()) {
        println!("USAGE: {} [ALLOCATIONS]", args[0]);
        return;
    }
    let allocations: usize = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(ALLOCATIONS);

    env_logger::init();
    println!("Running Stress Test.\n\nParameters:");
    println!("    {} byte arena shared by {} threads", CAPACITY, THREADS);
    println!("    {} allocations per thread", allocations);

    let seed: u64 = rand::thread_rng().next_u64();
    log::info!("Using seed {}", seed);

    let arena = Arc::new(LockedArena::create(CAPACITY).expect("failed to create arena"));
    let workers: Vec<_> = (0..THREADS)
        .map(|id| {
            let arena = Arc::clone(&arena);
            thread::spawn(move || run(arena, id, seed, allocations))
        })
        .collect();

    let full: usize = workers
        .into_iter()
        .map(|w| w.join().expect("worker panicked"))
        .sum();

    let (validity, stats) = arena.stats();
    println!("\nFinished.");
    println!("    Requests refused for lack of space: {}", full);
    println!("    Stats:    {:?}", stats);
    assert!(validity.is_valid());
    assert_eq!(stats.regions, 1);
}
