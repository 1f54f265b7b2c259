use region_alloc::checks::{
    active_region_count, is_accounting_consistent, stats, total_payload_bytes,
};
use region_alloc::{Error, RegionArena, Scratchpad, ToyHeap, HEADER_SIZE};

use test_log::test;

#[test]
fn test_two_regions_then_release() {
    let mut arena = RegionArena::create(1024).unwrap();

    let a = arena.acquire(100).unwrap();
    assert_eq!(arena.size_of(a).unwrap(), 100);
    let b = arena.acquire(100).unwrap();
    assert_eq!(active_region_count(&arena), 3);
    assert!(is_accounting_consistent(&arena));

    arena.release(a).unwrap();
    assert!(is_accounting_consistent(&arena));
    arena.release(b).unwrap();
    assert_eq!(active_region_count(&arena), 1);
    assert_eq!(total_payload_bytes(&arena), 1024 - HEADER_SIZE);
    assert_eq!(arena.used(), 0);
}

#[test]
fn test_release_middle_then_first() {
    let mut arena = RegionArena::create(1024).unwrap();
    let first = arena.acquire(50).unwrap();
    let middle = arena.acquire(50).unwrap();
    let last = arena.acquire(50).unwrap();
    // Three regions in use, plus the remainder.
    let count = active_region_count(&arena);
    assert_eq!(count, 4);

    arena.release(middle).unwrap();
    assert_eq!(active_region_count(&arena), count);

    arena.release(first).unwrap();
    assert_eq!(active_region_count(&arena), count - 1);
    assert!(stats(&arena).0.is_valid());

    arena.release(last).unwrap();
    assert_eq!(active_region_count(&arena), 1);
}

#[test]
fn test_round_trip_restores_accounting() {
    let mut arena = RegionArena::create(2048).unwrap();
    let _keep = arena.acquire(300).unwrap();
    let hole = arena.acquire(64).unwrap();
    let _fence = arena.acquire(32).unwrap();
    arena.release(hole).unwrap();

    for &size in &[1usize, 10, 48, 63, 64, 500, 1500] {
        let (_, before) = stats(&arena);
        let used_before = arena.used();

        let h = arena.acquire(size).unwrap();
        assert!(arena.size_of(h).unwrap() >= size);
        assert!(is_accounting_consistent(&arena));

        arena.release(h).unwrap();
        let (validity, after) = stats(&arena);
        assert!(validity.is_valid());
        assert_eq!(arena.used(), used_before);
        assert_eq!(after.free_bytes, before.free_bytes);
        assert_eq!(after.used_bytes, before.used_bytes);
        assert_eq!(after.regions, before.regions);
        assert_eq!(after.payload_bytes, before.payload_bytes);
    }
}

#[test]
fn test_resize_preserves_invariants() {
    let mut arena = RegionArena::create(1024).unwrap();
    let a = arena.acquire(40).unwrap();
    let b = arena.acquire(40).unwrap();

    let a = arena.resize(a, 20).unwrap();
    assert!(stats(&arena).0.is_valid());
    let b = arena.resize(b, 400).unwrap();
    assert!(stats(&arena).0.is_valid());
    let a = arena.resize(a, 300).unwrap();
    assert!(stats(&arena).0.is_valid());
    assert!(is_accounting_consistent(&arena));

    arena.release(a).unwrap();
    arena.release(b).unwrap();
    assert_eq!(active_region_count(&arena), 1);
}

#[test]
fn test_scratchpad_reset() {
    let mut pad = Scratchpad::create(100).unwrap();
    assert_eq!(pad.allocate(60).unwrap().offset(), 0);
    assert!(matches!(pad.allocate(50), Err(Error::OutOfSpace { .. })));
    pad.reset();
    assert_eq!(pad.allocate(50).unwrap().offset(), 0);
    pad.destroy().unwrap();
}

#[test]
fn test_buffers_released_once() {
    let mut arena = RegionArena::create_in(ToyHeap::default(), 1024).unwrap();
    arena.acquire(10).unwrap();
    arena.destroy().unwrap();
    assert_eq!(arena.destroy(), Err(Error::InvalidState));
    assert_eq!(arena.source().reservations, 1);
    assert_eq!(arena.source().releases, 1);
}
