//! Tests for the bump arena.

use crate::arena::{Arena, ArenaConfig, ArenaError, ArenaOffset};

fn small_arena(chunk_size: usize, capacity: usize) -> Arena {
    Arena::new(ArenaConfig {
        chunk_size,
        capacity,
    })
}

#[test]
fn test_allocations_never_overlap() {
    let mut arena = small_arena(64, 1 << 20);
    let mut ranges: Vec<(u32, u32)> = Vec::new();

    for i in 0..500usize {
        let size = (i * 7) % 97 + 1;
        let align = 1 << (i % 4);
        let offset = arena.allocate(size, align).unwrap();
        assert_eq!(offset.get() as usize % align, 0, "misaligned allocation");
        ranges.push((offset.get(), offset.get() + size as u32));
    }

    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "ranges overlap: {:?} and {:?}",
            pair[0],
            pair[1]
        );
    }
    assert!(arena.chunk_count() > 1);
}

#[test]
fn test_large_request_gets_its_own_chunk() {
    let mut arena = small_arena(16, 4096);
    let small = arena.allocate(8, 4).unwrap();
    let large = arena.allocate(100, 4).unwrap();

    assert!(large.get() >= small.get() + 8);
    assert!(arena.bytes(large, 100).is_some());
    assert_eq!(arena.allocated_bytes(), 108);
}

#[test]
fn test_out_of_memory_at_capacity() {
    let mut arena = small_arena(32, 64);
    arena.allocate(32, 1).unwrap();
    arena.allocate(32, 1).unwrap();

    let err = arena.allocate(1, 1).unwrap_err();
    assert!(matches!(err, ArenaError::OutOfMemory { requested: 1, .. }));
}

#[test]
fn test_request_larger_than_capacity_fails() {
    let mut arena = small_arena(32, 64);
    let err = arena.allocate(65, 1).unwrap_err();
    assert_eq!(
        err,
        ArenaError::OutOfMemory {
            requested: 65,
            available: 64,
            capacity: 64
        }
    );
    // A failed request leaves the arena usable.
    assert!(arena.allocate(16, 1).is_ok());
}

#[test]
fn test_invalid_alignment() {
    let mut arena = Arena::default();
    assert_eq!(
        arena.allocate(4, 3).unwrap_err(),
        ArenaError::InvalidAlignment(3)
    );
}

#[test]
fn test_write_and_read_back() {
    let mut arena = Arena::default();
    let offset = arena.allocate(8, 4).unwrap();
    arena.write_u32(offset, 0xDEAD_BEEF).unwrap();
    arena.write_u32(ArenaOffset(offset.get() + 4), 7).unwrap();

    assert_eq!(arena.read_u32(offset), Some(0xDEAD_BEEF));
    assert_eq!(arena.read_u32(ArenaOffset(offset.get() + 4)), Some(7));
    // Reading past the allocated region is refused.
    assert_eq!(arena.read_u32(ArenaOffset(offset.get() + 8)), None);
}

#[test]
fn test_reset_starts_new_epoch() {
    let mut arena = Arena::default();
    let offset = arena.alloc_bytes(b"hello", 1).unwrap();
    let epoch = arena.epoch();

    arena.reset();

    assert_ne!(arena.epoch(), epoch);
    assert!(arena.is_empty());
    assert_eq!(arena.reserved_bytes(), 0);
    assert!(arena.bytes(offset, 5).is_none());
}

#[test]
fn test_epochs_are_unique_across_arenas() {
    let a = Arena::default();
    let b = Arena::default();
    assert_ne!(a.epoch(), b.epoch());
}
