//! Tests for the arena-backed string interner.

use crate::arena::{Arena, ArenaConfig};
use crate::interner::{StringId, StringInterner};

#[test]
fn test_intern_is_idempotent() {
    let mut arena = Arena::default();
    let mut interner = StringInterner::new();

    let a1 = interner.intern_str(&mut arena, "selector").unwrap();
    let a2 = interner.intern_str(&mut arena, "selector").unwrap();

    assert_eq!(a1, a2);
    assert_eq!(interner.resolve_str(&arena, a1), Some("selector"));
    // Second intern must not copy the bytes again.
    assert_eq!(arena.allocated_bytes(), "selector".len());
}

#[test]
fn test_distinct_content_gets_distinct_ids() {
    let mut arena = Arena::default();
    let mut interner = StringInterner::new();
    let words = ["a", "b", "ab", "ba", "abc", "", "A"];

    let ids: Vec<StringId> = words
        .iter()
        .map(|w| interner.intern_str(&mut arena, w).unwrap())
        .collect();

    for i in 0..ids.len() {
        for j in 0..ids.len() {
            assert_eq!(ids[i] == ids[j], words[i] == words[j], "{} vs {}", words[i], words[j]);
        }
    }
}

#[test]
fn test_empty_string_is_pre_interned() {
    let mut arena = Arena::default();
    let mut interner = StringInterner::new();

    assert_eq!(interner.intern(&mut arena, b"").unwrap(), StringId::EMPTY);
    assert_eq!(interner.resolve(&arena, StringId::EMPTY), Some(&b""[..]));
    assert!(interner.is_empty());
    assert_eq!(arena.allocated_bytes(), 0);
}

#[test]
fn test_resolve_borrows_arena_bytes() {
    let mut arena = Arena::default();
    let mut interner = StringInterner::new();
    let id = interner.intern(&mut arena, &[0xff, 0x00, 0x7f]).unwrap();

    assert_eq!(interner.resolve(&arena, id), Some(&[0xff, 0x00, 0x7f][..]));
    // Not UTF-8, so the str view is unavailable.
    assert_eq!(interner.resolve_str(&arena, id), None);
}

#[test]
fn test_lookup_does_not_insert() {
    let mut arena = Arena::default();
    let mut interner = StringInterner::new();
    interner.intern_str(&mut arena, "known").unwrap();

    assert!(interner.lookup(&arena, b"known").is_some());
    assert!(interner.lookup(&arena, b"unknown").is_none());
    assert_eq!(interner.len(), 2);
}

#[test]
fn test_intern_propagates_out_of_memory() {
    let mut arena = Arena::new(ArenaConfig {
        chunk_size: 4,
        capacity: 4,
    });
    let mut interner = StringInterner::new();

    assert!(interner.intern_str(&mut arena, "abcd").is_ok());
    assert!(interner.intern_str(&mut arena, "e").is_err());
    // The failed entry was not registered.
    assert_eq!(interner.len(), 2);
}

#[test]
fn test_reset_forgets_entries() {
    let mut arena = Arena::default();
    let mut interner = StringInterner::new();
    let id = interner.intern_str(&mut arena, "gone").unwrap();

    arena.reset();
    interner.reset();

    assert_eq!(interner.resolve(&arena, id), None);
    assert!(interner.is_empty());
}
