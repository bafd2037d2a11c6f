//! Tests for spans and line maps.

use crate::span::{LineMap, Position, Span};

#[test]
fn test_line_map_positions() {
    let text = "ab\ncd\n\nxyz";
    let map = LineMap::new(text);

    assert_eq!(map.line_count(), 4);
    assert_eq!(map.position(text, 0), Position::new(1, 1, 0));
    assert_eq!(map.position(text, 1), Position::new(1, 2, 1));
    assert_eq!(map.position(text, 3), Position::new(2, 1, 3));
    assert_eq!(map.position(text, 6), Position::new(3, 1, 6));
    assert_eq!(map.position(text, 9), Position::new(4, 3, 9));
}

#[test]
fn test_columns_count_characters() {
    let text = "é = 1";
    let map = LineMap::new(text);
    // 'é' is two bytes but one column.
    assert_eq!(map.position(text, 2), Position::new(1, 2, 2));
}

#[test]
fn test_offsets_past_end_are_clamped() {
    let text = "abc";
    let map = LineMap::new(text);
    assert_eq!(map.position(text, 99).offset, 3);
}

#[test]
fn test_span_start_and_end_are_independent() {
    let mut span = Span::new(Position::new(1, 1, 0), Position::new(1, 5, 4));

    span.set_start(Position::new(1, 2, 1));
    assert_eq!(span.end(), Position::new(1, 5, 4));

    span.set_end(Position::new(2, 1, 8));
    assert_eq!(span.start(), Position::new(1, 2, 1));
    assert_eq!(span.len(), 7);
}

#[test]
fn test_span_containment_and_cover() {
    let outer = Span::new(Position::new(1, 1, 0), Position::new(1, 11, 10));
    let inner = Span::new(Position::new(1, 3, 2), Position::new(1, 5, 4));
    let other = Span::new(Position::new(1, 9, 8), Position::new(1, 13, 12));

    assert!(outer.contains(&inner));
    assert!(!inner.contains(&outer));
    assert!(!outer.contains(&other));

    let covered = inner.cover(&other);
    assert_eq!(covered.start_offset, 2);
    assert_eq!(covered.end_offset, 12);
}
