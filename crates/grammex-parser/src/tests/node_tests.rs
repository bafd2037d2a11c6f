//! Tests for the arena-resident node store.

use crate::ast::{AstArena, AstError, NodeType, node_flags};
use grammex_common::{ArenaConfig, Position, Span};

fn span(start: u32, end: u32) -> Span {
    Span::new(
        Position::new(1, start + 1, start),
        Position::new(1, end + 1, end),
    )
}

#[test]
fn test_create_and_read_back() {
    let mut arena = AstArena::default();
    let node = arena
        .create_node(NodeType::Identifier, "IDENT", "foo", span(4, 7))
        .unwrap();

    assert_eq!(arena.node_type(node).unwrap(), NodeType::Identifier);
    assert_eq!(arena.name(node).unwrap(), "IDENT");
    assert_eq!(arena.value(node).unwrap(), "foo");
    assert_eq!(arena.text(node).unwrap(), "foo");
    assert_eq!(arena.span(node).unwrap(), span(4, 7));
    assert_eq!(arena.parent(node).unwrap(), None);
    assert_eq!(arena.child_count(node).unwrap(), 0);
    assert_eq!(arena.flags(node).unwrap(), 0);
    assert_eq!(arena.node_count(), 1);
}

#[test]
fn test_children_grow_past_initial_capacity() {
    let mut arena = AstArena::default();
    let parent = arena
        .create_node(NodeType::NonTerminal, "list", "", span(0, 20))
        .unwrap();
    let mut expected = Vec::new();
    for i in 0..10u32 {
        let child = arena
            .create_node(NodeType::Literal, "NUM", &i.to_string(), span(i * 2, i * 2 + 1))
            .unwrap();
        arena.add_child(parent, child).unwrap();
        expected.push(child);
    }

    assert_eq!(arena.children(parent).unwrap(), expected);
    assert_eq!(arena.child_count(parent).unwrap(), 10);
    assert_eq!(arena.child_at(parent, 9).unwrap(), Some(expected[9]));
    assert_eq!(arena.child_at(parent, 10).unwrap(), None);
    for child in &expected {
        assert_eq!(arena.parent(*child).unwrap(), Some(parent));
    }
    assert_eq!(arena.text(parent).unwrap(), "0123456789");
}

#[test]
fn test_add_child_rejects_reparenting_and_older_nodes() {
    let mut arena = AstArena::default();
    let a = arena.create_node(NodeType::NonTerminal, "a", "", span(0, 0)).unwrap();
    let b = arena.create_node(NodeType::NonTerminal, "b", "", span(0, 0)).unwrap();
    arena.add_child(a, b).unwrap();

    assert!(matches!(
        arena.add_child(a, b),
        Err(AstError::AlreadyHasParent { .. })
    ));

    let c = arena.create_node(NodeType::NonTerminal, "c", "", span(0, 0)).unwrap();
    assert!(matches!(
        arena.add_child(c, a),
        Err(AstError::InvalidChild { .. })
    ));
    assert!(matches!(
        arena.add_child(c, c),
        Err(AstError::InvalidChild { .. })
    ));
}

#[test]
fn test_truncate_children_detaches() {
    let mut arena = AstArena::default();
    let parent = arena.create_node(NodeType::NonTerminal, "p", "", span(0, 3)).unwrap();
    let kids: Vec<_> = (0..3)
        .map(|i| {
            let kid = arena
                .create_node(NodeType::Terminal, "T", "x", span(i, i + 1))
                .unwrap();
            arena.add_child(parent, kid).unwrap();
            kid
        })
        .collect();

    arena.truncate_children(parent, 1).unwrap();
    assert_eq!(arena.children(parent).unwrap(), [kids[0]]);
    assert_eq!(arena.parent(kids[1]).unwrap(), None);

    // A detached node can be attached again.
    let other = arena.create_node(NodeType::NonTerminal, "q", "", span(0, 0)).unwrap();
    assert!(arena.add_child(other, kids[2]).is_err());
    arena.add_child(parent, kids[2]).unwrap();
    assert_eq!(arena.child_count(parent).unwrap(), 2);
}

#[test]
fn test_position_updates() {
    let mut arena = AstArena::default();
    let a = arena.create_node(NodeType::NonTerminal, "a", "", span(0, 0)).unwrap();
    let b = arena.create_node(NodeType::NonTerminal, "b", "", span(9, 9)).unwrap();

    arena.set_start_position(a, Position::new(2, 3, 10)).unwrap();
    arena.set_end_position(a, Position::new(2, 8, 15)).unwrap();
    let got = arena.span(a).unwrap();
    assert_eq!((got.start_line, got.start_column, got.start_offset), (2, 3, 10));
    assert_eq!((got.end_line, got.end_column, got.end_offset), (2, 8, 15));

    arena.copy_position_from(b, a).unwrap();
    assert_eq!(arena.span(b).unwrap(), got);
}

#[test]
fn test_flags() {
    let mut arena = AstArena::default();
    let node = arena.create_node(NodeType::NonTerminal, "r", "", span(0, 0)).unwrap();
    assert!(!arena.has_flag(node, node_flags::INCOMPLETE).unwrap());
    arena.set_flags(node, node_flags::INCOMPLETE).unwrap();
    assert!(arena.has_flag(node, node_flags::INCOMPLETE).unwrap());
    assert_eq!(arena.node_type(node).unwrap(), NodeType::NonTerminal);
}

#[test]
fn test_stale_handle_after_reset() {
    let mut arena = AstArena::default();
    let node = arena.create_node(NodeType::Program, "G", "", span(0, 0)).unwrap();
    arena.reset();

    assert!(matches!(
        arena.node_type(node),
        Err(AstError::StaleHandle { .. })
    ));
    assert_eq!(arena.node_count(), 0);

    // Offsets are reused after a reset; the old handle must stay stale.
    let fresh = arena.create_node(NodeType::Program, "G", "", span(0, 0)).unwrap();
    assert_eq!(fresh.offset(), node.offset());
    assert!(arena.name(node).is_err());
    assert_eq!(arena.name(fresh).unwrap(), "G");
}

#[test]
fn test_out_of_memory() {
    let mut arena = AstArena::new(ArenaConfig::with_capacity(256));
    let mut result = Ok(());
    for i in 0..64 {
        match arena.create_node(NodeType::Literal, "N", &i.to_string(), span(0, 1)) {
            Ok(_) => {}
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    assert!(matches!(result, Err(AstError::OutOfMemory(_))));
}

#[test]
fn test_traversal_and_dump() {
    let mut arena = AstArena::default();
    let root = arena.create_node(NodeType::Program, "Arith", "", span(0, 3)).unwrap();
    let expr = arena.create_node(NodeType::NonTerminal, "expr", "", span(0, 3)).unwrap();
    arena.add_child(root, expr).unwrap();
    let one = arena.create_node(NodeType::Literal, "NUMBER", "1", span(0, 1)).unwrap();
    arena.add_child(expr, one).unwrap();
    let plus = arena.create_node(NodeType::Terminal, "\"+\"", "+", span(1, 2)).unwrap();
    arena.add_child(expr, plus).unwrap();
    let two = arena.create_node(NodeType::Literal, "NUMBER", "2", span(2, 3)).unwrap();
    arena.add_child(expr, two).unwrap();
    arena.set_flags(expr, node_flags::INCOMPLETE).unwrap();

    assert_eq!(arena.descendants(root).unwrap(), [root, expr, one, plus, two]);
    assert_eq!(arena.find_named(root, "NUMBER").unwrap(), Some(one));
    assert_eq!(arena.find_named(root, "missing").unwrap(), None);
    assert_eq!(arena.text(expr).unwrap(), "1+2");
    assert_eq!(arena.source_text(expr, "1+2").unwrap(), "1+2");

    let expected = "\
(Program Arith
  (NonTerminal expr !incomplete
    (Literal NUMBER \"1\")
    (Terminal \"+\" \"+\")
    (Literal NUMBER \"2\")
  )
)
";
    assert_eq!(arena.dump(root).unwrap(), expected);

    let json = arena.to_json(root).unwrap();
    assert_eq!(json["type"], "Program");
    assert_eq!(json["children"][0]["incomplete"], true);
    assert_eq!(json["children"][0]["children"][2]["value"], "2");
}
