//! Step machine behaviour, exercised through single-grammar parses.

use crate::ast::{AstArena, NodeId, NodeType, node_flags};
use crate::step::{ParseOptions, ParseOutcome, StepParser};
use grammex_common::DiagnosticKind;
use grammex_grammar::{GrammarSet, load_grammar};

const ARITH: &str = r#"
grammar Arith;
skip /\s+/;
token NUMBER = /[0-9]+/ : literal;
sync ";";
start program;
program : statement* EOF ;
statement : expr ";" ;
expr : term (("+" | "-") term)* ;
term : factor (("*" | "/") factor)* ;
factor : NUMBER | "(" expr ")" ;
"#;

fn grammar_set(sources: &[&str]) -> GrammarSet {
    GrammarSet::build(sources.iter().map(|s| load_grammar(s).unwrap())).unwrap()
}

fn parse(set: &GrammarSet, grammar: &str, source: &str) -> (AstArena, ParseOutcome) {
    parse_with(set, grammar, source, ParseOptions::default())
}

fn parse_with(
    set: &GrammarSet,
    grammar: &str,
    source: &str,
    options: ParseOptions,
) -> (AstArena, ParseOutcome) {
    let mut arena = AstArena::default();
    let outcome = StepParser::new(set, options)
        .parse(&mut arena, source, grammar)
        .unwrap();
    (arena, outcome)
}

fn children(arena: &AstArena, node: NodeId) -> Vec<NodeId> {
    arena.children(node).unwrap()
}

fn eval(arena: &AstArena, node: NodeId) -> i64 {
    let kids = children(arena, node);
    match arena.name(node).unwrap() {
        "factor" if kids.len() == 1 => arena.value(kids[0]).unwrap().parse().unwrap(),
        "factor" => eval(arena, kids[1]),
        "expr" | "term" => {
            let mut acc = eval(arena, kids[0]);
            for pair in kids[1..].chunks(2) {
                let rhs = eval(arena, pair[1]);
                match arena.value(pair[0]).unwrap() {
                    "+" => acc += rhs,
                    "-" => acc -= rhs,
                    "*" => acc *= rhs,
                    "/" => acc /= rhs,
                    op => panic!("unexpected operator {op}"),
                }
            }
            acc
        }
        "statement" => eval(arena, kids[0]),
        other => panic!("unexpected node {other}"),
    }
}

/// Values of every statement in the first `program` node.
fn evaluate(source: &str) -> Vec<i64> {
    let set = grammar_set(&[ARITH]);
    let (arena, outcome) = parse(&set, "Arith", source);
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    let program = children(&arena, outcome.root)[0];
    children(&arena, program)
        .into_iter()
        .map(|statement| eval(&arena, statement))
        .collect()
}

#[test]
fn test_precedence_shapes_the_tree() {
    assert_eq!(evaluate("1 + 2 * 3;"), [7]);
    assert_eq!(evaluate("(1 + 2) * 3;"), [9]);
    assert_eq!(evaluate("10 - 4 - 3; 8 / 2 / 2;"), [3, 2]);
}

#[test]
fn test_empty_input_is_accepted() {
    let set = grammar_set(&[ARITH]);
    let (arena, outcome) = parse(&set, "Arith", "");
    assert!(outcome.diagnostics.is_empty());
    assert!(outcome.complete);
    let program = children(&arena, outcome.root)[0];
    assert_eq!(arena.name(program).unwrap(), "program");
    assert_eq!(arena.child_count(program).unwrap(), 0);
}

#[test]
fn test_spans_cover_tokens() {
    let set = grammar_set(&[ARITH]);
    let source = "1 + 2 * 3;\n";
    let (arena, outcome) = parse(&set, "Arith", source);
    let program = children(&arena, outcome.root)[0];
    let statement = children(&arena, program)[0];
    let expr = children(&arena, statement)[0];

    assert_eq!(arena.source_text(statement, source).unwrap(), "1 + 2 * 3;");
    assert_eq!(arena.source_text(expr, source).unwrap(), "1 + 2 * 3");
    let span = arena.span(expr).unwrap();
    assert_eq!((span.start_line, span.start_column), (1, 1));
    assert_eq!((span.end_line, span.end_column), (1, 10));

    // Every child lies within its parent.
    for node in arena.descendants(outcome.root).unwrap() {
        let outer = arena.span(node).unwrap();
        for child in children(&arena, node) {
            assert!(outer.contains(&arena.span(child).unwrap()));
        }
    }
}

#[test]
fn test_syntax_error_recovers_at_sync_token() {
    let set = grammar_set(&[ARITH]);
    let (arena, outcome) = parse(&set, "Arith", "1 + ;\n2 * 3;");

    assert_eq!(outcome.diagnostics.len(), 1);
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::SyntaxError);
    assert_eq!(diagnostic.message, "unexpected ';', expected NUMBER, \"(\"");
    assert_eq!(diagnostic.language, "Arith");
    assert_eq!((diagnostic.span.start_line, diagnostic.span.start_column), (1, 5));
    assert!(outcome.complete);

    let top = children(&arena, outcome.root);
    assert_eq!(top.len(), 3);
    assert!(arena.has_flag(top[0], node_flags::INCOMPLETE).unwrap());
    assert_eq!(arena.node_type(top[1]).unwrap(), NodeType::Error);
    assert_eq!(arena.value(top[1]).unwrap(), ";");
    assert_eq!(arena.name(top[2]).unwrap(), "program");
    assert!(!arena.has_flag(top[2], node_flags::INCOMPLETE).unwrap());

    // The partial statement keeps what was consumed.
    let statement = children(&arena, top[0])[0];
    let expr = children(&arena, statement)[0];
    assert_eq!(arena.text(expr).unwrap(), "1+");
}

#[test]
fn test_unexpected_end_of_input() {
    let set = grammar_set(&[ARITH]);
    let (_, outcome) = parse(&set, "Arith", "1 +");
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(
        outcome.diagnostics[0].message,
        "unexpected end of input, expected NUMBER, \"(\""
    );
}

#[test]
fn test_unknown_character_is_skipped_to_sync() {
    let set = grammar_set(&[ARITH]);
    let (arena, outcome) = parse(&set, "Arith", "1 ? 2; 3;");
    assert_eq!(outcome.diagnostics.len(), 1);
    assert!(outcome.diagnostics[0].message.starts_with("unexpected '?'"));

    let error = arena
        .find_first(outcome.root, |a, n| a.node_type(n).unwrap() == NodeType::Error)
        .unwrap()
        .unwrap();
    assert_eq!(arena.value(error).unwrap(), "? 2;");
}

#[test]
fn test_first_alternative_wins_ties() {
    let set = grammar_set(&[r#"
        grammar Amb;
        token ID = /[a-z]+/ : identifier;
        doc : first | second ;
        first : ID ;
        second : ID ;
    "#]);
    let (arena, outcome) = parse(&set, "Amb", "x");
    let doc = children(&arena, outcome.root)[0];
    let chosen = children(&arena, doc)[0];
    assert_eq!(arena.name(chosen).unwrap(), "first");
}

#[test]
fn test_path_reaching_end_of_input_wins() {
    let set = grammar_set(&[r#"
        grammar Long;
        skip /\s+/;
        token ID = /[a-z]+/ : identifier;
        doc : single | pair ;
        single : ID ;
        pair : ID ID ;
    "#]);
    let (arena, outcome) = parse(&set, "Long", "a b");
    assert!(outcome.diagnostics.is_empty());
    let doc = children(&arena, outcome.root)[0];
    assert_eq!(arena.name(children(&arena, doc)[0]).unwrap(), "pair");

    let (arena, outcome) = parse(&set, "Long", "a");
    let doc = children(&arena, outcome.root)[0];
    assert_eq!(arena.name(children(&arena, doc)[0]).unwrap(), "single");
}

#[test]
fn test_inline_rules_produce_no_nodes() {
    let set = grammar_set(&[r#"
        grammar Inl;
        skip /\s+/;
        token ID = /[a-z]+/ : identifier;
        list : ID more* ;
        inline more : "," ID ;
    "#]);
    let (arena, outcome) = parse(&set, "Inl", "a, b, c");
    let list = children(&arena, outcome.root)[0];
    let kinds: Vec<NodeType> = children(&arena, list)
        .into_iter()
        .map(|n| arena.node_type(n).unwrap())
        .collect();
    assert_eq!(
        kinds,
        [
            NodeType::Identifier,
            NodeType::Terminal,
            NodeType::Identifier,
            NodeType::Terminal,
            NodeType::Identifier,
        ]
    );
}

#[test]
fn test_nullable_loops_terminate() {
    let set = grammar_set(&[r#"
        grammar Loop;
        skip /\s+/;
        token ID = /[a-z]+/ : identifier;
        doc : item* ;
        item : ID? ;
    "#]);
    let (arena, outcome) = parse(&set, "Loop", "a b");
    assert!(outcome.diagnostics.is_empty());
    let doc = children(&arena, outcome.root)[0];
    assert_eq!(arena.text(doc).unwrap(), "ab");
}

#[test]
fn test_rule_depth_bound_drops_deep_paths() {
    let set = grammar_set(&[r#"
        grammar Deep;
        skip /\s+/;
        list : "a" list? ;
    "#]);
    let options = ParseOptions {
        max_rule_depth: 3,
        ..ParseOptions::default()
    };
    let (_, outcome) = parse_with(&set, "Deep", "a a", options.clone());
    assert!(outcome.diagnostics.is_empty());

    let (_, outcome) = parse_with(&set, "Deep", "a a a a a", options);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::SyntaxError);
}

#[test]
fn test_parsing_is_deterministic() {
    let set = grammar_set(&[ARITH]);
    let source = "1 + (2 * 3; 4 - ; 5 * 6;";
    let (first, a) = parse(&set, "Arith", source);
    let (second, b) = parse(&set, "Arith", source);
    assert_eq!(first.dump(a.root).unwrap(), second.dump(b.root).unwrap());
    assert_eq!(a.diagnostics, b.diagnostics);
}

#[test]
fn test_unknown_grammar_is_an_error() {
    let set = grammar_set(&[ARITH]);
    let mut arena = AstArena::default();
    let err = StepParser::new(&set, ParseOptions::default())
        .parse(&mut arena, "1;", "Nope")
        .unwrap_err();
    assert!(err.to_string().contains("Nope"));
}
