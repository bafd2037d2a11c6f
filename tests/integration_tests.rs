//! End-to-end tests through the public facade:
//! - loading and composing grammar descriptions
//! - parsing single-language and embedded documents
//! - serialization, arena limits and determinism

use grammex::{
    ActionTable, ArenaConfig, AstArena, AstError, CrossLanguageValidator, CrossReference,
    DiagnosticKind, DiagnosticSeverity, Error, GrammarError, GrammarSet, NodeId, NodeType,
    ParseError, ParseOptions, ParsedDocument, PrecedenceTable, ScopeChain, SemanticActions,
    SymbolExistsValidator, compose_grammar, load_grammar, load_grammar_file, parse, parse_with,
    parse_with_grammar_sources,
};
use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;

const ARITH: &str = r#"
grammar Arith;
skip /\s+/;
token NUMBER = /[0-9]+/ : literal;
start expr;
expr : term (("+" | "-") term)* ;
term : factor (("*" | "/") factor)* ;
factor : NUMBER | "(" expr ")" ;
"#;

const HTML: &str = r##"
grammar HTML;
skip /\s+/;
token STRING = /"[^"]*"/ : literal;
token TEXT = /[^<>"=\s]+/ : identifier;
embed CSS on "<style>" until "</style>";
embed JS on "<script>" until "</script>";
define id_attr as id key STRING export;
start document;
document : node* EOF ;
inline node : element | style | script | TEXT ;
element : "<div" id_attr? ">" node* "</div>" ;
id_attr : "id" "=" STRING ;
style : "<style>" @CSS "</style>" ;
script : "<script>" @JS "</script>" ;
"##;

const CSS: &str = r##"
grammar CSS;
skip /\s+/;
token CLASS = /\.[A-Za-z_][\w-]*/ : identifier;
token NAME = /[A-Za-z_][\w-]*/ : identifier;
sync ";" "}";
define selector as selector export;
reference id_selector to id key NAME;
inline stylesheet : rule* ;
rule : (selector | id_selector) "{" declaration* "}" ;
selector : CLASS ;
id_selector : "#" NAME ;
declaration : NAME ":" NAME ";"? ;
"##;

const JS: &str = r##"
grammar JS;
skip /\s+/;
token IDENT = /[A-Za-z_][A-Za-z0-9_]*/ : identifier;
token NUMBER = /[0-9]+/ : literal;
sync ";";
define var_decl as variable key IDENT;
inline program : statement* ;
statement : var_decl | expr_stmt ;
var_decl : "var" IDENT "=" expr ";" ;
expr_stmt : expr ";" ;
expr : operand ("+" operand)* ;
inline operand : IDENT | NUMBER ;
"##;

fn grammar_set(sources: &[&str]) -> GrammarSet {
    GrammarSet::build(sources.iter().map(|s| load_grammar(s).unwrap())).unwrap()
}

fn web() -> GrammarSet {
    grammar_set(&[HTML, CSS, JS])
}

fn children(arena: &AstArena, node: NodeId) -> Vec<NodeId> {
    arena.children(node).unwrap()
}

fn names(arena: &AstArena, node: NodeId) -> Vec<String> {
    children(arena, node)
        .into_iter()
        .map(|c| arena.name(c).unwrap().to_string())
        .collect()
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
        other => panic!("unexpected node {other}"),
    }
}

// =============================================================================
// Single grammar
// =============================================================================

#[test]
fn test_arithmetic_respects_operator_binding() {
    let set = grammar_set(&[ARITH]);
    let doc = parse("3 + 4 * (2 - 1)", &set, "Arith", ParseOptions::default()).unwrap();

    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
    assert!(doc.complete);
    assert_eq!(doc.arena.node_type(doc.root).unwrap(), NodeType::Program);
    assert_eq!(doc.arena.name(doc.root).unwrap(), "Arith");

    let expr = children(&doc.arena, doc.root)[0];
    assert_eq!(eval(&doc.arena, expr), 7);

    // `4 * (2 - 1)` is one term under the top-level sum.
    assert_eq!(names(&doc.arena, expr), ["term", "\"+\"", "term"]);
    let product = children(&doc.arena, expr)[2];
    assert_eq!(doc.arena.source_text(product, "3 + 4 * (2 - 1)").unwrap(), "4 * (2 - 1)");

    let doc = parse("8 - 6 / 3 - 1", &set, "Arith", ParseOptions::default()).unwrap();
    let expr = children(&doc.arena, doc.root)[0];
    assert_eq!(eval(&doc.arena, expr), 5);
}

#[test]
fn test_syntax_error_is_a_diagnostic_not_an_error() {
    let set = grammar_set(&[ARITH]);
    let doc = parse("1 + * 2", &set, "Arith", ParseOptions::default()).unwrap();

    assert!(doc.has_errors());
    let errors: Vec<_> = doc.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, DiagnosticKind::SyntaxError);
    assert_eq!(errors[0].language, "Arith");
    assert_eq!((errors[0].span.start_line, errors[0].span.start_column), (1, 5));
    assert!(doc.complete);
}

#[test]
fn test_unknown_grammar_is_an_error() {
    let set = grammar_set(&[ARITH]);
    match parse("1", &set, "Nope", ParseOptions::default()).unwrap_err() {
        ParseError::Grammar(GrammarError::UnknownGrammar { name }) => assert_eq!(name, "Nope"),
        other => panic!("unexpected error {other:?}"),
    }
}

// =============================================================================
// Embedded languages
// =============================================================================

#[test]
fn test_style_element_holds_css_rules() {
    let set = web();
    let source = r#"<style>.a{color:red}</style><div id="b">x</div>"#;
    let doc = parse(source, &set, "HTML", ParseOptions::default()).unwrap();

    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);

    let document = children(&doc.arena, doc.root)[0];
    assert_eq!(names(&doc.arena, document), ["style", "element"]);

    let style = children(&doc.arena, document)[0];
    assert_eq!(
        names(&doc.arena, style),
        ["\"<style>\"", "rule", "\"</style>\""]
    );
    let rule = children(&doc.arena, style)[1];
    assert_eq!(doc.arena.node_type(rule).unwrap(), NodeType::NonTerminal);
    assert_eq!(doc.arena.source_text(rule, source).unwrap(), ".a{color:red}");

    // Back in HTML right after the region closes.
    let element = children(&doc.arena, document)[1];
    assert_eq!(doc.arena.source_text(element, source).unwrap(), r#"<div id="b">x</div>"#);

    let selector = doc.symbols.get(".a").unwrap();
    assert_eq!(selector.symbol_type, "selector");
    assert_eq!(selector.language, "CSS");
    let id = doc.symbols.get("b").unwrap();
    assert_eq!(id.symbol_type, "id");
    assert_eq!(id.language, "HTML");
}

#[test]
fn test_keyword_spelling_accepted_as_text() {
    let set = web();
    let doc = parse("<div>id</div>", &set, "HTML", ParseOptions::default()).unwrap();
    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);

    let element = children(&doc.arena, children(&doc.arena, doc.root)[0])[0];
    assert_eq!(names(&doc.arena, element), ["\"<div\"", "\">\"", "TEXT", "\"</div>\""]);
    let text = children(&doc.arena, element)[2];
    assert_eq!(doc.arena.node_type(text).unwrap(), NodeType::Identifier);
    assert_eq!(doc.arena.value(text).unwrap(), "id");

    let source = r#"<div id="id">id id</div>"#;
    let doc = parse(source, &set, "HTML", ParseOptions::default()).unwrap();
    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
    let element = children(&doc.arena, children(&doc.arena, doc.root)[0])[0];
    assert_eq!(
        names(&doc.arena, element),
        ["\"<div\"", "id_attr", "\">\"", "TEXT", "TEXT", "\"</div>\""]
    );
    assert_eq!(doc.symbols.get("id").unwrap().symbol_type, "id");
}

#[test]
fn test_script_error_recovers_at_semicolon() {
    let set = web();
    let source = "<script>var x = ;</script><div>after</div>";
    let doc = parse(source, &set, "HTML", ParseOptions::default()).unwrap();

    assert_eq!(doc.diagnostics.len(), 1);
    let error = &doc.diagnostics[0];
    assert_eq!(error.kind, DiagnosticKind::SyntaxError);
    assert_eq!(error.severity, DiagnosticSeverity::Error);
    assert_eq!(error.language, "JS");
    assert_eq!(error.span.start_offset, 16);

    let script = doc.arena.find_named(doc.root, "script").unwrap().unwrap();
    let error_node = doc
        .arena
        .find_first(script, |a, n| a.node_type(n).unwrap() == NodeType::Error)
        .unwrap()
        .unwrap();
    assert_eq!(doc.arena.value(error_node).unwrap(), ";");

    let element = doc.arena.find_named(doc.root, "element").unwrap().unwrap();
    assert_eq!(doc.arena.text(element).unwrap(), "<div>after</div>");
    assert!(doc.complete);
}

#[test]
fn test_cross_references_and_validators() {
    let set = web();
    let source = r#"<div id="app">x</div><style>#app { a: b; } #gone { a: b; }</style>"#;

    let doc = parse(source, &set, "HTML", ParseOptions::default()).unwrap();
    assert_eq!(doc.cross_references.len(), 2);
    assert!(doc.cross_references[0].resolved);
    assert!(!doc.cross_references[1].resolved);
    let warnings: Vec<_> = doc.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, DiagnosticKind::CrossLanguageValidation);
    assert_eq!(warnings[0].message, "id 'gone' referenced from CSS is not defined");

    // Without validators the references are still recorded, silently.
    let doc = parse_with(source, &set, "HTML", ParseOptions::default(), &[], None).unwrap();
    assert!(doc.diagnostics.is_empty());
    assert_eq!(doc.cross_references.len(), 2);

    // Custom validators run next to the default one.
    let custom: &dyn CrossLanguageValidator = &no_short_ids;
    let default = SymbolExistsValidator;
    let doc = parse_with(
        source,
        &set,
        "HTML",
        ParseOptions::default(),
        &[&default, custom],
        None,
    )
    .unwrap();
    let messages: Vec<&str> = doc.warnings().map(|d| d.message.as_str()).collect();
    assert_eq!(
        messages,
        [
            "id 'app' is shorter than five characters",
            "id 'gone' referenced from CSS is not defined",
            "id 'gone' is shorter than five characters",
        ]
    );
}

fn no_short_ids(reference: &CrossReference, _scopes: ScopeChain<'_>) -> Option<String> {
    (reference.symbol_name.chars().count() < 5).then(|| {
        format!(
            "{} '{}' is shorter than five characters",
            reference.reference_kind, reference.symbol_name
        )
    })
}

struct ExitCounter(Rc<Cell<usize>>);

impl SemanticActions for ExitCounter {
    fn on_exit_rule(&mut self, _arena: &AstArena, _node: NodeId) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
fn test_parse_with_semantic_actions() {
    let set = grammar_set(&[ARITH]);
    let exits = Rc::new(Cell::new(0));
    let mut actions = ActionTable::new();
    actions.register("Arith", NodeType::NonTerminal, ExitCounter(exits.clone()));

    let doc = parse_with(
        "1 + 2",
        &set,
        "Arith",
        ParseOptions::default(),
        &[],
        Some(&mut actions),
    )
    .unwrap();
    assert!(doc.diagnostics.is_empty());
    // Two factors, two terms and one expr.
    assert_eq!(exits.get(), 5);
}

// =============================================================================
// Composition and loading
// =============================================================================

const SUM: &str = r#"
grammar Sum;
precedence 1;
skip /\s+/;
token NUMBER = /[0-9]+/ : literal;
start expression;
expression : NUMBER ("+" NUMBER)* ;
"#;

const PRODUCT: &str = r#"
grammar Product;
precedence 2;
skip /\s+/;
token NUMBER = /[0-9]+/ : literal;
start expression;
expression : NUMBER ("*" NUMBER)* ;
"#;

#[test]
fn test_composition_keeps_lower_precedence_rule() {
    let sum = load_grammar(SUM).unwrap();
    let product = load_grammar(PRODUCT).unwrap();
    let composed = compose_grammar(&product, &[sum], &PrecedenceTable::new()).unwrap();
    assert_eq!(composed.name, "Product");

    let set = GrammarSet::build([composed]).unwrap();
    let doc = parse("1 + 2", &set, "Product", ParseOptions::default()).unwrap();
    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);

    let doc = parse("1 * 2", &set, "Product", ParseOptions::default()).unwrap();
    assert_eq!(doc.errors().count(), 1);
}

#[test]
fn test_composition_conflict_at_equal_precedence() {
    let sum = load_grammar(SUM).unwrap();
    let product = load_grammar(PRODUCT).unwrap();
    let table = PrecedenceTable::new().with("Sum", 3).with("Product", 3);

    match compose_grammar(&product, &[sum], &table).unwrap_err() {
        GrammarError::Composition {
            what, name, precedence, ..
        } => {
            assert_eq!(what, "rule");
            assert_eq!(name, "expression");
            assert_eq!(precedence, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_load_grammar_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(ARITH.as_bytes()).unwrap();
    file.flush().unwrap();

    let grammar = load_grammar_file(file.path()).unwrap();
    assert_eq!(grammar.name, "Arith");

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.grammar");
    assert!(matches!(
        load_grammar_file(&missing).unwrap_err(),
        GrammarError::Io { .. }
    ));
}

#[test]
fn test_parse_with_grammar_sources() {
    let doc = parse_with_grammar_sources(&[ARITH], "2 * 21", "Arith", ParseOptions::default())
        .unwrap();
    let expr = children(&doc.arena, doc.root)[0];
    assert_eq!(eval(&doc.arena, expr), 42);

    let err = parse_with_grammar_sources(&["grammar Broken; a : b ;"], "x", "Broken", ParseOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Grammar(GrammarError::UndefinedRule { .. })), "{err}");

    let err = parse_with_grammar_sources(&[ARITH], "1", "Other", ParseOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Parse(ParseError::Grammar(_))));
    assert_eq!(err.to_string(), "unknown grammar 'Other'");
}

// =============================================================================
// Trees, arenas and determinism
// =============================================================================

#[test]
fn test_serialize_round_trip_preserves_tree() {
    let set = web();
    let source = r#"<div id="a"><style>.x { a: b; }</style></div><script>var y = 1 + 2;</script>"#;
    let doc = parse(source, &set, "HTML", ParseOptions::default()).unwrap();

    let bytes = doc.serialize().unwrap();
    let copy = ParsedDocument::from_bytes(&bytes, ArenaConfig::default()).unwrap();

    assert_eq!(copy.dump().unwrap(), doc.dump().unwrap());
    assert_eq!(copy.serialize().unwrap(), bytes);
    assert_eq!(copy.arena.node_count(), doc.arena.node_count());

    let original = doc.arena.descendants(doc.root).unwrap();
    let restored = copy.arena.descendants(copy.root).unwrap();
    for (a, b) in original.into_iter().zip(restored) {
        assert_eq!(doc.arena.node_type(a).unwrap(), copy.arena.node_type(b).unwrap());
        assert_eq!(doc.arena.span(a).unwrap(), copy.arena.span(b).unwrap());
        assert_eq!(doc.arena.value(a).unwrap(), copy.arena.value(b).unwrap());
    }

    assert!(matches!(
        ParsedDocument::from_bytes(&bytes[..10], ArenaConfig::default()),
        Err(grammex::DecodeError::Truncated { .. })
    ));
}

#[test]
fn test_parse_is_deterministic() {
    let set = web();
    let source = r#"<div id="m">t</div><style>.a { b: c; } #m { d: e }</style><script>var q = ;</script>"#;
    let first = parse(source, &set, "HTML", ParseOptions::default()).unwrap();
    let second = parse(source, &set, "HTML", ParseOptions::default()).unwrap();

    assert_eq!(first.serialize().unwrap(), second.serialize().unwrap());
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.symbols, second.symbols);
    assert_eq!(first.cross_references, second.cross_references);
}

#[test]
fn test_arena_capacity_is_enforced() {
    let set = web();
    let source = format!("{};", vec!["a"; 400].join(" + "));
    let options = ParseOptions {
        arena: ArenaConfig::with_capacity(4096),
        ..ParseOptions::default()
    };
    assert!(matches!(
        parse(&source, &set, "JS", options).unwrap_err(),
        ParseError::OutOfMemory { .. }
    ));
}

#[test]
fn test_handles_are_stale_after_reset() {
    let set = grammar_set(&[ARITH]);
    let mut doc = parse("1 + 2", &set, "Arith", ParseOptions::default()).unwrap();
    let root = doc.root;
    let expr = children(&doc.arena, root)[0];

    doc.arena.reset();
    assert!(matches!(doc.arena.node_type(root), Err(AstError::StaleHandle { .. })));
    assert!(matches!(doc.arena.children(expr), Err(AstError::StaleHandle { .. })));
}

#[test]
fn test_document_json() {
    let set = web();
    let doc = parse(
        "<style>#x { a: b; }</style>",
        &set,
        "HTML",
        ParseOptions::default(),
    )
    .unwrap();
    let json = doc.to_json().unwrap();

    assert_eq!(json["complete"], true);
    assert_eq!(json["tree"]["type"], "Program");
    assert_eq!(json["tree"]["name"], "HTML");
    assert_eq!(json["diagnostics"][0]["kind"], "CrossLanguageValidation");
    assert_eq!(json["crossReferences"][0]["symbol_name"], "x");
}
