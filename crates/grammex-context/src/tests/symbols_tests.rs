//! Tests for symbol tables.

use crate::symbols::{SymbolEntry, SymbolTable};
use grammex_common::Span;
use grammex_grammar::SymbolScope;

fn entry(name: &str, symbol_type: &str, scope: SymbolScope, language: &str) -> SymbolEntry {
    SymbolEntry {
        name: name.to_string(),
        symbol_type: symbol_type.to_string(),
        scope,
        language: language.to_string(),
        span: Span::default(),
    }
}

#[test]
fn test_first_definition_wins() {
    let mut table = SymbolTable::new();
    assert!(table.insert(entry("x", "variable", SymbolScope::Local, "JS")));
    assert!(!table.insert(entry("x", "function", SymbolScope::Local, "JS")));
    assert_eq!(table.get("x").unwrap().symbol_type, "variable");
    assert_eq!(table.len(), 1);
}

#[test]
fn test_merge_exports_parent_wins() {
    let mut parent = SymbolTable::new();
    parent.insert(entry("main", "id", SymbolScope::Export, "HTML"));

    let mut child = SymbolTable::new();
    child.insert(entry("main", "selector", SymbolScope::Export, "CSS"));
    child.insert(entry(".a", "selector", SymbolScope::Export, "CSS"));
    child.insert(entry("tmp", "selector", SymbolScope::Local, "CSS"));

    assert_eq!(parent.merge_exports(child), 1);
    assert_eq!(parent.get("main").unwrap().language, "HTML");
    assert_eq!(parent.get(".a").unwrap().language, "CSS");
    assert!(!parent.contains("tmp"));
    assert_eq!(parent.names().collect::<Vec<_>>(), ["main", ".a"]);
}

#[test]
fn test_table_serializes_as_map() {
    let mut table = SymbolTable::new();
    table.insert(entry(".a", "selector", SymbolScope::Export, "CSS"));
    let json = serde_json::to_value(&table).unwrap();
    assert_eq!(json[".a"]["symbol_type"], "selector");
    assert_eq!(json[".a"]["scope"], "export");
}
