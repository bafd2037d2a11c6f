//! Per-context symbol tables.

use grammex_common::Span;
use grammex_grammar::SymbolScope;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SymbolEntry {
    pub name: String,
    pub symbol_type: String,
    pub scope: SymbolScope,
    /// Grammar of the context that defined the symbol
    pub language: String,
    pub span: Span,
}

impl SymbolEntry {
    #[inline]
    pub fn is_exported(&self) -> bool {
        self.scope == SymbolScope::Export
    }
}

/// Symbols keyed by name, in definition order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SymbolTable {
    entries: IndexMap<String, SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Insert unless the name is taken. The first definition wins; returns
    /// whether the entry was added.
    pub fn insert(&mut self, entry: SymbolEntry) -> bool {
        if self.entries.contains_key(&entry.name) {
            return false;
        }
        self.entries.insert(entry.name.clone(), entry);
        true
    }

    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Merge a child's exported entries. Existing entries are never
    /// overwritten; returns how many were added.
    pub fn merge_exports(&mut self, child: SymbolTable) -> usize {
        let mut added = 0;
        for entry in child.entries.into_values().filter(SymbolEntry::is_exported) {
            if self.insert(entry) {
                added += 1;
            }
        }
        added
    }
}
