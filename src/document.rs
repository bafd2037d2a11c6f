use crate::{AstArena, AstError, DecodeError, NodeId};
use grammex_common::{ArenaConfig, Diagnostic};
use grammex_context::{CrossReference, SymbolTable};
use grammex_parser::ParseOutcome;
use serde_json::json;

/// A parsed document: the arena that owns the tree, the tree's root and
/// everything the parse reported.
#[derive(Debug)]
pub struct ParsedDocument {
    pub arena: AstArena,
    pub root: NodeId,
    pub diagnostics: Vec<Diagnostic>,
    /// Symbols visible at the document level after every region merged
    pub symbols: SymbolTable,
    pub cross_references: Vec<CrossReference>,
    /// False when the parse stopped early (cancellation or diagnostic limit)
    pub complete: bool,
}

impl ParsedDocument {
    pub(crate) fn new(arena: AstArena, outcome: ParseOutcome) -> Self {
        ParsedDocument {
            arena,
            root: outcome.root,
            diagnostics: outcome.diagnostics,
            symbols: outcome.symbols,
            cross_references: outcome.cross_references,
            complete: outcome.complete,
        }
    }

    /// Rebuild a document from `serialize` output. Only the tree survives a
    /// round trip; diagnostics and symbols start empty.
    pub fn from_bytes(bytes: &[u8], config: ArenaConfig) -> Result<Self, DecodeError> {
        let mut arena = AstArena::new(config);
        let root = crate::deserialize(bytes, &mut arena)?;
        Ok(ParsedDocument {
            arena,
            root,
            diagnostics: Vec::new(),
            symbols: SymbolTable::new(),
            cross_references: Vec::new(),
            complete: true,
        })
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    pub fn serialize(&self) -> Result<Vec<u8>, AstError> {
        crate::serialize(&self.arena, self.root)
    }

    /// S-expression dump of the whole tree.
    pub fn dump(&self) -> Result<String, AstError> {
        self.arena.dump(self.root)
    }

    /// The tree and every report as one JSON value.
    pub fn to_json(&self) -> Result<serde_json::Value, AstError> {
        Ok(json!({
            "complete": self.complete,
            "tree": self.arena.to_json(self.root)?,
            "diagnostics": self.diagnostics,
            "symbols": self.symbols,
            "crossReferences": self.cross_references,
        }))
    }
}
