//! grammex: grammar composition and context-sensitive step parsing.
//!
//! The workspace crates are re-exported under short names:
//! - `common` - arena, interner, spans, diagnostics, limits, cancellation
//! - `grammar` - grammar model, loader, inheritance, composition, `GrammarSet`
//! - `scanner` - the step lexer
//! - `context` - the context stack, symbol tables, cross-language validation
//! - `parser` - the arena AST, serialization and the `StepParser` driver
//!
//! Most callers only need the functions at the crate root:
//!
//! ```no_run
//! use grammex::{GrammarSet, ParseOptions, load_grammar, parse};
//!
//! let grammar = load_grammar(
//!     "grammar Words; skip /\\s+/; token WORD = /[a-z]+/; words : WORD* EOF ;",
//! )?;
//! let set = GrammarSet::build([grammar])?;
//! let doc = parse("hello world", &set, "Words", ParseOptions::default())?;
//! assert!(doc.diagnostics.is_empty());
//! # Ok::<(), grammex::Error>(())
//! ```

pub use grammex_common as common;
pub use grammex_context as context;
pub use grammex_grammar as grammar;
pub use grammex_parser as parser;
pub use grammex_scanner as scanner;

pub use grammex_common::{
    ArenaConfig, CancellationToken, Diagnostic, DiagnosticKind, DiagnosticSeverity, Position,
    Span,
};
pub use grammex_context::{
    CrossLanguageValidator, CrossReference, ScopeChain, SymbolEntry, SymbolExistsValidator,
    SymbolTable,
};
pub use grammex_grammar::{Grammar, GrammarError, GrammarSet, PrecedenceTable};
pub use grammex_parser::{
    ActionTable, AstArena, AstError, DecodeError, NodeId, NodeType, ParseError, ParseOptions,
    SemanticActions, SerializedTree, StepParser,
};

pub mod tracing_config;

mod document;
pub use document::ParsedDocument;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Any failure the facade can report.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Ast(#[from] AstError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Parse a grammar description.
pub fn load_grammar(source: &str) -> Result<Grammar, GrammarError> {
    grammex_grammar::load_grammar(source)
}

/// Read and parse a grammar description file.
pub fn load_grammar_file(path: impl AsRef<Path>) -> Result<Grammar, GrammarError> {
    grammex_grammar::load_grammar_file(path)
}

/// Merge `embedded` into `primary`. On a name clash the grammar with the
/// lower precedence number wins; equal precedence is a composition error.
pub fn compose_grammar(
    primary: &Grammar,
    embedded: &[Grammar],
    precedence: &PrecedenceTable,
) -> Result<Grammar, GrammarError> {
    grammex_grammar::compose(primary, embedded, precedence)
}

/// Parse `source` with the grammar named `grammar_name` from `grammars`.
///
/// The tree is built in a fresh arena sized by `options.arena`. Syntax
/// errors, validation warnings and resource limits end up in
/// `ParsedDocument::diagnostics`; only an unknown grammar and an exhausted
/// arena are errors.
pub fn parse(
    source: &str,
    grammars: &GrammarSet,
    grammar_name: &str,
    options: ParseOptions,
) -> Result<ParsedDocument, ParseError> {
    let validator = SymbolExistsValidator;
    parse_with(
        source,
        grammars,
        grammar_name,
        options,
        &[&validator],
        None,
    )
}

/// Like [`parse`], with caller-supplied validators and semantic actions.
///
/// No validator is added implicitly; pass `SymbolExistsValidator` to keep
/// the default unresolved-reference warnings.
pub fn parse_with(
    source: &str,
    grammars: &GrammarSet,
    grammar_name: &str,
    options: ParseOptions,
    validators: &[&dyn CrossLanguageValidator],
    actions: Option<&mut ActionTable>,
) -> Result<ParsedDocument, ParseError> {
    let mut arena = AstArena::new(options.arena);
    let mut parser = StepParser::new(grammars, options);
    for validator in validators {
        parser = parser.with_validator(*validator);
    }
    let outcome = parser.parse_with_actions(&mut arena, source, grammar_name, actions)?;
    debug!(
        grammar = grammar_name,
        nodes = arena.node_count(),
        complete = outcome.complete,
        "document parsed"
    );
    Ok(ParsedDocument::new(arena, outcome))
}

/// Load every grammar description in `grammar_sources`, build the set and
/// parse `source` with `grammar_name`.
pub fn parse_with_grammar_sources(
    grammar_sources: &[&str],
    source: &str,
    grammar_name: &str,
    options: ParseOptions,
) -> Result<ParsedDocument> {
    let grammars = grammar_sources
        .iter()
        .map(|text| load_grammar(text))
        .collect::<Result<Vec<_>, _>>()?;
    let set = GrammarSet::build(grammars)?;
    Ok(parse(source, &set, grammar_name, options)?)
}

/// Encode the tree rooted at `root` into the flat binary layout.
pub fn serialize(arena: &AstArena, root: NodeId) -> Result<Vec<u8>, AstError> {
    grammex_parser::serialize(arena, root)
}

/// Rebuild a serialized tree in `arena`, returning its root.
pub fn deserialize(bytes: &[u8], arena: &mut AstArena) -> Result<NodeId, DecodeError> {
    grammex_parser::deserialize(bytes, arena)
}
