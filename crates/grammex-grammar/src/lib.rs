//! Grammar model and grammar-level tooling for grammex.
//!
//! - `model` - `Grammar`, `Production`, `Expr` and the declaration records
//! - `loader` - the textual grammar description format
//! - `inheritance` - cycle detection, inheritance flattening, composition
//! - `compiled` - lowering of rules into step programs for the parser
//! - `registry` - `GrammarSet`, the validated collection handed to the parser

pub mod error;
pub use error::GrammarError;

pub mod model;
pub use model::{
    Embedding, Expr, Grammar, Production, RuleKind, SymbolDefinition, SymbolReference,
    SymbolScope, SyncTerminal, TerminalKind, TokenDef, TokenPattern,
};

pub mod loader;
pub use loader::{load_grammar, load_grammar_file};

mod graph;

pub mod inheritance;
pub use inheritance::{InheritanceResolver, PrecedenceTable, compose, detect_cycles};

pub mod compiled;
pub use compiled::{
    CompiledEmbedding, CompiledGrammar, CompiledSymbolDefinition, CompiledSymbolReference,
    Matcher, RuleId, RuleProgram, Step, StepId, TermId, Terminal,
};

pub mod registry;
pub use registry::GrammarSet;

#[cfg(test)]
#[path = "tests/loader_tests.rs"]
mod loader_tests;
#[cfg(test)]
#[path = "tests/inheritance_tests.rs"]
mod inheritance_tests;
#[cfg(test)]
#[path = "tests/compiled_tests.rs"]
mod compiled_tests;
#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod registry_tests;
