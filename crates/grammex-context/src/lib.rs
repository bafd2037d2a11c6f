//! Context-sensitive engine for grammex.
//!
//! While a document is parsed, every embedded-language region runs in its
//! own `ParsingContext` on a bounded stack:
//! - `SymbolTable` / `SymbolEntry` - per-context definitions
//! - `ContextEngine` - push, pop (validate + merge), force-pop, lookups
//! - `CrossReference` / `CrossLanguageValidator` - reference checking on pop

pub mod symbols;
pub use symbols::{SymbolEntry, SymbolTable};

pub mod validation;
pub use validation::{CrossLanguageValidator, CrossReference, ScopeChain, SymbolExistsValidator};

pub mod engine;
pub use engine::{
    ContextEngine, ContextError, EngineConfig, EngineOutput, ParsingContext, PendingReference,
    PopSummary,
};

#[cfg(test)]
#[path = "tests/symbols_tests.rs"]
mod symbols_tests;
#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod engine_tests;
