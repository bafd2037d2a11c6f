//! Step lexer for grammex.
//!
//! This crate turns source text into the token stream the step machine
//! consumes:
//! - `Token` - terminal id plus byte range, with any equally long alternatives
//! - `StepLexer` - longest-match tokenizer driven by a `CompiledGrammar`
//! - `tokenize` - convenience wrapper producing a `Vec<Token>` ending in `EOF`

pub mod token;
pub use token::Token;

pub mod lexer;
pub use lexer::{StepLexer, tokenize};

#[cfg(test)]
#[path = "tests/lexer_tests.rs"]
mod lexer_tests;
