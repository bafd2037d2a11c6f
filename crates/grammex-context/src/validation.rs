//! Cross-language reference validation.
//!
//! When a context pops, each reference it recorded becomes a
//! `CrossReference` and is checked by every registered validator against
//! the scope chain (the popped context, then its ancestors). A validator
//! that objects produces a `CrossLanguageValidation` warning; nothing here
//! ever stops a parse.

use crate::engine::ParsingContext;
use crate::symbols::SymbolEntry;
use grammex_common::Span;
use serde::Serialize;

/// A reference from one language's region to a symbol, as seen at
/// validation time. Never modified after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CrossReference {
    pub source_language: String,
    /// Language of the context the symbol resolved in, or of the parent
    /// context when it did not resolve
    pub target_language: String,
    pub symbol_name: String,
    /// Expected symbol type
    pub reference_kind: String,
    pub location: Span,
    pub resolved: bool,
}

/// Read-only view of a context and its ancestors, innermost first.
#[derive(Clone, Copy)]
pub struct ScopeChain<'a> {
    contexts: &'a [ParsingContext],
    start: usize,
}

impl<'a> ScopeChain<'a> {
    pub(crate) fn new(contexts: &'a [ParsingContext], start: usize) -> Self {
        ScopeChain { contexts, start }
    }

    /// Contexts from the innermost outward.
    pub fn contexts(self) -> impl Iterator<Item = &'a ParsingContext> + 'a {
        let contexts = self.contexts;
        let mut next = contexts.get(self.start).map(|_| self.start);
        std::iter::from_fn(move || {
            let idx = next?;
            let ctx = &contexts[idx];
            next = ctx.parent;
            Some(ctx)
        })
    }

    /// First entry named `name`, innermost context first.
    pub fn resolve(&self, name: &str) -> Option<&'a SymbolEntry> {
        self.contexts().find_map(|ctx| ctx.symbols.get(name))
    }

    /// First entry named `name` whose type is `symbol_type`.
    pub fn resolve_typed(&self, name: &str, symbol_type: &str) -> Option<&'a SymbolEntry> {
        self.contexts()
            .filter_map(|ctx| ctx.symbols.get(name))
            .find(|entry| entry.symbol_type == symbol_type)
    }
}

pub trait CrossLanguageValidator {
    /// Return a warning message when `reference` is not acceptable.
    fn validate(&self, reference: &CrossReference, scopes: ScopeChain<'_>) -> Option<String>;
}

impl<F> CrossLanguageValidator for F
where
    F: Fn(&CrossReference, ScopeChain<'_>) -> Option<String>,
{
    fn validate(&self, reference: &CrossReference, scopes: ScopeChain<'_>) -> Option<String> {
        self(reference, scopes)
    }
}

/// Requires every reference to resolve to a symbol of the expected type.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymbolExistsValidator;

impl CrossLanguageValidator for SymbolExistsValidator {
    fn validate(&self, reference: &CrossReference, scopes: ScopeChain<'_>) -> Option<String> {
        if reference.resolved {
            return None;
        }
        Some(match scopes.resolve(&reference.symbol_name) {
            Some(found) => format!(
                "'{}' is a {} defined in {}, expected {}",
                reference.symbol_name, found.symbol_type, found.language, reference.reference_kind
            ),
            None => format!(
                "{} '{}' referenced from {} is not defined",
                reference.reference_kind, reference.symbol_name, reference.source_language
            ),
        })
    }
}
