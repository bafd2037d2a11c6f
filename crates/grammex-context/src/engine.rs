//! The context stack.
//!
//! Context 0 is the host document and is never popped. Every embedded region
//! pushes a context with an empty symbol table whose parent is the context
//! that was active before. Lookups read through parents; definitions only
//! ever land in the current context. Popping validates the context's
//! references and merges its exports into the parent, where existing entries
//! always win.

use crate::symbols::{SymbolEntry, SymbolTable};
use crate::validation::{CrossLanguageValidator, CrossReference, ScopeChain};
use grammex_common::limits::{CONTEXT_ERROR_THRESHOLD, MAX_CONTEXT_DEPTH};
use grammex_common::{Diagnostic, DiagnosticKind, Span};
use grammex_grammar::SymbolScope;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("context depth {max_depth} exceeded while entering {grammar}")]
    Overflow { grammar: String, max_depth: usize },
    #[error("the root context cannot be popped")]
    PopRoot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Embedded contexts allowed below the root
    pub max_depth: usize,
    /// Syntax errors tolerated per embedded context
    pub error_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_depth: MAX_CONTEXT_DEPTH,
            error_threshold: CONTEXT_ERROR_THRESHOLD,
        }
    }
}

/// A reference recorded while parsing, validated when its context pops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReference {
    pub name: String,
    pub target_type: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ParsingContext {
    pub grammar: String,
    pub symbols: SymbolTable,
    /// Byte offset where the context's region starts
    pub position: u32,
    pub parent: Option<usize>,
    pub error_count: usize,
    pub pending: Vec<PendingReference>,
}

impl ParsingContext {
    fn new(grammar: &str, position: u32, parent: Option<usize>) -> Self {
        ParsingContext {
            grammar: grammar.to_string(),
            symbols: SymbolTable::new(),
            position,
            parent,
            error_count: 0,
            pending: Vec::new(),
        }
    }
}

/// What a successful pop did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopSummary {
    pub grammar: String,
    /// Exports added to the parent
    pub merged: usize,
    /// Exports dropped because the parent already had the name
    pub shadowed: usize,
    pub warnings: usize,
}

/// Final state returned by `finish`.
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub symbols: SymbolTable,
    pub cross_references: Vec<CrossReference>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct ContextEngine {
    contexts: Vec<ParsingContext>,
    config: EngineConfig,
    cross_references: Vec<CrossReference>,
    diagnostics: Vec<Diagnostic>,
    unwinding: bool,
}

impl ContextEngine {
    pub fn new(root_grammar: &str, config: EngineConfig) -> Self {
        ContextEngine {
            contexts: vec![ParsingContext::new(root_grammar, 0, None)],
            config,
            cross_references: Vec::new(),
            diagnostics: Vec::new(),
            unwinding: false,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Number of embedded contexts above the root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.contexts.len() - 1
    }

    fn current_index(&self) -> usize {
        self.contexts.len() - 1
    }

    pub fn current(&self) -> &ParsingContext {
        &self.contexts[self.current_index()]
    }

    fn current_mut(&mut self) -> &mut ParsingContext {
        let idx = self.current_index();
        &mut self.contexts[idx]
    }

    pub fn current_grammar(&self) -> &str {
        &self.current().grammar
    }

    /// Scope chain starting at the current context.
    pub fn scopes(&self) -> ScopeChain<'_> {
        ScopeChain::new(&self.contexts, self.current_index())
    }

    // -------------------------------------------------------------------------
    // Stack transitions
    // -------------------------------------------------------------------------

    /// Enter an embedded region parsed with `grammar`.
    pub fn push_context(&mut self, grammar: &str, position: u32) -> Result<usize, ContextError> {
        if self.depth() >= self.config.max_depth {
            warn!(
                grammar,
                depth = self.depth(),
                max_depth = self.config.max_depth,
                "context overflow"
            );
            return Err(ContextError::Overflow {
                grammar: grammar.to_string(),
                max_depth: self.config.max_depth,
            });
        }
        let parent = self.current_index();
        self.contexts
            .push(ParsingContext::new(grammar, position, Some(parent)));
        debug!(grammar, position, depth = self.depth(), "context pushed");
        Ok(self.depth())
    }

    /// Leave the current region: validate its references, then merge its
    /// exports into the parent.
    pub fn pop_context(
        &mut self,
        validators: &[&dyn CrossLanguageValidator],
    ) -> Result<PopSummary, ContextError> {
        if self.depth() == 0 {
            return Err(ContextError::PopRoot);
        }

        let warnings = self.validate_current(validators);
        let Some(popped) = self.contexts.pop() else {
            return Err(ContextError::PopRoot);
        };
        let exported = popped.symbols.iter().filter(|e| e.is_exported()).count();
        let merged = self.current_mut().symbols.merge_exports(popped.symbols);

        let summary = PopSummary {
            grammar: popped.grammar,
            merged,
            shadowed: exported - merged,
            warnings,
        };
        debug!(
            grammar = %summary.grammar,
            merged = summary.merged,
            shadowed = summary.shadowed,
            warnings = summary.warnings,
            depth = self.depth(),
            "context popped"
        );
        Ok(summary)
    }

    /// Drop the current context without validating or merging it.
    pub fn force_pop(&mut self) -> Result<(), ContextError> {
        if self.depth() == 0 {
            return Err(ContextError::PopRoot);
        }
        if let Some(dropped) = self.contexts.pop() {
            debug!(
                grammar = %dropped.grammar,
                symbols = dropped.symbols.len(),
                errors = dropped.error_count,
                "context force-popped"
            );
        }
        Ok(())
    }

    /// Mark the stack as unwinding after an overflow. While set, enclosing
    /// embedded contexts stop entering regions and pop as soon as they can.
    pub fn begin_unwind(&mut self) {
        self.unwinding = true;
    }

    pub fn is_unwinding(&self) -> bool {
        self.unwinding
    }

    /// Called once the stack is back at the root.
    pub fn end_unwind(&mut self) {
        self.unwinding = false;
    }

    // -------------------------------------------------------------------------
    // Symbols
    // -------------------------------------------------------------------------

    /// Define `name` in the current context only. Returns `false` when the
    /// current context already has it.
    pub fn define_symbol(
        &mut self,
        name: &str,
        symbol_type: &str,
        scope: SymbolScope,
        span: Span,
    ) -> bool {
        let language = self.current_grammar().to_string();
        let added = self.current_mut().symbols.insert(SymbolEntry {
            name: name.to_string(),
            symbol_type: symbol_type.to_string(),
            scope,
            language,
            span,
        });
        trace!(name, symbol_type, added, "define symbol");
        added
    }

    /// Look `name` up from the current context outward.
    pub fn resolve_symbol(&self, name: &str) -> Option<&SymbolEntry> {
        self.scopes().resolve(name)
    }

    /// Record a reference to be validated when the current context pops.
    pub fn record_reference(&mut self, name: &str, target_type: &str, span: Span) {
        self.current_mut().pending.push(PendingReference {
            name: name.to_string(),
            target_type: target_type.to_string(),
            span,
        });
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    /// Count a syntax error against the current context.
    pub fn record_error(&mut self) -> usize {
        let ctx = self.current_mut();
        ctx.error_count += 1;
        ctx.error_count
    }

    /// Whether the current embedded context should be abandoned. The root
    /// context is never abandoned.
    pub fn error_threshold_exceeded(&self) -> bool {
        self.depth() > 0 && self.current().error_count > self.config.error_threshold
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn validate_current(&mut self, validators: &[&dyn CrossLanguageValidator]) -> usize {
        let idx = self.current_index();
        let pending = std::mem::take(&mut self.contexts[idx].pending);
        if pending.is_empty() {
            return 0;
        }

        let chain = ScopeChain::new(&self.contexts, idx);
        let source_language = self.contexts[idx].grammar.clone();
        let fallback_language = self.contexts[idx]
            .parent
            .map_or(source_language.as_str(), |p| self.contexts[p].grammar.as_str())
            .to_string();

        let mut warnings = 0;
        for reference in pending {
            let found = chain.resolve_typed(&reference.name, &reference.target_type);
            let cross = CrossReference {
                source_language: source_language.clone(),
                target_language: found
                    .map_or_else(|| fallback_language.clone(), |e| e.language.clone()),
                symbol_name: reference.name,
                reference_kind: reference.target_type,
                location: reference.span,
                resolved: found.is_some(),
            };
            for validator in validators {
                if let Some(message) = validator.validate(&cross, chain) {
                    trace!(symbol = %cross.symbol_name, %message, "validation warning");
                    self.diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::CrossLanguageValidation,
                        source_language.clone(),
                        cross.location,
                        message,
                    ));
                    warnings += 1;
                }
            }
            self.cross_references.push(cross);
        }
        warnings
    }

    /// Validation warnings produced since the last call.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn cross_references(&self) -> &[CrossReference] {
        &self.cross_references
    }

    /// Close the engine: drop any context left open, validate the root
    /// context's own references and hand back the final table.
    pub fn finish(mut self, validators: &[&dyn CrossLanguageValidator]) -> EngineOutput {
        if self.depth() > 0 {
            let open: Vec<&str> = self.contexts[1..]
                .iter()
                .map(|context| context.grammar.as_str())
                .collect();
            warn!(depth = self.depth(), ?open, "contexts still open at finish");
            while self.depth() > 0 {
                let _ = self.force_pop();
            }
        }
        self.validate_current(validators);
        let root = self.contexts.swap_remove(0);
        debug!(
            symbols = root.symbols.len(),
            cross_references = self.cross_references.len(),
            "context engine finished"
        );
        EngineOutput {
            symbols: root.symbols,
            cross_references: self.cross_references,
            diagnostics: self.diagnostics,
        }
    }
}
