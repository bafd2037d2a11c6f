//! `GrammarSet`: the validated, compiled grammars a parse can use.

use crate::compiled::CompiledGrammar;
use crate::error::GrammarError;
use crate::inheritance::InheritanceResolver;
use crate::model::Grammar;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info_span};

/// Compiled grammars keyed by name, shared read-only between parses.
///
/// Grammars without rules are kept only as inheritance bases and cannot be
/// parsed with directly.
#[derive(Debug, Default, Clone)]
pub struct GrammarSet {
    resolved: IndexMap<String, Arc<Grammar>>,
    compiled: IndexMap<String, Arc<CompiledGrammar>>,
}

impl GrammarSet {
    /// Resolve inheritance, compile, and check embedded languages.
    ///
    /// Every structural problem (cycles, unknown parents, undefined rules,
    /// left recursion, missing embedded grammars) is reported here.
    pub fn build(grammars: impl IntoIterator<Item = Grammar>) -> Result<GrammarSet, GrammarError> {
        let _span = info_span!("grammar_set_build").entered();

        let resolver = InheritanceResolver::new(grammars)?;
        resolver.detect_cycles()?;

        let mut set = GrammarSet::default();
        for grammar in resolver.grammars() {
            let resolved = resolver.resolve(&grammar.name)?;
            if resolved.has_productions() {
                let compiled = CompiledGrammar::compile(&resolved)?;
                set.compiled
                    .insert(resolved.name.clone(), Arc::new(compiled));
            }
            set.resolved
                .insert(resolved.name.clone(), Arc::new(resolved));
        }

        for compiled in set.compiled.values() {
            for embedding in compiled.embeddings() {
                if !set.compiled.contains_key(&embedding.language) {
                    return Err(GrammarError::UnknownEmbeddedLanguage {
                        grammar: compiled.name().to_string(),
                        language: embedding.language.clone(),
                    });
                }
            }
        }

        debug!(
            grammars = set.resolved.len(),
            compiled = set.compiled.len(),
            "grammar set built"
        );
        Ok(set)
    }

    /// The compiled grammar named `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<CompiledGrammar>> {
        self.compiled.get(name)
    }

    /// Like `get`, but an unknown name is an error.
    pub fn require(&self, name: &str) -> Result<&Arc<CompiledGrammar>, GrammarError> {
        self.get(name).ok_or_else(|| GrammarError::UnknownGrammar {
            name: name.to_string(),
        })
    }

    /// The flattened grammar named `name`, including rule-less bases.
    pub fn resolved(&self, name: &str) -> Option<&Arc<Grammar>> {
        self.resolved.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.compiled.contains_key(name)
    }

    /// Names of the parseable grammars, in load order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.compiled.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
