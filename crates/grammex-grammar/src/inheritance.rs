//! Inheritance resolution and grammar composition.
//!
//! Both operations are pure: input grammars are never mutated, and the same
//! inputs (and precedence table) always produce the same output.

use crate::error::GrammarError;
use crate::graph::find_cycle;
use crate::model::Grammar;
use grammex_common::limits::DEFAULT_PRECEDENCE;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Check an "inherits from" graph for cycles.
///
/// Parents that are not keys of `graph` are treated as leaves; reporting
/// them is the resolver's job.
pub fn detect_cycles(graph: &IndexMap<String, Vec<String>>) -> Result<(), GrammarError> {
    match find_cycle(graph) {
        Some(cycle) => Err(GrammarError::CyclicInheritance { cycle }),
        None => Ok(()),
    }
}

// =============================================================================
// InheritanceResolver
// =============================================================================

/// Flattens `inherits` chains into self-contained grammars.
///
/// Parents are applied in declaration order and the earlier parent wins
/// between parents; the child's own entries override everything inherited.
#[derive(Debug, Default)]
pub struct InheritanceResolver {
    grammars: IndexMap<String, Grammar>,
}

impl InheritanceResolver {
    pub fn new(grammars: impl IntoIterator<Item = Grammar>) -> Result<Self, GrammarError> {
        let mut map = IndexMap::new();
        for grammar in grammars {
            if map.contains_key(&grammar.name) {
                return Err(GrammarError::DuplicateGrammar { name: grammar.name });
            }
            map.insert(grammar.name.clone(), grammar);
        }
        Ok(InheritanceResolver { grammars: map })
    }

    pub fn grammars(&self) -> impl Iterator<Item = &Grammar> {
        self.grammars.values()
    }

    pub fn get(&self, name: &str) -> Option<&Grammar> {
        self.grammars.get(name)
    }

    /// The "inherits from" relation as an adjacency list.
    pub fn graph(&self) -> IndexMap<String, Vec<String>> {
        self.grammars
            .values()
            .map(|g| (g.name.clone(), g.inherits.clone()))
            .collect()
    }

    /// Verify every parent exists and the relation is acyclic.
    pub fn detect_cycles(&self) -> Result<(), GrammarError> {
        for grammar in self.grammars.values() {
            if let Some(parent) = grammar
                .inherits
                .iter()
                .find(|p| !self.grammars.contains_key(p.as_str()))
            {
                return Err(GrammarError::UnknownParent {
                    grammar: grammar.name.clone(),
                    parent: parent.clone(),
                });
            }
        }
        detect_cycles(&self.graph())
    }

    /// Flatten `name` with everything it inherits.
    ///
    /// Call `detect_cycles` first; a cycle met here is reported the same way.
    pub fn resolve(&self, name: &str) -> Result<Grammar, GrammarError> {
        let mut chain = Vec::new();
        self.resolve_inner(name, &mut chain)
    }

    fn resolve_inner(&self, name: &str, chain: &mut Vec<String>) -> Result<Grammar, GrammarError> {
        if let Some(start) = chain.iter().position(|n| n == name) {
            let mut cycle = chain[start..].to_vec();
            cycle.push(name.to_string());
            return Err(GrammarError::CyclicInheritance { cycle });
        }
        let grammar = self
            .grammars
            .get(name)
            .ok_or_else(|| GrammarError::UnknownGrammar {
                name: name.to_string(),
            })?;
        if grammar.inherits.is_empty() {
            return Ok(grammar.clone());
        }

        chain.push(name.to_string());
        let mut merged = Grammar::new(name);
        for parent in &grammar.inherits {
            let resolved = self.resolve_inner(parent, chain)?;
            trace!(grammar = name, parent = %parent, "inheriting");
            inherit_from(&mut merged, resolved);
        }
        chain.pop();

        override_with(&mut merged, grammar);
        debug!(
            grammar = name,
            parents = grammar.inherits.len(),
            rules = merged.productions.len(),
            "inheritance resolved"
        );
        Ok(merged)
    }
}

/// Copy entries `target` does not have yet; earlier parents keep priority.
fn inherit_from(target: &mut Grammar, parent: Grammar) {
    fn fill<T>(target: &mut IndexMap<String, T>, source: IndexMap<String, T>) {
        for (key, value) in source {
            target.entry(key).or_insert(value);
        }
    }
    fill(&mut target.productions, parent.productions);
    fill(&mut target.tokens, parent.tokens);
    fill(&mut target.embeddings, parent.embeddings);
    fill(&mut target.symbol_definitions, parent.symbol_definitions);
    fill(&mut target.symbol_references, parent.symbol_references);
    for entry in parent.sync {
        target.add_sync(entry);
    }
    for pattern in parent.skip {
        target.add_skip(pattern);
    }
    if target.start.is_none() {
        target.start = parent.start;
    }
    if target.precedence.is_none() {
        target.precedence = parent.precedence;
    }
}

/// Apply the child's own declarations on top of the inherited ones.
fn override_with(target: &mut Grammar, child: &Grammar) {
    fn replace<T: Clone>(target: &mut IndexMap<String, T>, source: &IndexMap<String, T>) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    replace(&mut target.productions, &child.productions);
    replace(&mut target.tokens, &child.tokens);
    replace(&mut target.embeddings, &child.embeddings);
    replace(&mut target.symbol_definitions, &child.symbol_definitions);
    replace(&mut target.symbol_references, &child.symbol_references);
    for entry in &child.sync {
        target.add_sync(entry.clone());
    }
    for pattern in &child.skip {
        target.add_skip(pattern.clone());
    }
    if child.start.is_some() {
        target.start = child.start.clone();
    }
    if child.precedence.is_some() {
        target.precedence = child.precedence;
    }
    target.inherits = child.inherits.clone();
}

// =============================================================================
// Composition
// =============================================================================

/// Per-grammar precedence overrides for `compose`. Lower values win.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrecedenceTable {
    entries: IndexMap<String, u32>,
}

impl PrecedenceTable {
    pub fn new() -> Self {
        PrecedenceTable::default()
    }

    pub fn set(&mut self, grammar: impl Into<String>, precedence: u32) -> &mut Self {
        self.entries.insert(grammar.into(), precedence);
        self
    }

    pub fn with(mut self, grammar: impl Into<String>, precedence: u32) -> Self {
        self.set(grammar, precedence);
        self
    }

    pub fn get(&self, grammar: &str) -> Option<u32> {
        self.entries.get(grammar).copied()
    }

    /// Table entry, else the grammar's own declaration, else the default.
    pub fn precedence_of(&self, grammar: &Grammar) -> u32 {
        self.get(&grammar.name)
            .or(grammar.precedence)
            .unwrap_or(DEFAULT_PRECEDENCE)
    }
}

struct Source<'a> {
    grammar: &'a Grammar,
    precedence: u32,
}

/// Merge one keyed table across every source.
///
/// For a key defined more than once, the numerically lowest precedence wins.
/// Two different values at that lowest precedence are a conflict; identical
/// values merge silently. Sources above the lowest precedence never conflict,
/// so the result does not depend on the order of `sources`.
fn merge_keyed<T: Clone + PartialEq>(
    what: &'static str,
    sources: &[Source<'_>],
    table: impl Fn(&Grammar) -> &IndexMap<String, T>,
) -> Result<IndexMap<String, T>, GrammarError> {
    let mut lowest: IndexMap<&str, u32> = IndexMap::new();
    for source in sources {
        for key in table(source.grammar).keys() {
            lowest
                .entry(key.as_str())
                .and_modify(|p| *p = (*p).min(source.precedence))
                .or_insert(source.precedence);
        }
    }

    let mut winners: IndexMap<&str, (&str, &T)> = IndexMap::with_capacity(lowest.len());
    for source in sources {
        for (key, value) in table(source.grammar) {
            let Some(&precedence) = lowest.get(key.as_str()) else {
                continue;
            };
            if source.precedence != precedence {
                trace!(what, name = %key, from = %source.grammar.name, "composition override");
                continue;
            }
            match winners.get(key.as_str()) {
                None => {
                    winners.insert(key.as_str(), (source.grammar.name.as_str(), value));
                }
                Some((first, winner)) if *winner != value => {
                    return Err(GrammarError::Composition {
                        what,
                        name: key.clone(),
                        first: first.to_string(),
                        second: source.grammar.name.clone(),
                        precedence,
                    });
                }
                Some(_) => {}
            }
        }
    }

    // Keys keep the order of their first definition in any source.
    Ok(lowest
        .keys()
        .filter_map(|key| {
            winners
                .get(key)
                .map(|(_, value)| (key.to_string(), (*value).clone()))
        })
        .collect())
}

/// Merge `primary` and `embedded` into one grammar named after `primary`.
///
/// Productions, tokens, embeddings and symbol declarations are merged by
/// name using `precedence`. Sync and skip sets are unioned. The start rule,
/// inheritance list and declared precedence come from `primary`.
pub fn compose(
    primary: &Grammar,
    embedded: &[Grammar],
    precedence: &PrecedenceTable,
) -> Result<Grammar, GrammarError> {
    let sources: Vec<Source<'_>> = std::iter::once(primary)
        .chain(embedded.iter())
        .map(|grammar| Source {
            grammar,
            precedence: precedence.precedence_of(grammar),
        })
        .collect();

    let mut composed = Grammar::new(primary.name.clone());
    composed.productions = merge_keyed("rule", &sources, |g| &g.productions)?;
    composed.tokens = merge_keyed("token", &sources, |g| &g.tokens)?;
    composed.embeddings = merge_keyed("embedding", &sources, |g| &g.embeddings)?;
    composed.symbol_definitions =
        merge_keyed("symbol definition", &sources, |g| &g.symbol_definitions)?;
    composed.symbol_references =
        merge_keyed("symbol reference", &sources, |g| &g.symbol_references)?;

    for source in &sources {
        for entry in &source.grammar.sync {
            composed.add_sync(entry.clone());
        }
        for pattern in &source.grammar.skip {
            composed.add_skip(pattern.clone());
        }
    }
    composed.start = primary.start.clone();
    composed.inherits = primary.inherits.clone();
    composed.precedence = primary.precedence;

    debug!(
        grammar = %composed.name,
        inputs = sources.len(),
        rules = composed.productions.len(),
        "grammars composed"
    );
    Ok(composed)
}
