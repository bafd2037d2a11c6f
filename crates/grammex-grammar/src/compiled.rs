//! Grammar compilation.
//!
//! Every rule is lowered into a small step program:
//!
//! ```text
//! Match(term, next)   consume one token of `term`, continue at `next`
//! Call(rule, next)    run `rule`, then continue at `next`
//! Split([a, b, ..])   fork; earlier targets have priority
//! Jump(next)
//! Accept              return from the current rule
//! ```
//!
//! All steps of all rules live in one vector and are addressed by `StepId`.
//! Terminals are numbered with `TermId`; `EOF` and `UNKNOWN` are fixed and
//! every embedded language gets one region terminal.

use crate::error::GrammarError;
use crate::graph::find_cycle;
use crate::model::{Expr, Grammar, RuleKind, SymbolScope, SyncTerminal, TerminalKind, TokenPattern};
use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub u32);

impl TermId {
    pub const EOF: TermId = TermId(0);
    /// A character no terminal matched.
    pub const UNKNOWN: TermId = TermId(1);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

impl RuleId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u32);

impl StepId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Match { term: TermId, next: StepId },
    Call { rule: RuleId, next: StepId },
    Split(SmallVec<[StepId; 2]>),
    Jump(StepId),
    Accept,
}

/// How the lexer recognises a terminal.
#[derive(Clone, Debug)]
pub enum Matcher {
    Eof,
    Unknown,
    Literal(String),
    /// Anchored at the slice start.
    Pattern(Regex),
    /// Produced only after a trigger; the index is into `embeddings`.
    Region(usize),
}

#[derive(Clone, Debug)]
pub struct Terminal {
    /// Token name, or the quoted literal text
    pub name: String,
    pub kind: TerminalKind,
    pub matcher: Matcher,
}

#[derive(Clone, Debug)]
pub struct RuleProgram {
    pub name: String,
    pub kind: RuleKind,
    pub entry: StepId,
}

#[derive(Clone, Debug)]
pub struct CompiledEmbedding {
    pub language: String,
    pub trigger: String,
    pub terminator: String,
    pub trigger_term: TermId,
    pub terminator_term: TermId,
    pub region_term: TermId,
}

#[derive(Clone, Debug)]
pub struct CompiledSymbolDefinition {
    pub symbol_type: String,
    pub scope: SymbolScope,
    pub key: Option<TermId>,
}

#[derive(Clone, Debug)]
pub struct CompiledSymbolReference {
    pub target_type: String,
    pub key: Option<TermId>,
}

/// A grammar ready to drive the lexer and the step machine.
#[derive(Debug)]
pub struct CompiledGrammar {
    name: String,
    terminals: Vec<Terminal>,
    steps: Vec<Step>,
    rules: Vec<RuleProgram>,
    rule_index: FxHashMap<String, RuleId>,
    start: RuleId,
    sync: FxHashSet<TermId>,
    skip: Option<Regex>,
    embeddings: Vec<CompiledEmbedding>,
    triggers: FxHashMap<TermId, usize>,
    symbol_definitions: FxHashMap<RuleId, CompiledSymbolDefinition>,
    symbol_references: FxHashMap<RuleId, CompiledSymbolReference>,
    source: Grammar,
}

impl CompiledGrammar {
    /// Lower a resolved grammar. Structural problems are reported here so
    /// that a parse never meets them.
    pub fn compile(grammar: &Grammar) -> Result<CompiledGrammar, GrammarError> {
        if !grammar.has_productions() {
            return Err(GrammarError::NoRules {
                grammar: grammar.name.clone(),
            });
        }
        for name in grammar.productions.keys() {
            if grammar.tokens.contains_key(name) {
                return Err(GrammarError::AmbiguousName {
                    grammar: grammar.name.clone(),
                    name: name.clone(),
                });
            }
        }

        let mut terminals = TerminalTable::new();
        terminals.add_tokens(grammar)?;

        let rule_index: FxHashMap<String, RuleId> = grammar
            .productions
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), RuleId(i as u32)))
            .collect();

        // Embeddings: trigger and terminator literals plus one region
        // terminal per language.
        let mut embeddings = Vec::with_capacity(grammar.embeddings.len());
        let mut region_terms: IndexMap<String, TermId> = IndexMap::new();
        for embedding in grammar.embeddings.values() {
            let trigger_term = terminals.literal(&embedding.trigger);
            let terminator_term = terminals.literal(&embedding.terminator);
            let region_term = match region_terms.get(&embedding.language) {
                Some(&term) => term,
                None => {
                    let term = terminals.push(Terminal {
                        name: format!("@{}", embedding.language),
                        kind: TerminalKind::Terminal,
                        matcher: Matcher::Region(embeddings.len()),
                    });
                    region_terms.insert(embedding.language.clone(), term);
                    term
                }
            };
            embeddings.push(CompiledEmbedding {
                language: embedding.language.clone(),
                trigger: embedding.trigger.clone(),
                terminator: embedding.terminator.clone(),
                trigger_term,
                terminator_term,
                region_term,
            });
        }
        let triggers = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (e.trigger_term, i))
            .collect();

        let mut lowering = Lowering {
            grammar,
            terminals: &mut terminals,
            rule_index: &rule_index,
            region_terms: &region_terms,
            steps: Vec::new(),
            current_rule: "",
        };
        let mut rules = Vec::with_capacity(grammar.productions.len());
        for production in grammar.productions.values() {
            lowering.current_rule = &production.name;
            let accept = lowering.push(Step::Accept);
            let entry = lowering.lower(&production.definition, accept)?;
            rules.push(RuleProgram {
                name: production.name.clone(),
                kind: production.kind,
                entry,
            });
        }
        let steps = lowering.steps;

        check_left_recursion(grammar)?;

        let start_name = grammar.start_rule().unwrap_or_default();
        let start = *rule_index
            .get(start_name)
            .ok_or_else(|| GrammarError::MissingStartRule {
                grammar: grammar.name.clone(),
                rule: start_name.to_string(),
            })?;

        let mut sync = FxHashSet::default();
        for entry in &grammar.sync {
            let term = match entry {
                SyncTerminal::Literal(text) => terminals.literal(text),
                SyncTerminal::Token(name) => terminals.named(grammar, name, "sync set")?,
            };
            sync.insert(term);
        }

        let symbol_definitions = compile_symbol_decls(
            grammar,
            &rule_index,
            &mut terminals,
            grammar.symbol_definitions.iter().map(|(rule, def)| {
                (rule, def.key.as_deref(), |key| CompiledSymbolDefinition {
                    symbol_type: def.symbol_type.clone(),
                    scope: def.scope,
                    key,
                })
            }),
        )?;
        let symbol_references = compile_symbol_decls(
            grammar,
            &rule_index,
            &mut terminals,
            grammar.symbol_references.iter().map(|(rule, reference)| {
                (rule, reference.key.as_deref(), |key| CompiledSymbolReference {
                    target_type: reference.target_type.clone(),
                    key,
                })
            }),
        )?;

        let skip = if grammar.skip.is_empty() {
            None
        } else {
            let joined = grammar
                .skip
                .iter()
                .map(|p| format!("(?:{p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(anchored(&joined).map_err(|message| GrammarError::InvalidPattern {
                grammar: grammar.name.clone(),
                token: "skip".to_string(),
                message,
            })?)
        };

        debug!(
            grammar = %grammar.name,
            rules = rules.len(),
            steps = steps.len(),
            terminals = terminals.terminals.len(),
            "grammar compiled"
        );

        Ok(CompiledGrammar {
            name: grammar.name.clone(),
            terminals: terminals.terminals,
            steps,
            rules,
            rule_index,
            start,
            sync,
            skip,
            embeddings,
            triggers,
            symbol_definitions,
            symbol_references,
            source: grammar.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    pub fn terminal(&self, term: TermId) -> Option<&Terminal> {
        self.terminals.get(term.index())
    }

    /// Display name of a terminal, for messages.
    pub fn terminal_name(&self, term: TermId) -> &str {
        self.terminal(term).map_or("?", |t| t.name.as_str())
    }

    #[inline]
    pub fn step(&self, id: StepId) -> &Step {
        &self.steps[id.index()]
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn rules(&self) -> &[RuleProgram] {
        &self.rules
    }

    #[inline]
    pub fn rule(&self, id: RuleId) -> &RuleProgram {
        &self.rules[id.index()]
    }

    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rule_index.get(name).copied()
    }

    pub fn start_rule(&self) -> RuleId {
        self.start
    }

    pub fn is_sync(&self, term: TermId) -> bool {
        self.sync.contains(&term)
    }

    pub fn skip_pattern(&self) -> Option<&Regex> {
        self.skip.as_ref()
    }

    pub fn embeddings(&self) -> &[CompiledEmbedding] {
        &self.embeddings
    }

    /// The embedding opened by a trigger terminal.
    pub fn embedding_for_trigger(&self, term: TermId) -> Option<&CompiledEmbedding> {
        self.triggers.get(&term).map(|&i| &self.embeddings[i])
    }

    /// The embedding whose region terminal is `term`.
    pub fn embedding_for_region(&self, term: TermId) -> Option<&CompiledEmbedding> {
        match self.terminal(term)?.matcher {
            Matcher::Region(i) => self.embeddings.get(i),
            _ => None,
        }
    }

    pub fn symbol_definition(&self, rule: RuleId) -> Option<&CompiledSymbolDefinition> {
        self.symbol_definitions.get(&rule)
    }

    pub fn symbol_reference(&self, rule: RuleId) -> Option<&CompiledSymbolReference> {
        self.symbol_references.get(&rule)
    }

    /// The resolved grammar this was compiled from.
    pub fn source(&self) -> &Grammar {
        &self.source
    }
}

fn anchored(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|e| e.to_string())
}

// =============================================================================
// Terminal table
// =============================================================================

struct TerminalTable {
    terminals: Vec<Terminal>,
    literals: FxHashMap<String, TermId>,
    names: FxHashMap<String, TermId>,
}

impl TerminalTable {
    fn new() -> Self {
        TerminalTable {
            terminals: vec![
                Terminal {
                    name: "EOF".to_string(),
                    kind: TerminalKind::Terminal,
                    matcher: Matcher::Eof,
                },
                Terminal {
                    name: "UNKNOWN".to_string(),
                    kind: TerminalKind::Terminal,
                    matcher: Matcher::Unknown,
                },
            ],
            literals: FxHashMap::default(),
            names: FxHashMap::default(),
        }
    }

    fn push(&mut self, terminal: Terminal) -> TermId {
        let id = TermId(self.terminals.len() as u32);
        self.terminals.push(terminal);
        id
    }

    fn add_tokens(&mut self, grammar: &Grammar) -> Result<(), GrammarError> {
        for token in grammar.tokens.values() {
            let id = match &token.pattern {
                TokenPattern::Literal(text) => {
                    let id = self.push(Terminal {
                        name: token.name.clone(),
                        kind: token.kind,
                        matcher: Matcher::Literal(text.clone()),
                    });
                    self.literals.entry(text.clone()).or_insert(id);
                    id
                }
                TokenPattern::Regex(pattern) => {
                    let regex = anchored(pattern).map_err(|message| {
                        GrammarError::InvalidPattern {
                            grammar: grammar.name.clone(),
                            token: token.name.clone(),
                            message,
                        }
                    })?;
                    self.push(Terminal {
                        name: token.name.clone(),
                        kind: token.kind,
                        matcher: Matcher::Pattern(regex),
                    })
                }
            };
            self.names.insert(token.name.clone(), id);
        }
        Ok(())
    }

    /// Terminal for quoted literal text, created on first use.
    fn literal(&mut self, text: &str) -> TermId {
        if let Some(&id) = self.literals.get(text) {
            return id;
        }
        let id = self.push(Terminal {
            name: format!("{text:?}"),
            kind: TerminalKind::Terminal,
            matcher: Matcher::Literal(text.to_string()),
        });
        self.literals.insert(text.to_string(), id);
        id
    }

    fn named(&self, grammar: &Grammar, name: &str, context: &str) -> Result<TermId, GrammarError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| GrammarError::UndefinedToken {
                grammar: grammar.name.clone(),
                context: context.to_string(),
                name: name.to_string(),
            })
    }
}

// =============================================================================
// Lowering
// =============================================================================

struct Lowering<'a> {
    grammar: &'a Grammar,
    terminals: &'a mut TerminalTable,
    rule_index: &'a FxHashMap<String, RuleId>,
    region_terms: &'a IndexMap<String, TermId>,
    steps: Vec<Step>,
    current_rule: &'a str,
}

impl Lowering<'_> {
    fn push(&mut self, step: Step) -> StepId {
        let id = StepId(self.steps.len() as u32);
        self.steps.push(step);
        id
    }

    /// Lower `expr` so that it continues at `next`; returns its entry step.
    fn lower(&mut self, expr: &Expr, next: StepId) -> Result<StepId, GrammarError> {
        Ok(match expr {
            Expr::Seq(items) => {
                let mut entry = next;
                for item in items.iter().rev() {
                    entry = self.lower(item, entry)?;
                }
                entry
            }
            Expr::Alt(items) => {
                let mut targets = SmallVec::with_capacity(items.len());
                for item in items {
                    targets.push(self.lower(item, next)?);
                }
                self.push(Step::Split(targets))
            }
            Expr::Opt(inner) => {
                let body = self.lower(inner, next)?;
                self.push(Step::Split(smallvec::smallvec![body, next]))
            }
            Expr::Star(inner) => {
                let split = self.push(Step::Jump(next));
                let body = self.lower(inner, split)?;
                self.steps[split.index()] = Step::Split(smallvec::smallvec![body, next]);
                split
            }
            Expr::Plus(inner) => {
                let split = self.push(Step::Jump(next));
                let body = self.lower(inner, split)?;
                self.steps[split.index()] = Step::Split(smallvec::smallvec![body, next]);
                body
            }
            Expr::Literal(text) => {
                let term = self.terminals.literal(text);
                self.push(Step::Match { term, next })
            }
            Expr::Eof => self.push(Step::Match {
                term: TermId::EOF,
                next,
            }),
            Expr::Embed(language) => {
                let term = *self.region_terms.get(language).ok_or_else(|| {
                    GrammarError::UndefinedEmbedding {
                        grammar: self.grammar.name.clone(),
                        rule: self.current_rule.to_string(),
                        language: language.clone(),
                    }
                })?;
                self.push(Step::Match { term, next })
            }
            Expr::Ref(name) => {
                if let Some(&term) = self.terminals.names.get(name) {
                    self.push(Step::Match { term, next })
                } else if let Some(&rule) = self.rule_index.get(name) {
                    self.push(Step::Call { rule, next })
                } else {
                    return Err(GrammarError::UndefinedRule {
                        grammar: self.grammar.name.clone(),
                        rule: self.current_rule.to_string(),
                        name: name.clone(),
                    });
                }
            }
        })
    }
}

// =============================================================================
// Left recursion
// =============================================================================

/// Rules that can derive the empty string, by fixpoint.
fn nullable_rules(grammar: &Grammar) -> FxHashSet<&str> {
    let mut nullable = FxHashSet::default();
    loop {
        let mut changed = false;
        for production in grammar.productions.values() {
            if !nullable.contains(production.name.as_str())
                && is_nullable(grammar, &production.definition, &nullable)
            {
                nullable.insert(production.name.as_str());
                changed = true;
            }
        }
        if !changed {
            return nullable;
        }
    }
}

fn is_nullable(grammar: &Grammar, expr: &Expr, nullable: &FxHashSet<&str>) -> bool {
    match expr {
        Expr::Seq(items) => items.iter().all(|e| is_nullable(grammar, e, nullable)),
        Expr::Alt(items) => items.iter().any(|e| is_nullable(grammar, e, nullable)),
        Expr::Star(_) | Expr::Opt(_) => true,
        Expr::Plus(inner) => is_nullable(grammar, inner, nullable),
        Expr::Literal(_) | Expr::Embed(_) | Expr::Eof => false,
        Expr::Ref(name) => {
            !grammar.tokens.contains_key(name.as_str()) && nullable.contains(name.as_str())
        }
    }
}

/// Rules callable before any token is consumed.
fn first_calls(
    grammar: &Grammar,
    expr: &Expr,
    nullable: &FxHashSet<&str>,
    out: &mut Vec<String>,
) {
    match expr {
        Expr::Seq(items) => {
            for item in items {
                first_calls(grammar, item, nullable, out);
                if !is_nullable(grammar, item, nullable) {
                    break;
                }
            }
        }
        Expr::Alt(items) => {
            for item in items {
                first_calls(grammar, item, nullable, out);
            }
        }
        Expr::Star(inner) | Expr::Plus(inner) | Expr::Opt(inner) => {
            first_calls(grammar, inner, nullable, out)
        }
        Expr::Ref(name) if grammar.productions.contains_key(name.as_str()) => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        _ => {}
    }
}

fn check_left_recursion(grammar: &Grammar) -> Result<(), GrammarError> {
    let nullable = nullable_rules(grammar);
    let graph: IndexMap<String, Vec<String>> = grammar
        .productions
        .values()
        .map(|production| {
            let mut calls = Vec::new();
            first_calls(grammar, &production.definition, &nullable, &mut calls);
            (production.name.clone(), calls)
        })
        .collect();
    match find_cycle(&graph) {
        Some(cycle) => Err(GrammarError::LeftRecursion {
            grammar: grammar.name.clone(),
            cycle,
        }),
        None => Ok(()),
    }
}

// =============================================================================
// Symbol declarations
// =============================================================================

fn compile_symbol_decls<'a, T, F>(
    grammar: &Grammar,
    rule_index: &FxHashMap<String, RuleId>,
    terminals: &mut TerminalTable,
    decls: impl Iterator<Item = (&'a String, Option<&'a str>, F)>,
) -> Result<FxHashMap<RuleId, T>, GrammarError>
where
    F: FnOnce(Option<TermId>) -> T,
{
    let mut out = FxHashMap::default();
    for (rule, key, build) in decls {
        let id = *rule_index
            .get(rule)
            .ok_or_else(|| GrammarError::UndefinedRule {
                grammar: grammar.name.clone(),
                rule: rule.clone(),
                name: rule.clone(),
            })?;
        if grammar
            .productions
            .get(rule)
            .is_some_and(|p| p.kind == RuleKind::Inline)
        {
            return Err(GrammarError::InlineSymbolRule {
                grammar: grammar.name.clone(),
                rule: rule.clone(),
            });
        }
        let key = match key {
            Some(name) => Some(terminals.named(grammar, name, &format!("symbol key of '{rule}'"))?),
            None => None,
        };
        out.insert(id, build(key));
    }
    Ok(out)
}
