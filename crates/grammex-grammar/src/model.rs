//! Declarative grammar model.
//!
//! A `Grammar` is plain data: rules as EBNF expressions plus the token,
//! embedding and symbol declarations around them. Nothing is resolved or
//! validated here; that happens in `inheritance` and `compiled`.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Expressions
// =============================================================================

/// Right-hand side of a rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Seq(Vec<Expr>),
    /// Alternatives in declaration order; earlier ones have priority.
    Alt(Vec<Expr>),
    Star(Box<Expr>),
    Plus(Box<Expr>),
    Opt(Box<Expr>),
    /// Quoted literal text.
    Literal(String),
    /// A token or rule name, resolved at compile time.
    Ref(String),
    /// An embedded-language region (`@LANG`).
    Embed(String),
    Eof,
}

impl Expr {
    /// The empty sequence.
    pub fn empty() -> Expr {
        Expr::Seq(Vec::new())
    }

    pub fn literal(text: impl Into<String>) -> Expr {
        Expr::Literal(text.into())
    }

    pub fn reference(name: impl Into<String>) -> Expr {
        Expr::Ref(name.into())
    }

    /// Sequence, collapsing a single element.
    pub fn seq(mut items: Vec<Expr>) -> Expr {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Seq(items)
        }
    }

    /// Alternation, collapsing a single branch.
    pub fn alt(mut items: Vec<Expr>) -> Expr {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Alt(items)
        }
    }

    /// Visit this expression and every sub-expression, pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Seq(items) | Expr::Alt(items) => {
                for item in items {
                    item.walk(f);
                }
            }
            Expr::Star(inner) | Expr::Plus(inner) | Expr::Opt(inner) => inner.walk(f),
            Expr::Literal(_) | Expr::Ref(_) | Expr::Embed(_) | Expr::Eof => {}
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
        match self {
            Expr::Seq(items) if items.is_empty() => write!(f, "()"),
            Expr::Seq(items) => {
                if nested {
                    write!(f, "(")?;
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    item.fmt_prec(f, true)?;
                }
                if nested {
                    write!(f, ")")?;
                }
                Ok(())
            }
            Expr::Alt(items) => {
                if nested {
                    write!(f, "(")?;
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    item.fmt_prec(f, false)?;
                }
                if nested {
                    write!(f, ")")?;
                }
                Ok(())
            }
            Expr::Star(inner) => {
                inner.fmt_prec(f, true)?;
                write!(f, "*")
            }
            Expr::Plus(inner) => {
                inner.fmt_prec(f, true)?;
                write!(f, "+")
            }
            Expr::Opt(inner) => {
                inner.fmt_prec(f, true)?;
                write!(f, "?")
            }
            Expr::Literal(text) => write!(f, "{text:?}"),
            Expr::Ref(name) => write!(f, "{name}"),
            Expr::Embed(lang) => write!(f, "@{lang}"),
            Expr::Eof => write!(f, "EOF"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, false)
    }
}

// =============================================================================
// Rules and tokens
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    /// Produces a `NonTerminal` node.
    #[default]
    Node,
    /// Contributes its children to the enclosing node.
    Inline,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    pub name: String,
    pub definition: Expr,
    pub kind: RuleKind,
}

impl Production {
    pub fn new(name: impl Into<String>, definition: Expr) -> Self {
        Production {
            name: name.into(),
            definition,
            kind: RuleKind::Node,
        }
    }

    pub fn inline(name: impl Into<String>, definition: Expr) -> Self {
        Production {
            name: name.into(),
            definition,
            kind: RuleKind::Inline,
        }
    }
}

/// Which node type a matched token becomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    #[default]
    Terminal,
    Identifier,
    Literal,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenPattern {
    Regex(String),
    Literal(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDef {
    pub name: String,
    pub pattern: TokenPattern,
    pub kind: TerminalKind,
}

impl TokenDef {
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        TokenDef {
            name: name.into(),
            pattern: TokenPattern::Regex(pattern.into()),
            kind: TerminalKind::Terminal,
        }
    }

    pub fn literal(name: impl Into<String>, text: impl Into<String>) -> Self {
        TokenDef {
            name: name.into(),
            pattern: TokenPattern::Literal(text.into()),
            kind: TerminalKind::Terminal,
        }
    }

    pub fn with_kind(mut self, kind: TerminalKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A region of another language, delimited by literal trigger and terminator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embedding {
    pub language: String,
    pub trigger: String,
    pub terminator: String,
}

impl Embedding {
    pub fn new(
        language: impl Into<String>,
        trigger: impl Into<String>,
        terminator: impl Into<String>,
    ) -> Self {
        Embedding {
            language: language.into(),
            trigger: trigger.into(),
            terminator: terminator.into(),
        }
    }
}

// =============================================================================
// Symbol declarations
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolScope {
    /// Visible only in the context that defined it.
    #[default]
    Local,
    /// Merged into the parent context when the defining context pops.
    Export,
}

/// Every node produced by the rule defines a symbol.
///
/// The symbol name is the text of the first `key` token inside the node, or
/// the node's whole text when no key is given.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDefinition {
    pub symbol_type: String,
    pub scope: SymbolScope,
    pub key: Option<String>,
}

/// Every node produced by the rule refers to a symbol of `target_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolReference {
    pub target_type: String,
    pub key: Option<String>,
}

/// Entry of the synchronization set used by error recovery.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTerminal {
    Literal(String),
    Token(String),
}

// =============================================================================
// Grammar
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    pub name: String,
    pub productions: IndexMap<String, Production>,
    pub tokens: IndexMap<String, TokenDef>,
    /// Keyed by trigger text
    pub embeddings: IndexMap<String, Embedding>,
    pub symbol_definitions: IndexMap<String, SymbolDefinition>,
    pub symbol_references: IndexMap<String, SymbolReference>,
    pub inherits: Vec<String>,
    pub precedence: Option<u32>,
    pub start: Option<String>,
    pub sync: Vec<SyncTerminal>,
    pub skip: Vec<String>,
}

impl Grammar {
    pub fn new(name: impl Into<String>) -> Self {
        Grammar {
            name: name.into(),
            ..Grammar::default()
        }
    }

    /// Add or replace a node rule.
    pub fn add_rule(&mut self, name: impl Into<String>, definition: Expr) -> &mut Self {
        self.add_production(Production::new(name, definition))
    }

    pub fn add_production(&mut self, production: Production) -> &mut Self {
        self.productions.insert(production.name.clone(), production);
        self
    }

    pub fn add_terminal(&mut self, token: TokenDef) -> &mut Self {
        self.tokens.insert(token.name.clone(), token);
        self
    }

    pub fn add_symbol_definition(
        &mut self,
        rule: impl Into<String>,
        definition: SymbolDefinition,
    ) -> &mut Self {
        self.symbol_definitions.insert(rule.into(), definition);
        self
    }

    pub fn add_symbol_reference(
        &mut self,
        rule: impl Into<String>,
        reference: SymbolReference,
    ) -> &mut Self {
        self.symbol_references.insert(rule.into(), reference);
        self
    }

    pub fn add_embedded_language(&mut self, embedding: Embedding) -> &mut Self {
        self.embeddings.insert(embedding.trigger.clone(), embedding);
        self
    }

    pub fn add_sync(&mut self, terminal: SyncTerminal) -> &mut Self {
        if !self.sync.contains(&terminal) {
            self.sync.push(terminal);
        }
        self
    }

    pub fn add_skip(&mut self, pattern: impl Into<String>) -> &mut Self {
        let pattern = pattern.into();
        if !self.skip.contains(&pattern) {
            self.skip.push(pattern);
        }
        self
    }

    /// Names of the languages this grammar can switch into.
    pub fn embedded_languages(&self) -> IndexSet<&str> {
        self.embeddings
            .values()
            .map(|e| e.language.as_str())
            .collect()
    }

    /// The declared start rule, or the first rule.
    pub fn start_rule(&self) -> Option<&str> {
        self.start
            .as_deref()
            .or_else(|| self.productions.keys().next().map(String::as_str))
    }

    pub fn has_productions(&self) -> bool {
        !self.productions.is_empty()
    }

    pub fn rule(&self, name: &str) -> Option<&Production> {
        self.productions.get(name)
    }
}
