//! Load-time grammar errors.
//!
//! Everything here is structural: once a `GrammarSet` has been built, none
//! of these can occur during a parse.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrammarError {
    /// The grammar description text is malformed.
    #[error("grammar syntax error at {line}:{column}: {message}")]
    Syntax {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("grammar description has no `grammar NAME;` declaration")]
    MissingName,

    #[error("cannot read grammar file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cyclic inheritance: {}", cycle.join(" -> "))]
    CyclicInheritance { cycle: Vec<String> },

    #[error("grammar '{grammar}' inherits from unknown grammar '{parent}'")]
    UnknownParent { grammar: String, parent: String },

    /// Two inputs of equal precedence disagree on a definition.
    #[error(
        "conflicting {what} '{name}' in grammars '{first}' and '{second}' (both precedence {precedence})"
    )]
    Composition {
        what: &'static str,
        name: String,
        first: String,
        second: String,
        precedence: u32,
    },

    #[error("grammar '{grammar}': rule '{rule}' refers to undefined name '{name}'")]
    UndefinedRule {
        grammar: String,
        rule: String,
        name: String,
    },

    #[error("grammar '{grammar}': rule '{rule}' embeds '{language}' without an `embed` declaration")]
    UndefinedEmbedding {
        grammar: String,
        rule: String,
        language: String,
    },

    #[error("grammar '{grammar}': {context} names undefined token '{name}'")]
    UndefinedToken {
        grammar: String,
        context: String,
        name: String,
    },

    #[error("grammar '{grammar}': '{name}' is declared both as a token and as a rule")]
    AmbiguousName { grammar: String, name: String },

    #[error("grammar '{grammar}': invalid pattern for '{token}': {message}")]
    InvalidPattern {
        grammar: String,
        token: String,
        message: String,
    },

    #[error("grammar '{grammar}': left recursion through {}", cycle.join(" -> "))]
    LeftRecursion { grammar: String, cycle: Vec<String> },

    #[error("grammar '{grammar}': start rule '{rule}' is not defined")]
    MissingStartRule { grammar: String, rule: String },

    #[error("grammar '{grammar}' has no rules")]
    NoRules { grammar: String },

    #[error("grammar '{grammar}': inline rule '{rule}' cannot define or reference symbols")]
    InlineSymbolRule { grammar: String, rule: String },

    #[error("grammar '{name}' is defined more than once")]
    DuplicateGrammar { name: String },

    #[error("unknown grammar '{name}'")]
    UnknownGrammar { name: String },

    #[error("grammar '{grammar}' embeds unknown language '{language}'")]
    UnknownEmbeddedLanguage { grammar: String, language: String },
}

impl GrammarError {
    pub(crate) fn syntax(line: u32, column: u32, message: impl Into<String>) -> Self {
        GrammarError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }
}
