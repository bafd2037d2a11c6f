//! Diagnostic Infrastructure
//!
//! Every recoverable problem found while parsing (syntax errors, context
//! overflow, cross-language validation findings) is collected as a
//! `Diagnostic` next to the best-effort tree. Only grammar-load errors and
//! arena exhaustion abort outright; those are `Err` values, not diagnostics.
//!
//! # Components
//!
//! - `Diagnostic` - A single message with kind, code, span, severity and language
//! - `DiagnosticBag` - A bounded collection for one parse
//! - `DiagnosticSeverity` - Fatal, Error, Warning or Info
//! - `DiagnosticKind` - The error taxonomy, each with a stable code

use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric codes, one per `DiagnosticKind`.
pub mod diagnostic_codes {
    pub const SYNTAX_ERROR: u32 = 1001;
    pub const CONTEXT_OVERFLOW: u32 = 2001;
    pub const EMBEDDED_REGION_ABANDONED: u32 = 2002;
    pub const CROSS_LANGUAGE_VALIDATION: u32 = 3001;
    pub const DIAGNOSTIC_LIMIT: u32 = 9001;
    pub const CANCELLED: u32 = 9002;
}

// =============================================================================
// Diagnostic Kind
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Input violates the active grammar; parsing resynchronized.
    SyntaxError,
    /// Embedding nested deeper than `max_context_depth`.
    ContextOverflow,
    /// An embedded context exceeded its error threshold and was dropped.
    EmbeddedRegionAbandoned,
    /// A cross-language reference did not resolve.
    CrossLanguageValidation,
    /// Too many diagnostics; parsing was truncated.
    DiagnosticLimit,
    /// The caller cancelled the parse.
    Cancelled,
}

impl DiagnosticKind {
    pub fn code(self) -> u32 {
        use diagnostic_codes::*;
        match self {
            DiagnosticKind::SyntaxError => SYNTAX_ERROR,
            DiagnosticKind::ContextOverflow => CONTEXT_OVERFLOW,
            DiagnosticKind::EmbeddedRegionAbandoned => EMBEDDED_REGION_ABANDONED,
            DiagnosticKind::CrossLanguageValidation => CROSS_LANGUAGE_VALIDATION,
            DiagnosticKind::DiagnosticLimit => DIAGNOSTIC_LIMIT,
            DiagnosticKind::Cancelled => CANCELLED,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::SyntaxError => "SyntaxError",
            DiagnosticKind::ContextOverflow => "ContextOverflowError",
            DiagnosticKind::EmbeddedRegionAbandoned => "EmbeddedRegionAbandoned",
            DiagnosticKind::CrossLanguageValidation => "CrossLanguageValidationWarning",
            DiagnosticKind::DiagnosticLimit => "DiagnosticLimit",
            DiagnosticKind::Cancelled => "Cancelled",
        }
    }
}

// =============================================================================
// Diagnostic Severity
// =============================================================================

/// The severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Parsing stopped early; the tree is partial
    Fatal = 0,
    /// Recoverable error
    Error = 1,
    Warning = 2,
    Info = 3,
}

impl DiagnosticSeverity {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticSeverity::Fatal => "fatal",
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Info => "info",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DiagnosticSeverity::Fatal | DiagnosticSeverity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, DiagnosticSeverity::Warning)
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Diagnostic
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub code: u32,
    pub message: String,
    pub span: Span,
    pub severity: DiagnosticSeverity,
    /// Grammar whose context was active when the diagnostic was produced
    pub language: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        severity: DiagnosticSeverity,
        language: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            code: kind.code(),
            message: message.into(),
            span,
            severity,
            language: language.into(),
        }
    }

    pub fn syntax_error(language: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self::new(
            DiagnosticKind::SyntaxError,
            DiagnosticSeverity::Error,
            language,
            span,
            message,
        )
    }

    pub fn warning(
        kind: DiagnosticKind,
        language: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self::new(kind, DiagnosticSeverity::Warning, language, span, message)
    }

    pub fn fatal(
        kind: DiagnosticKind,
        language: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self::new(kind, DiagnosticSeverity::Fatal, language, span, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }

    pub fn is_warning(&self) -> bool {
        self.severity.is_warning()
    }

    /// Format the diagnostic in a simple format.
    ///
    /// Returns a string like: "error[GX1001] CSS 1:9: Unexpected '}'"
    pub fn format_simple(&self) -> String {
        format!(
            "{}[GX{}] {} {}:{}: {}",
            self.severity,
            self.code,
            self.language,
            self.span.start_line,
            self.span.start_column,
            self.message
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

// =============================================================================
// DiagnosticBag
// =============================================================================

/// A bounded collection of diagnostics for one parse.
///
/// Once `limit` diagnostics are stored, the next `add` records a single
/// fatal `DiagnosticLimit` entry and the bag reports itself truncated; the
/// parser stops at that point.
#[derive(Clone, Debug)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    limit: usize,
    error_count: usize,
    warning_count: usize,
    truncated: bool,
}

impl DiagnosticBag {
    pub fn new(limit: usize) -> Self {
        DiagnosticBag {
            diagnostics: Vec::new(),
            limit,
            error_count: 0,
            warning_count: 0,
            truncated: false,
        }
    }

    /// Add a diagnostic. Returns `false` when the limit was hit.
    pub fn add(&mut self, diagnostic: Diagnostic) -> bool {
        if self.truncated {
            return false;
        }
        if self.diagnostics.len() >= self.limit {
            self.truncated = true;
            let span = diagnostic.span;
            let language = diagnostic.language.clone();
            self.push(Diagnostic::fatal(
                DiagnosticKind::DiagnosticLimit,
                language,
                span,
                format!("too many diagnostics (limit {}); parsing stopped", self.limit),
            ));
            return false;
        }
        self.push(diagnostic);
        true
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.error_count += 1;
        } else if diagnostic.is_warning() {
            self.warning_count += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    /// Record a terminal diagnostic (cancellation) regardless of the limit.
    pub fn add_terminal(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
