//! Tests for diagnostics.

use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticKind, DiagnosticSeverity};
use crate::span::Span;

#[test]
fn test_bag_counts_by_severity() {
    let mut bag = DiagnosticBag::new(10);
    bag.add(Diagnostic::syntax_error("JS", Span::default(), "unexpected ';'"));
    bag.add(Diagnostic::warning(
        DiagnosticKind::CrossLanguageValidation,
        "CSS",
        Span::default(),
        "unknown id",
    ));

    assert_eq!(bag.error_count(), 1);
    assert_eq!(bag.warning_count(), 1);
    assert!(bag.has_errors());
    assert!(!bag.is_truncated());
}

#[test]
fn test_bag_truncates_at_limit() {
    let mut bag = DiagnosticBag::new(2);
    assert!(bag.add(Diagnostic::syntax_error("JS", Span::default(), "one")));
    assert!(bag.add(Diagnostic::syntax_error("JS", Span::default(), "two")));
    assert!(!bag.add(Diagnostic::syntax_error("JS", Span::default(), "three")));
    assert!(!bag.add(Diagnostic::syntax_error("JS", Span::default(), "four")));

    assert!(bag.is_truncated());
    assert_eq!(bag.len(), 3);
    let last = bag.iter().last().unwrap();
    assert_eq!(last.kind, DiagnosticKind::DiagnosticLimit);
    assert_eq!(last.severity, DiagnosticSeverity::Fatal);
}

#[test]
fn test_codes_follow_kind() {
    let diag = Diagnostic::fatal(DiagnosticKind::Cancelled, "HTML", Span::default(), "stop");
    assert_eq!(diag.code, 9002);
    assert_eq!(diag.format_simple(), "fatal[GX9002] HTML 0:0: stop");
}

#[test]
fn test_diagnostic_serializes_to_json() {
    let diag = Diagnostic::syntax_error("JS", Span::default(), "bad");
    let json = serde_json::to_value(&diag).unwrap();
    assert_eq!(json["kind"], "SyntaxError");
    assert_eq!(json["severity"], "error");
    assert_eq!(json["code"], 1001);
}
