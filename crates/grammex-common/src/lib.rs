//! Common types and utilities for the grammex parsing engine.
//!
//! This crate provides foundational types used across all grammex crates:
//! - Bump arena with offset handles (`Arena`, `ArenaOffset`, `ArenaConfig`)
//! - String interning backed by the arena (`StringId`, `StringInterner`)
//! - Source locations (`Span`, `Position`, `LineMap`)
//! - Diagnostics (`Diagnostic`, `DiagnosticBag`, `DiagnosticKind`)
//! - Engine limits and thresholds
//! - Cooperative cancellation (`CancellationToken`)

// Bump allocation over chunked byte regions
pub mod arena;
pub use arena::{Arena, ArenaConfig, ArenaError, ArenaOffset};

// String interning for names and token text
pub mod interner;
pub use interner::{StringId, StringInterner};

// Span - line/column/offset source locations
pub mod span;
pub use span::{LineMap, Position, Span};

// Diagnostics collected next to best-effort trees
pub mod diagnostics;
pub use diagnostics::{
    Diagnostic, DiagnosticBag, DiagnosticKind, DiagnosticSeverity, diagnostic_codes,
};

// Centralized limits and thresholds
pub mod limits;

pub mod cancel;
pub use cancel::CancellationToken;

#[cfg(test)]
#[path = "tests/arena_tests.rs"]
mod arena_tests;
#[cfg(test)]
#[path = "tests/interner_tests.rs"]
mod interner_tests;
#[cfg(test)]
#[path = "tests/span_tests.rs"]
mod span_tests;
#[cfg(test)]
#[path = "tests/diagnostics_tests.rs"]
mod diagnostics_tests;
