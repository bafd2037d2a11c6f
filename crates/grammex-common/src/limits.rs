//! Centralized limits and thresholds for the grammex engine.
//!
//! These are the defaults behind `ArenaConfig` and `ParseOptions`; callers
//! override them per parse. Keeping them in one place prevents the lexer,
//! parser and context engine from drifting apart.
//!
//! # Categories
//!
//! - **Memory**: arena chunking and the hard capacity ceiling
//! - **Exploration**: bounds on the multi-path step machine
//! - **Contexts**: nesting and per-context error budgets
//! - **Reporting**: diagnostic counts and message sizes

// =============================================================================
// Memory
// =============================================================================

/// Size of each arena chunk. Requests larger than this get their own chunk.
pub const DEFAULT_ARENA_CHUNK_SIZE: usize = 64 * 1024;

/// Default hard ceiling for a single parse's arena.
///
/// Exceeding it is `OutOfMemory`; callers may retry with a larger budget.
pub const DEFAULT_ARENA_CAPACITY: usize = 256 * 1024 * 1024;

// =============================================================================
// Exploration
// =============================================================================

/// Maximum rule nesting on a single parse state's stack.
///
/// Right-recursive grammars nest one frame per repetition:
///
/// ```text
/// list : ITEM ("," list)? ;
/// ```
///
/// A state that would nest deeper is discarded like any other dead branch.
pub const MAX_RULE_DEPTH: usize = 512;

/// Maximum number of live parse states after a step.
///
/// States with identical rule stacks are already merged, so this only bites
/// on highly ambiguous grammars. The lowest-priority states are dropped.
pub const MAX_ACTIVE_STATES: usize = 1024;

// =============================================================================
// Contexts
// =============================================================================

/// Maximum depth of embedded contexts below the root document context.
pub const MAX_CONTEXT_DEPTH: usize = 16;

/// Syntax errors tolerated inside one embedded context before it is
/// abandoned and the host resumes at the terminator.
pub const CONTEXT_ERROR_THRESHOLD: usize = 10;

// =============================================================================
// Reporting
// =============================================================================

/// Default maximum number of diagnostics per parse.
pub const MAX_DIAGNOSTICS: usize = 100;

/// Expected terminals listed in a syntax error message.
pub const MAX_EXPECTED_IN_MESSAGE: usize = 8;

// =============================================================================
// Grammar composition
// =============================================================================

/// Precedence of a grammar that neither appears in the precedence table nor
/// declares `precedence N;` itself. Lower values win.
pub const DEFAULT_PRECEDENCE: u32 = 100;
