use grammex_common::limits::{
    CONTEXT_ERROR_THRESHOLD, MAX_ACTIVE_STATES, MAX_CONTEXT_DEPTH, MAX_DIAGNOSTICS,
    MAX_RULE_DEPTH,
};
use grammex_common::{ArenaConfig, CancellationToken};
use grammex_context::EngineConfig;
use serde::{Deserialize, Serialize};

/// Per-parse limits. Every field has a default; JSON configs may set any
/// subset of them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Diagnostics kept before the parse stops with a limit diagnostic
    pub max_diagnostics: usize,
    /// Embedded contexts allowed below the document
    pub max_context_depth: usize,
    /// Syntax errors tolerated inside one embedded region
    pub context_error_threshold: usize,
    pub max_rule_depth: usize,
    pub max_active_states: usize,
    pub arena: ArenaConfig,
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_diagnostics: MAX_DIAGNOSTICS,
            max_context_depth: MAX_CONTEXT_DEPTH,
            context_error_threshold: CONTEXT_ERROR_THRESHOLD,
            max_rule_depth: MAX_RULE_DEPTH,
            max_active_states: MAX_ACTIVE_STATES,
            arena: ArenaConfig::default(),
            cancellation: None,
        }
    }
}

impl ParseOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_depth: self.max_context_depth,
            error_threshold: self.context_error_threshold,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
