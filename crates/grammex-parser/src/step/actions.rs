//! Semantic actions: user callbacks fired while the tree is built.

use crate::ast::{AstArena, NodeId, NodeType};
use grammex_common::Diagnostic;
use rustc_hash::FxHashMap;

/// Callbacks for one grammar and node type. Every method defaults to doing
/// nothing.
///
/// `on_enter_rule` sees a node before its children are attached,
/// `on_exit_rule` after its subtree and span are final.
pub trait SemanticActions {
    fn on_enter_rule(&mut self, _arena: &AstArena, _node: NodeId) {}
    fn on_exit_rule(&mut self, _arena: &AstArena, _node: NodeId) {}
    fn on_error(&mut self, _diagnostic: &Diagnostic) {}
}

/// Actions keyed by grammar name, then node type.
#[derive(Default)]
pub struct ActionTable {
    by_grammar: FxHashMap<String, FxHashMap<NodeType, Box<dyn SemanticActions>>>,
}

impl ActionTable {
    pub fn new() -> Self {
        ActionTable::default()
    }

    /// Register `actions` for `node_type` nodes of `grammar`, replacing any
    /// earlier registration.
    pub fn register(
        &mut self,
        grammar: &str,
        node_type: NodeType,
        actions: impl SemanticActions + 'static,
    ) {
        self.by_grammar
            .entry(grammar.to_string())
            .or_default()
            .insert(node_type, Box::new(actions));
    }

    pub fn is_empty(&self) -> bool {
        self.by_grammar.values().all(FxHashMap::is_empty)
    }

    pub(crate) fn get_mut(
        &mut self,
        grammar: &str,
        node_type: NodeType,
    ) -> Option<&mut (dyn SemanticActions + 'static)> {
        self.by_grammar
            .get_mut(grammar)?
            .get_mut(&node_type)
            .map(|actions| actions.as_mut())
    }
}

impl std::fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.by_grammar
                    .iter()
                    .map(|(grammar, types)| (grammar, types.keys().collect::<Vec<_>>())),
            )
            .finish()
    }
}
