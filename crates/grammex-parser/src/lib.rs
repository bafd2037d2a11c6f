//! Parser and AST for grammex.
//!
//! - `ast` - arena-resident nodes (`AstArena`, `NodeId`, `NodeType`) and the
//!   flat serialized form (`serialize`, `deserialize`, `SerializedTree`)
//! - `step` - the multi-path step machine, error recovery, embedded-region
//!   driver, semantic actions and parse options

pub mod ast;
pub use ast::{
    AstArena, AstError, DecodeError, NodeId, NodeType, SerializedNode, SerializedTree,
    deserialize, node_flags, serialize,
};

pub mod step;
pub use step::{
    ActionTable, ParseError, ParseOptions, ParseOutcome, SemanticActions, StepParser,
};

#[cfg(test)]
#[path = "tests/node_tests.rs"]
mod node_tests;
#[cfg(test)]
#[path = "tests/serialize_tests.rs"]
mod serialize_tests;
#[cfg(test)]
#[path = "tests/machine_tests.rs"]
mod machine_tests;
#[cfg(test)]
#[path = "tests/driver_tests.rs"]
mod driver_tests;
