//! Zero-copy syntax tree.
//!
//! Nodes, child lists and strings all live in one `Arena`. A `NodeId` is the
//! byte offset of a node record plus the arena epoch it was issued in, so a
//! handle that outlives an arena reset is rejected instead of reading
//! unrelated memory.

mod node;
pub use node::{AstArena, AstError, NodeId, NodeType, node_flags};

mod serialize;
pub use serialize::{DecodeError, SerializedNode, SerializedTree, deserialize, serialize};
