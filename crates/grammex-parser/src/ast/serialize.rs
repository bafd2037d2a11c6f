//! Flat binary form of a tree.
//!
//! ```text
//! header   magic "GXA1", version u16, reserved u16,
//!          node count, child entry count, string count, blob length (u32 each)
//! nodes    node count records of 12 u32 words, in pre-order (root = 0):
//!          kind | flags << 16, name index, value index, span (6 words),
//!          parent index (u32::MAX for the root), first child entry, child count
//! children child entry count u32 node indices
//! strings  string count (offset, length) u32 pairs into the blob
//! blob     UTF-8 bytes
//! ```
//!
//! All integers are little-endian. `SerializedTree::parse` validates the whole
//! buffer once; its accessors then read straight out of the borrowed bytes.

use super::node::{AstArena, AstError, NodeId, NodeType};
use grammex_common::Span;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

const MAGIC: &[u8; 4] = b"GXA1";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 24;
const NODE_WORDS: usize = 12;
const NODE_SIZE: usize = NODE_WORDS * 4;
const NO_PARENT: u32 = u32::MAX;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a serialized tree (bad magic)")]
    BadMagic,
    #[error("unsupported serialized tree version {0}")]
    UnsupportedVersion(u16),
    #[error("serialized tree truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("{what} index {index} out of range")]
    IndexOutOfRange { what: &'static str, index: u32 },
    #[error("unknown node type {0}")]
    InvalidNodeType(u16),
    #[error("string {0} is not valid UTF-8")]
    InvalidUtf8(u32),
    #[error("serialized tree is empty")]
    Empty,
    #[error(transparent)]
    Ast(#[from] AstError),
}

// =============================================================================
// Writing
// =============================================================================

struct Writer<'a> {
    arena: &'a AstArena,
    nodes: Vec<[u32; NODE_WORDS]>,
    child_entries: Vec<u32>,
    strings: Vec<(u32, u32)>,
    blob: Vec<u8>,
    string_index: FxHashMap<u32, u32>,
}

impl Writer<'_> {
    fn string(&mut self, id: grammex_common::StringId) -> Result<u32, AstError> {
        if let Some(&index) = self.string_index.get(&id.0) {
            return Ok(index);
        }
        let text = self.arena.resolve(id).unwrap_or_default();
        let index = self.strings.len() as u32;
        self.strings
            .push((self.blob.len() as u32, text.len() as u32));
        self.blob.extend_from_slice(text.as_bytes());
        self.string_index.insert(id.0, index);
        Ok(index)
    }

    /// Emit `node` and its subtree; returns the node's index.
    fn node(&mut self, node: NodeId, parent: u32) -> Result<u32, AstError> {
        let index = self.nodes.len() as u32;
        let kind = self.arena.node_type(node)? as u32 | (u32::from(self.arena.flags(node)?) << 16);
        let name = self.string(self.arena.name_id(node)?)?;
        let value = self.string(self.arena.value_id(node)?)?;
        let span = self.arena.span(node)?;
        self.nodes.push([
            kind,
            name,
            value,
            span.start_line,
            span.start_column,
            span.start_offset,
            span.end_line,
            span.end_column,
            span.end_offset,
            parent,
            0,
            0,
        ]);

        let children = self.arena.children(node)?;
        let first = self.child_entries.len();
        self.child_entries.resize(first + children.len(), 0);
        for (i, child) in children.iter().enumerate() {
            let child_index = self.node(*child, index)?;
            self.child_entries[first + i] = child_index;
        }
        let record = &mut self.nodes[index as usize];
        record[10] = first as u32;
        record[11] = children.len() as u32;
        Ok(index)
    }
}

/// Encode the tree rooted at `root`.
pub fn serialize(arena: &AstArena, root: NodeId) -> Result<Vec<u8>, AstError> {
    let mut writer = Writer {
        arena,
        nodes: Vec::new(),
        child_entries: Vec::new(),
        strings: Vec::new(),
        blob: Vec::new(),
        string_index: FxHashMap::default(),
    };
    writer.node(root, NO_PARENT)?;

    let size = HEADER_SIZE
        + writer.nodes.len() * NODE_SIZE
        + writer.child_entries.len() * 4
        + writer.strings.len() * 8
        + writer.blob.len();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    for count in [
        writer.nodes.len(),
        writer.child_entries.len(),
        writer.strings.len(),
        writer.blob.len(),
    ] {
        out.extend_from_slice(&(count as u32).to_le_bytes());
    }
    for record in &writer.nodes {
        for word in record {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
    for entry in &writer.child_entries {
        out.extend_from_slice(&entry.to_le_bytes());
    }
    for (offset, len) in &writer.strings {
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
    }
    out.extend_from_slice(&writer.blob);

    debug!(
        nodes = writer.nodes.len(),
        strings = writer.strings.len(),
        bytes = out.len(),
        "tree serialized"
    );
    Ok(out)
}

// =============================================================================
// Reading
// =============================================================================

#[inline]
fn u32_at(buf: &[u8], at: usize) -> u32 {
    buf.get(at..at + 4)
        .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Validated, zero-copy view of a serialized tree.
#[derive(Clone, Copy, Debug)]
pub struct SerializedTree<'a> {
    buf: &'a [u8],
    node_count: u32,
    child_count: u32,
    string_count: u32,
    nodes_at: usize,
    children_at: usize,
    strings_at: usize,
    blob_at: usize,
}

impl<'a> SerializedTree<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            if buf.len() >= 4 && &buf[..4] != MAGIC {
                return Err(DecodeError::BadMagic);
            }
            return Err(DecodeError::Truncated {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }
        if &buf[..4] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let node_count = u32_at(buf, 8);
        let child_count = u32_at(buf, 12);
        let string_count = u32_at(buf, 16);
        let blob_len = u32_at(buf, 20);
        if node_count == 0 {
            return Err(DecodeError::Empty);
        }

        let nodes_at = HEADER_SIZE;
        let children_at = nodes_at + node_count as usize * NODE_SIZE;
        let strings_at = children_at + child_count as usize * 4;
        let blob_at = strings_at + string_count as usize * 8;
        let needed = blob_at + blob_len as usize;
        if buf.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                available: buf.len(),
            });
        }

        let tree = SerializedTree {
            buf: &buf[..needed],
            node_count,
            child_count,
            string_count,
            nodes_at,
            children_at,
            strings_at,
            blob_at,
        };
        tree.validate(blob_len)?;
        Ok(tree)
    }

    fn validate(&self, blob_len: u32) -> Result<(), DecodeError> {
        for index in 0..self.string_count {
            let at = self.strings_at + index as usize * 8;
            let offset = u32_at(self.buf, at);
            let len = u32_at(self.buf, at + 4);
            if u64::from(offset) + u64::from(len) > u64::from(blob_len) {
                return Err(DecodeError::IndexOutOfRange {
                    what: "string",
                    index,
                });
            }
            let start = self.blob_at + offset as usize;
            if std::str::from_utf8(&self.buf[start..start + len as usize]).is_err() {
                return Err(DecodeError::InvalidUtf8(index));
            }
        }

        for index in 0..self.node_count {
            let kind = self.word(index, 0) as u16;
            if NodeType::from_u16(kind).is_none() {
                return Err(DecodeError::InvalidNodeType(kind));
            }
            for (what, word) in [("name", 1), ("value", 2)] {
                if self.word(index, word) >= self.string_count {
                    return Err(DecodeError::IndexOutOfRange {
                        what,
                        index: self.word(index, word),
                    });
                }
            }
            let parent = self.word(index, 9);
            let bad_parent = if index == 0 {
                parent != NO_PARENT
            } else {
                parent >= index
            };
            if bad_parent {
                return Err(DecodeError::IndexOutOfRange {
                    what: "parent",
                    index: parent,
                });
            }
            let first = self.word(index, 10);
            let count = self.word(index, 11);
            if u64::from(first) + u64::from(count) > u64::from(self.child_count) {
                return Err(DecodeError::IndexOutOfRange {
                    what: "child entry",
                    index: first,
                });
            }
            for slot in first..first + count {
                let child = u32_at(self.buf, self.children_at + slot as usize * 4);
                if child <= index || child >= self.node_count {
                    return Err(DecodeError::IndexOutOfRange {
                        what: "child",
                        index: child,
                    });
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn word(&self, node: u32, word: usize) -> u32 {
        u32_at(self.buf, self.nodes_at + node as usize * NODE_SIZE + word * 4)
    }

    fn string(&self, index: u32) -> &'a str {
        let at = self.strings_at + index as usize * 8;
        let offset = u32_at(self.buf, at) as usize;
        let len = u32_at(self.buf, at + 4) as usize;
        let start = self.blob_at + offset;
        self.buf
            .get(start..start + len)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.node_count as usize
    }

    pub fn root(&self) -> SerializedNode<'a> {
        SerializedNode {
            tree: *self,
            index: 0,
        }
    }

    pub fn node(&self, index: u32) -> Option<SerializedNode<'a>> {
        (index < self.node_count).then_some(SerializedNode { tree: *self, index })
    }

    /// All nodes in pre-order.
    pub fn nodes(self) -> impl Iterator<Item = SerializedNode<'a>> + 'a {
        let tree = self;
        (0..self.node_count).map(move |index| SerializedNode { tree, index })
    }
}

/// One node of a `SerializedTree`.
#[derive(Clone, Copy, Debug)]
pub struct SerializedNode<'a> {
    tree: SerializedTree<'a>,
    index: u32,
}

impl<'a> SerializedNode<'a> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn node_type(&self) -> NodeType {
        NodeType::from_u16(self.tree.word(self.index, 0) as u16).unwrap_or(NodeType::Error)
    }

    pub fn flags(&self) -> u16 {
        (self.tree.word(self.index, 0) >> 16) as u16
    }

    pub fn name(&self) -> &'a str {
        self.tree.string(self.tree.word(self.index, 1))
    }

    pub fn value(&self) -> &'a str {
        self.tree.string(self.tree.word(self.index, 2))
    }

    pub fn span(&self) -> Span {
        let w = |i: usize| self.tree.word(self.index, 3 + i);
        Span {
            start_line: w(0),
            start_column: w(1),
            start_offset: w(2),
            end_line: w(3),
            end_column: w(4),
            end_offset: w(5),
        }
    }

    pub fn parent(&self) -> Option<SerializedNode<'a>> {
        match self.tree.word(self.index, 9) {
            NO_PARENT => None,
            parent => self.tree.node(parent),
        }
    }

    pub fn child_count(&self) -> usize {
        self.tree.word(self.index, 11) as usize
    }

    pub fn children(self) -> impl Iterator<Item = SerializedNode<'a>> + 'a {
        let tree = self.tree;
        let first = tree.word(self.index, 10);
        let count = tree.word(self.index, 11);
        (first..first + count).filter_map(move |slot| {
            tree.node(u32_at(tree.buf, tree.children_at + slot as usize * 4))
        })
    }
}

/// Rebuild a serialized tree inside `arena`; returns the new root.
pub fn deserialize(buf: &[u8], arena: &mut AstArena) -> Result<NodeId, DecodeError> {
    let tree = SerializedTree::parse(buf)?;

    let mut strings: FxHashMap<u32, grammex_common::StringId> = FxHashMap::default();
    let mut ids: Vec<NodeId> = Vec::with_capacity(tree.node_count());
    for node in tree.nodes() {
        let mut intern = |index: u32, text: &str| -> Result<_, AstError> {
            if let Some(&id) = strings.get(&index) {
                return Ok(id);
            }
            let id = arena.intern(text)?;
            strings.insert(index, id);
            Ok(id)
        };
        let name = intern(tree.word(node.index, 1), node.name())?;
        let value = intern(tree.word(node.index, 2), node.value())?;
        let id = arena.create_node_with_ids(node.node_type(), name, value, node.span())?;
        if node.flags() != 0 {
            arena.set_flags(id, node.flags())?;
        }
        ids.push(id);
    }

    for node in tree.nodes() {
        let parent = ids[node.index as usize];
        for child in node.children() {
            arena.add_child(parent, ids[child.index as usize])?;
        }
    }

    debug!(nodes = ids.len(), "tree deserialized");
    Ok(ids[0])
}
