//! Arena-resident node records.
//!
//! Every node is a fixed 52-byte record of little-endian u32 words:
//!
//! ```text
//! word  0      kind (low 16 bits) | flags (high 16 bits)
//! word  1      name  (StringId)
//! word  2      value (StringId)
//! words 3..9   span: start line/column/offset, end line/column/offset
//! word  9      parent record offset, or NO_PARENT
//! word 10      children block offset
//! word 11      children length
//! word 12      children capacity
//! ```
//!
//! A children block is a run of u32 record offsets. It doubles by copying
//! into a fresh block; the old block is simply abandoned, as everything in a
//! bump arena is until `reset`.

use grammex_common::{
    Arena, ArenaConfig, ArenaError, ArenaOffset, Position, Span, StringId, StringInterner,
};
use serde::Serialize;
use std::fmt::Write as _;
use thiserror::Error;
use tracing::debug;

const WORD: usize = 4;
const RECORD_WORDS: usize = 13;
const RECORD_SIZE: usize = RECORD_WORDS * WORD;

const W_KIND: u32 = 0;
const W_NAME: u32 = 1;
const W_VALUE: u32 = 2;
const W_SPAN: u32 = 3;
const W_PARENT: u32 = 9;
const W_CHILDREN: u32 = 10;
const W_CHILD_LEN: u32 = 11;
const W_CHILD_CAP: u32 = 12;

const NO_PARENT: u32 = u32::MAX;
const INITIAL_CHILD_CAPACITY: u32 = 4;

/// Flags stored in the high half of a record's first word.
pub mod node_flags {
    /// The node was closed by error recovery rather than by its rule
    pub const INCOMPLETE: u16 = 1 << 0;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum NodeType {
    Program = 0,
    NonTerminal = 1,
    Terminal = 2,
    Identifier = 3,
    Literal = 4,
    Embedded = 5,
    Error = 6,
}

impl NodeType {
    pub fn from_u16(raw: u16) -> Option<NodeType> {
        Some(match raw {
            0 => NodeType::Program,
            1 => NodeType::NonTerminal,
            2 => NodeType::Terminal,
            3 => NodeType::Identifier,
            4 => NodeType::Literal,
            5 => NodeType::Embedded,
            6 => NodeType::Error,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeType::Program => "Program",
            NodeType::NonTerminal => "NonTerminal",
            NodeType::Terminal => "Terminal",
            NodeType::Identifier => "Identifier",
            NodeType::Literal => "Literal",
            NodeType::Embedded => "Embedded",
            NodeType::Error => "Error",
        }
    }

    /// Token-backed node types.
    pub fn is_token(self) -> bool {
        matches!(
            self,
            NodeType::Terminal | NodeType::Identifier | NodeType::Literal
        )
    }
}

/// Handle to a node: record offset plus the arena epoch it was created in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    offset: u32,
    epoch: u32,
}

impl NodeId {
    /// Byte offset of the record inside the arena.
    pub fn offset(self) -> u32 {
        self.offset
    }

    pub fn epoch(self) -> u32 {
        self.epoch
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AstError {
    #[error("AST arena exhausted: {0}")]
    OutOfMemory(#[from] ArenaError),
    #[error("node handle {offset} belongs to a reset arena")]
    StaleHandle { offset: u32 },
    #[error("node handle {offset} does not point at a node")]
    InvalidHandle { offset: u32 },
    #[error("node {child} already has a parent")]
    AlreadyHasParent { child: u32 },
    #[error("node {child} cannot be a child of node {parent}")]
    InvalidChild { parent: u32, child: u32 },
}

/// Nodes, child lists and interned strings of one parse.
#[derive(Debug)]
pub struct AstArena {
    arena: Arena,
    interner: StringInterner,
    node_count: usize,
}

impl Default for AstArena {
    fn default() -> Self {
        AstArena::new(ArenaConfig::default())
    }
}

impl AstArena {
    pub fn new(config: ArenaConfig) -> Self {
        AstArena {
            arena: Arena::new(config),
            interner: StringInterner::new(),
            node_count: 0,
        }
    }

    /// Drop every node and string. Handles issued before become stale.
    pub fn reset(&mut self) {
        debug!(nodes = self.node_count, "AST arena reset");
        self.arena.reset();
        self.interner.reset();
        self.node_count = 0;
    }

    pub fn epoch(&self) -> u32 {
        self.arena.epoch()
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn allocated_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }

    pub fn config(&self) -> ArenaConfig {
        self.arena.config()
    }

    // -------------------------------------------------------------------------
    // Strings
    // -------------------------------------------------------------------------

    pub fn intern(&mut self, text: &str) -> Result<StringId, AstError> {
        Ok(self.interner.intern_str(&mut self.arena, text)?)
    }

    pub fn resolve(&self, id: StringId) -> Option<&str> {
        self.interner.resolve_str(&self.arena, id)
    }

    // -------------------------------------------------------------------------
    // Raw record access
    // -------------------------------------------------------------------------

    fn check(&self, node: NodeId) -> Result<(), AstError> {
        if node.epoch != self.arena.epoch() {
            return Err(AstError::StaleHandle {
                offset: node.offset,
            });
        }
        if self
            .arena
            .bytes(ArenaOffset(node.offset), RECORD_SIZE)
            .is_none()
        {
            return Err(AstError::InvalidHandle {
                offset: node.offset,
            });
        }
        Ok(())
    }

    #[inline]
    fn word_at(&self, offset: u32, word: u32) -> Result<u32, AstError> {
        self.arena
            .read_u32(ArenaOffset(offset + word * WORD as u32))
            .ok_or(AstError::InvalidHandle { offset })
    }

    #[inline]
    fn set_word_at(&mut self, offset: u32, word: u32, value: u32) -> Result<(), AstError> {
        self.arena
            .write_u32(ArenaOffset(offset + word * WORD as u32), value)
            .ok_or(AstError::InvalidHandle { offset })
    }

    fn word(&self, node: NodeId, word: u32) -> Result<u32, AstError> {
        self.check(node)?;
        self.word_at(node.offset, word)
    }

    fn handle(&self, offset: u32) -> NodeId {
        NodeId {
            offset,
            epoch: self.arena.epoch(),
        }
    }

    // -------------------------------------------------------------------------
    // Creation and linking
    // -------------------------------------------------------------------------

    /// Allocate a detached node.
    pub fn create_node(
        &mut self,
        node_type: NodeType,
        name: &str,
        value: &str,
        span: Span,
    ) -> Result<NodeId, AstError> {
        let name = self.intern(name)?;
        let value = self.intern(value)?;
        self.create_node_with_ids(node_type, name, value, span)
    }

    /// Allocate a detached node whose strings are already interned.
    pub fn create_node_with_ids(
        &mut self,
        node_type: NodeType,
        name: StringId,
        value: StringId,
        span: Span,
    ) -> Result<NodeId, AstError> {
        let words: [u32; RECORD_WORDS] = [
            node_type as u32,
            name.0,
            value.0,
            span.start_line,
            span.start_column,
            span.start_offset,
            span.end_line,
            span.end_column,
            span.end_offset,
            NO_PARENT,
            0,
            0,
            0,
        ];
        let mut bytes = [0u8; RECORD_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(WORD).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let offset = self.arena.alloc_bytes(&bytes, WORD)?;
        self.node_count += 1;
        Ok(self.handle(offset.get()))
    }

    /// Append `child` to `parent`'s children.
    ///
    /// A child must be detached and must have been created after its parent,
    /// which keeps every tree acyclic and its records in pre-order.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), AstError> {
        self.check(parent)?;
        self.check(child)?;
        if child.offset <= parent.offset {
            return Err(AstError::InvalidChild {
                parent: parent.offset,
                child: child.offset,
            });
        }
        if self.word_at(child.offset, W_PARENT)? != NO_PARENT {
            return Err(AstError::AlreadyHasParent {
                child: child.offset,
            });
        }

        let mut block = self.word_at(parent.offset, W_CHILDREN)?;
        let len = self.word_at(parent.offset, W_CHILD_LEN)?;
        let cap = self.word_at(parent.offset, W_CHILD_CAP)?;
        if len == cap {
            let new_cap = (cap * 2).max(INITIAL_CHILD_CAPACITY);
            let new_block = self
                .arena
                .allocate(new_cap as usize * WORD, WORD)?
                .get();
            if len > 0 {
                let old = self
                    .arena
                    .bytes(ArenaOffset(block), len as usize * WORD)
                    .ok_or(AstError::InvalidHandle { offset: block })?
                    .to_vec();
                self.arena
                    .write(ArenaOffset(new_block), &old)
                    .ok_or(AstError::InvalidHandle { offset: new_block })?;
            }
            block = new_block;
            self.set_word_at(parent.offset, W_CHILDREN, block)?;
            self.set_word_at(parent.offset, W_CHILD_CAP, new_cap)?;
        }

        self.arena
            .write_u32(ArenaOffset(block + len * WORD as u32), child.offset)
            .ok_or(AstError::InvalidHandle { offset: block })?;
        self.set_word_at(parent.offset, W_CHILD_LEN, len + 1)?;
        self.set_word_at(child.offset, W_PARENT, parent.offset)
    }

    /// Detach every child past the first `len`.
    pub fn truncate_children(&mut self, parent: NodeId, len: usize) -> Result<(), AstError> {
        let children = self.children(parent)?;
        if len >= children.len() {
            return Ok(());
        }
        for child in &children[len..] {
            self.set_word_at(child.offset, W_PARENT, NO_PARENT)?;
        }
        self.set_word_at(parent.offset, W_CHILD_LEN, len as u32)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn node_type(&self, node: NodeId) -> Result<NodeType, AstError> {
        let raw = self.word(node, W_KIND)? as u16;
        NodeType::from_u16(raw).ok_or(AstError::InvalidHandle {
            offset: node.offset,
        })
    }

    pub fn flags(&self, node: NodeId) -> Result<u16, AstError> {
        Ok((self.word(node, W_KIND)? >> 16) as u16)
    }

    pub fn set_flags(&mut self, node: NodeId, flags: u16) -> Result<(), AstError> {
        let kind = self.word(node, W_KIND)? & 0xFFFF;
        self.set_word_at(node.offset, W_KIND, kind | (u32::from(flags) << 16))
    }

    pub fn has_flag(&self, node: NodeId, flag: u16) -> Result<bool, AstError> {
        Ok(self.flags(node)? & flag != 0)
    }

    pub fn name_id(&self, node: NodeId) -> Result<StringId, AstError> {
        Ok(StringId(self.word(node, W_NAME)?))
    }

    pub fn value_id(&self, node: NodeId) -> Result<StringId, AstError> {
        Ok(StringId(self.word(node, W_VALUE)?))
    }

    /// Rule, terminal or language name.
    pub fn name(&self, node: NodeId) -> Result<&str, AstError> {
        let id = self.name_id(node)?;
        self.resolve(id).ok_or(AstError::InvalidHandle {
            offset: node.offset,
        })
    }

    /// Token text for token nodes, raw text for embedded and error nodes,
    /// empty otherwise.
    pub fn value(&self, node: NodeId) -> Result<&str, AstError> {
        let id = self.value_id(node)?;
        self.resolve(id).ok_or(AstError::InvalidHandle {
            offset: node.offset,
        })
    }

    /// The node's own text: its value, or the concatenated text of its
    /// token descendants when it has none.
    pub fn text(&self, node: NodeId) -> Result<String, AstError> {
        let value = self.value(node)?;
        if !value.is_empty() || self.child_count(node)? == 0 {
            return Ok(value.to_string());
        }
        let mut out = String::new();
        for id in self.descendants(node)? {
            if self.node_type(id)?.is_token() {
                out.push_str(self.value(id)?);
            }
        }
        Ok(out)
    }

    /// The slice of `source` the node spans.
    pub fn source_text<'s>(&self, node: NodeId, source: &'s str) -> Result<&'s str, AstError> {
        let span = self.span(node)?;
        Ok(source
            .get(span.start_offset as usize..span.end_offset as usize)
            .unwrap_or_default())
    }

    pub fn span(&self, node: NodeId) -> Result<Span, AstError> {
        self.check(node)?;
        let mut w = [0u32; 6];
        for (i, slot) in w.iter_mut().enumerate() {
            *slot = self.word_at(node.offset, W_SPAN + i as u32)?;
        }
        Ok(Span {
            start_line: w[0],
            start_column: w[1],
            start_offset: w[2],
            end_line: w[3],
            end_column: w[4],
            end_offset: w[5],
        })
    }

    pub fn set_span(&mut self, node: NodeId, span: Span) -> Result<(), AstError> {
        self.set_start_position(node, span.start())?;
        self.set_end_position(node, span.end())
    }

    pub fn set_start_position(&mut self, node: NodeId, pos: Position) -> Result<(), AstError> {
        self.check(node)?;
        self.set_word_at(node.offset, W_SPAN, pos.line)?;
        self.set_word_at(node.offset, W_SPAN + 1, pos.column)?;
        self.set_word_at(node.offset, W_SPAN + 2, pos.offset)
    }

    pub fn set_end_position(&mut self, node: NodeId, pos: Position) -> Result<(), AstError> {
        self.check(node)?;
        self.set_word_at(node.offset, W_SPAN + 3, pos.line)?;
        self.set_word_at(node.offset, W_SPAN + 4, pos.column)?;
        self.set_word_at(node.offset, W_SPAN + 5, pos.offset)
    }

    /// Copy `source`'s whole span onto `node`.
    pub fn copy_position_from(&mut self, node: NodeId, source: NodeId) -> Result<(), AstError> {
        let span = self.span(source)?;
        self.set_span(node, span)
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>, AstError> {
        let raw = self.word(node, W_PARENT)?;
        Ok((raw != NO_PARENT).then(|| self.handle(raw)))
    }

    pub fn child_count(&self, node: NodeId) -> Result<usize, AstError> {
        Ok(self.word(node, W_CHILD_LEN)? as usize)
    }

    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>, AstError> {
        let len = self.word(node, W_CHILD_LEN)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let block = self.word_at(node.offset, W_CHILDREN)?;
        let bytes = self
            .arena
            .bytes(ArenaOffset(block), len as usize * WORD)
            .ok_or(AstError::InvalidHandle { offset: block })?;
        Ok(bytes
            .chunks_exact(WORD)
            .map(|b| self.handle(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            .collect())
    }

    pub fn child_at(&self, node: NodeId, index: usize) -> Result<Option<NodeId>, AstError> {
        let len = self.word(node, W_CHILD_LEN)? as usize;
        if index >= len {
            return Ok(None);
        }
        let block = self.word_at(node.offset, W_CHILDREN)?;
        let offset = self.word_at(block, index as u32)?;
        Ok(Some(self.handle(offset)))
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// `node` and everything below it, in pre-order.
    pub fn descendants(&self, node: NodeId) -> Result<Vec<NodeId>, AstError> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.children(id)?;
            stack.extend(children.into_iter().rev());
        }
        Ok(out)
    }

    /// First node in pre-order below (and including) `root` matching `pred`.
    pub fn find_first(
        &self,
        root: NodeId,
        mut pred: impl FnMut(&AstArena, NodeId) -> bool,
    ) -> Result<Option<NodeId>, AstError> {
        Ok(self
            .descendants(root)?
            .into_iter()
            .find(|&id| pred(self, id)))
    }

    /// First node named `name` below (and including) `root`.
    pub fn find_named(&self, root: NodeId, name: &str) -> Result<Option<NodeId>, AstError> {
        self.find_first(root, |arena, id| arena.name(id).is_ok_and(|n| n == name))
    }

    /// S-expression dump, one node per line, for tests and debugging.
    pub fn dump(&self, root: NodeId) -> Result<String, AstError> {
        let mut out = String::new();
        self.dump_into(root, 0, &mut out)?;
        Ok(out)
    }

    fn dump_into(&self, node: NodeId, indent: usize, out: &mut String) -> Result<(), AstError> {
        let node_type = self.node_type(node)?;
        let name = self.name(node)?;
        let value = self.value(node)?;
        let _ = write!(out, "{:indent$}({}", "", node_type.name(), indent = indent);
        if !name.is_empty() {
            let _ = write!(out, " {name}");
        }
        if !value.is_empty() {
            let _ = write!(out, " {value:?}");
        }
        if self.has_flag(node, node_flags::INCOMPLETE)? {
            out.push_str(" !incomplete");
        }
        let children = self.children(node)?;
        if children.is_empty() {
            out.push_str(")\n");
            return Ok(());
        }
        out.push('\n');
        for child in children {
            self.dump_into(child, indent + 2, out)?;
        }
        let _ = writeln!(out, "{:indent$})", "", indent = indent);
        Ok(())
    }

    /// JSON view of the subtree at `root`.
    pub fn to_json(&self, root: NodeId) -> Result<serde_json::Value, AstError> {
        let children = self
            .children(root)?
            .into_iter()
            .map(|child| self.to_json(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::json!({
            "type": self.node_type(root)?,
            "name": self.name(root)?,
            "value": self.value(root)?,
            "span": self.span(root)?,
            "incomplete": self.has_flag(root, node_flags::INCOMPLETE)?,
            "children": children,
        }))
    }
}
