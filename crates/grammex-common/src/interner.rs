//! String interner backed by the arena.
//!
//! Interned bytes are copied once into the `Arena`; everything else passes
//! around `StringId`s (a u32). Equal content always maps to the same id for
//! the life of the arena, so comparisons become integer comparisons.

use crate::arena::{Arena, ArenaError, ArenaOffset};
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::hash::Hasher;

/// An interned byte string.
///
/// Ids are cheap to copy and compare. To get the bytes back, use
/// `StringInterner::resolve` with the arena the id was interned into.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, PartialOrd, Ord,
)]
pub struct StringId(pub u32);

impl StringId {
    /// The pre-interned empty string.
    pub const EMPTY: StringId = StringId(0);

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the raw index value.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    offset: ArenaOffset,
    len: u32,
}

/// Content-addressed interner.
///
/// Buckets are keyed by the FxHash of the bytes; collisions are resolved by
/// comparing against the arena-resident copies.
#[derive(Debug)]
pub struct StringInterner {
    buckets: FxHashMap<u64, SmallVec<[StringId; 1]>>,
    /// Index 0 is the empty string and never touches the arena
    entries: Vec<Entry>,
}

impl Default for StringInterner {
    fn default() -> Self {
        StringInterner::new()
    }
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            buckets: FxHashMap::default(),
            entries: vec![Entry {
                offset: ArenaOffset(0),
                len: 0,
            }],
        }
    }

    /// Intern `bytes`, copying them into `arena` the first time they are seen.
    pub fn intern(&mut self, arena: &mut Arena, bytes: &[u8]) -> Result<StringId, ArenaError> {
        if bytes.is_empty() {
            return Ok(StringId::EMPTY);
        }
        let hash = hash_bytes(bytes);
        if let Some(id) = self.find(arena, hash, bytes) {
            return Ok(id);
        }

        let offset = arena.alloc_bytes(bytes, 1)?;
        let id = StringId(self.entries.len() as u32);
        self.entries.push(Entry {
            offset,
            len: bytes.len() as u32,
        });
        self.buckets.entry(hash).or_default().push(id);
        Ok(id)
    }

    #[inline]
    pub fn intern_str(&mut self, arena: &mut Arena, s: &str) -> Result<StringId, ArenaError> {
        self.intern(arena, s.as_bytes())
    }

    /// Look up `bytes` without interning them.
    pub fn lookup(&self, arena: &Arena, bytes: &[u8]) -> Option<StringId> {
        if bytes.is_empty() {
            return Some(StringId::EMPTY);
        }
        self.find(arena, hash_bytes(bytes), bytes)
    }

    fn find(&self, arena: &Arena, hash: u64, bytes: &[u8]) -> Option<StringId> {
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&id| self.resolve(arena, id) == Some(bytes))
    }

    /// Borrow the interned bytes straight out of arena memory.
    #[inline]
    pub fn resolve<'a>(&self, arena: &'a Arena, id: StringId) -> Option<&'a [u8]> {
        if id.is_empty() {
            return Some(&[]);
        }
        let entry = self.entries.get(id.0 as usize)?;
        arena.bytes(entry.offset, entry.len as usize)
    }

    /// Resolve as UTF-8. Returns `None` for invalid ids or non-UTF-8 content.
    #[inline]
    pub fn resolve_str<'a>(&self, arena: &'a Arena, id: StringId) -> Option<&'a str> {
        std::str::from_utf8(self.resolve(arena, id)?).ok()
    }

    /// Number of interned strings, including the empty string.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if only the empty string is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Forget every entry. Call together with `Arena::reset`.
    pub fn reset(&mut self) {
        self.buckets.clear();
        self.entries.truncate(1);
    }
}
