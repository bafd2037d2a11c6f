//! Bump arena backing node records and interned strings.
//!
//! The arena hands out `ArenaOffset`s into one logical address space made of
//! one or more chunks. Nothing is freed individually: `reset` drops every
//! chunk at once and starts a new epoch, so handles that remember the epoch
//! they were issued in can be recognised as stale.

use crate::limits;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::{debug, trace};

/// Epochs are unique across every arena in the process, so a handle from one
/// arena never validates against another.
static NEXT_EPOCH: AtomicU32 = AtomicU32::new(1);

fn next_epoch() -> u32 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// Offset of an allocation in the arena's address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArenaOffset(pub u32);

impl ArenaOffset {
    /// Get the raw offset value.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Sizing of an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Size of each chunk in bytes. Larger requests get a dedicated chunk.
    pub chunk_size: usize,
    /// Hard ceiling on the bytes reserved across all chunks.
    pub capacity: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            chunk_size: limits::DEFAULT_ARENA_CHUNK_SIZE,
            capacity: limits::DEFAULT_ARENA_CAPACITY,
        }
    }
}

impl ArenaConfig {
    /// Default chunking with a custom capacity ceiling.
    pub fn with_capacity(capacity: usize) -> Self {
        ArenaConfig {
            capacity,
            ..ArenaConfig::default()
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    #[error(
        "arena out of memory: requested {requested} bytes, {available} of {capacity} bytes left"
    )]
    OutOfMemory {
        requested: usize,
        available: usize,
        capacity: usize,
    },
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),
}

#[derive(Debug)]
struct Chunk {
    base: u32,
    data: Vec<u8>,
    used: usize,
}

impl Chunk {
    /// Local offset where `size` bytes aligned to `align` fit, if any.
    fn fit(&self, size: usize, align: usize) -> Option<usize> {
        let global = self.base as usize + self.used;
        let aligned = global.checked_add(align - 1)? & !(align - 1);
        let local = aligned - self.base as usize;
        let end = local.checked_add(size)?;
        (end <= self.data.len()).then_some(local)
    }
}

/// Chunked bump allocator.
///
/// Offsets are global: chunk `n` starts where chunk `n - 1` ends, so two
/// allocations never share a byte range.
#[derive(Debug)]
pub struct Arena {
    chunks: Vec<Chunk>,
    config: ArenaConfig,
    /// Bytes reserved by chunks (including unused tails)
    reserved: usize,
    /// Bytes handed out by `allocate`
    allocated: usize,
    epoch: u32,
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new(ArenaConfig::default())
    }
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Arena {
        let config = ArenaConfig {
            chunk_size: config.chunk_size.max(1),
            capacity: config.capacity.min(u32::MAX as usize),
        };
        Arena {
            chunks: Vec::new(),
            config,
            reserved: 0,
            allocated: 0,
            epoch: next_epoch(),
        }
    }

    /// Bump-allocate `size` bytes aligned to `align`.
    ///
    /// Grows by a new chunk when the current one is exhausted and fails only
    /// when the capacity ceiling would be exceeded.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<ArenaOffset, ArenaError> {
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(align));
        }

        if let Some(chunk) = self.chunks.last_mut() {
            if let Some(local) = chunk.fit(size, align) {
                chunk.used = local + size;
                self.allocated += size;
                return Ok(ArenaOffset(chunk.base + local as u32));
            }
        }

        self.grow(size, align)?;
        let chunk = self
            .chunks
            .last_mut()
            .ok_or(ArenaError::OutOfMemory {
                requested: size,
                available: 0,
                capacity: self.config.capacity,
            })?;
        let local = chunk.fit(size, align).ok_or(ArenaError::OutOfMemory {
            requested: size,
            available: self.config.capacity - self.reserved,
            capacity: self.config.capacity,
        })?;
        chunk.used = local + size;
        self.allocated += size;
        Ok(ArenaOffset(chunk.base + local as u32))
    }

    fn grow(&mut self, size: usize, align: usize) -> Result<(), ArenaError> {
        let base = self
            .chunks
            .last()
            .map(|c| c.base as usize + c.data.len())
            .unwrap_or(0);
        let padding = (align - base % align) % align;
        let needed = size.saturating_add(padding);
        let available = self.config.capacity - self.reserved;
        if needed > available {
            debug!(
                requested = size,
                available,
                capacity = self.config.capacity,
                "arena capacity exhausted"
            );
            return Err(ArenaError::OutOfMemory {
                requested: size,
                available,
                capacity: self.config.capacity,
            });
        }

        let len = needed.max(self.config.chunk_size).min(available);
        trace!(base, len, "arena chunk added");
        self.chunks.push(Chunk {
            base: base as u32,
            data: vec![0; len],
            used: 0,
        });
        self.reserved += len;
        Ok(())
    }

    fn locate(&self, offset: ArenaOffset) -> Option<(usize, usize)> {
        let idx = self.chunks.partition_point(|c| c.base <= offset.0);
        if idx == 0 {
            return None;
        }
        let chunk = &self.chunks[idx - 1];
        Some((idx - 1, (offset.0 - chunk.base) as usize))
    }

    /// Borrow `len` allocated bytes starting at `offset`.
    pub fn bytes(&self, offset: ArenaOffset, len: usize) -> Option<&[u8]> {
        let (idx, local) = self.locate(offset)?;
        let chunk = &self.chunks[idx];
        let end = local.checked_add(len)?;
        if end > chunk.used {
            return None;
        }
        chunk.data.get(local..end)
    }

    /// Mutably borrow `len` allocated bytes starting at `offset`.
    pub fn bytes_mut(&mut self, offset: ArenaOffset, len: usize) -> Option<&mut [u8]> {
        let (idx, local) = self.locate(offset)?;
        let chunk = &mut self.chunks[idx];
        let end = local.checked_add(len)?;
        if end > chunk.used {
            return None;
        }
        chunk.data.get_mut(local..end)
    }

    /// Copy `src` into previously allocated bytes.
    pub fn write(&mut self, offset: ArenaOffset, src: &[u8]) -> Option<()> {
        self.bytes_mut(offset, src.len())?.copy_from_slice(src);
        Some(())
    }

    #[inline]
    pub fn read_u32(&self, offset: ArenaOffset) -> Option<u32> {
        let bytes = self.bytes(offset, 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    #[inline]
    pub fn write_u32(&mut self, offset: ArenaOffset, value: u32) -> Option<()> {
        self.write(offset, &value.to_le_bytes())
    }

    /// Allocate and fill in one step.
    pub fn alloc_bytes(&mut self, src: &[u8], align: usize) -> Result<ArenaOffset, ArenaError> {
        let offset = self.allocate(src.len(), align)?;
        // Freshly allocated range, always in bounds.
        let _ = self.write(offset, src);
        Ok(offset)
    }

    /// Drop every chunk. All previously issued offsets become invalid.
    pub fn reset(&mut self) {
        debug!(
            allocated = self.allocated,
            reserved = self.reserved,
            "arena reset"
        );
        self.chunks.clear();
        self.reserved = 0;
        self.allocated = 0;
        self.epoch = next_epoch();
    }

    /// Identifier of the current arena life; changes on every `reset`.
    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    pub fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn config(&self) -> ArenaConfig {
        self.config
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }
}
