//! The block allocator that backs every vector slot.
//!
//! Memory is handed out as `(block_id, offset)` pairs, never as raw addresses.
//! Blocks are reference counted and guarded by their own read/write lock, so any
//! number of scans can resolve and read distinct (or identical) blocks in parallel
//! while the single append stream writes into the slots it owns. Blocks are only
//! reclaimed when the allocator itself is dropped, i.e. when the last collection
//! or segment sharing it goes away.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{AllocationStrategy, ColumnDataConfig};
use crate::error::ColumnDataError;

/// Identifier of one allocator block.
pub type BlockId = u32;

/// Allocations are aligned to this many bytes inside a block.
const ALLOCATION_ALIGNMENT: usize = 8;

/// A location inside the allocator: which block, and the byte offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPointer {
    pub block_id: BlockId,
    pub offset: u32,
}

//==================================================================================
// 1. Block Handles
//==================================================================================

/// A pinned reference to one block. Cloning is cheap (an `Arc` clone); the bytes
/// themselves are only reachable through the short-lived guards below.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    data: Arc<RwLock<Box<[u8]>>>,
}

impl BlockHandle {
    fn new(size: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(vec![0u8; size].into_boxed_slice())),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//==================================================================================
// 2. The Allocator
//==================================================================================

#[derive(Debug, Default)]
struct AllocatorState {
    blocks: Vec<BlockHandle>,
    /// Bytes already handed out from the last block (blocked strategy only).
    tail_used: usize,
    /// Capacity of the last block.
    tail_capacity: usize,
    allocated_bytes: usize,
}

/// Shared, thread-safe source of fixed-capacity memory blocks.
#[derive(Debug)]
pub struct BufferAllocator {
    config: ColumnDataConfig,
    state: RwLock<AllocatorState>,
}

impl BufferAllocator {
    /// Creates an allocator after validating `config`.
    pub fn new(config: ColumnDataConfig) -> Result<Self, ColumnDataError> {
        config.validate()?;
        Ok(Self {
            config,
            state: RwLock::new(AllocatorState::default()),
        })
    }

    /// Creates an allocator already wrapped for sharing between collections.
    pub fn shared(config: ColumnDataConfig) -> Result<Arc<Self>, ColumnDataError> {
        Ok(Arc::new(Self::new(config)?))
    }

    pub fn config(&self) -> &ColumnDataConfig {
        &self.config
    }

    /// Rows per vector slot for every segment built on this allocator.
    pub fn vector_capacity(&self) -> usize {
        self.config.vector_capacity
    }

    /// Reserves `size` zero-initialized bytes and returns where they live.
    pub fn allocate(&self, size: usize) -> Result<BlockPointer, ColumnDataError> {
        let mut state = self.state.write();
        let aligned = size.next_multiple_of(ALLOCATION_ALIGNMENT);

        let needs_new_block = match self.config.allocation_strategy {
            AllocationStrategy::Dedicated => true,
            AllocationStrategy::Blocked => {
                state.blocks.is_empty() || state.tail_used + aligned > state.tail_capacity
            }
        };

        if needs_new_block {
            let block_size = match self.config.allocation_strategy {
                AllocationStrategy::Dedicated => aligned.max(ALLOCATION_ALIGNMENT),
                AllocationStrategy::Blocked => self.config.block_size.max(aligned),
            };
            if state.blocks.len() >= BlockId::MAX as usize {
                return Err(ColumnDataError::internal("allocator ran out of block ids"));
            }
            state.blocks.push(BlockHandle::new(block_size));
            state.tail_used = 0;
            state.tail_capacity = block_size;
            log::debug!(
                "allocator: new block {} of {} bytes",
                state.blocks.len() - 1,
                block_size
            );
        }

        let block_id = (state.blocks.len() - 1) as BlockId;
        let offset = u32::try_from(state.tail_used).map_err(|_| {
            ColumnDataError::internal(format!("block offset {} overflows u32", state.tail_used))
        })?;
        state.tail_used += aligned;
        state.allocated_bytes += aligned;
        log_metric!("event" = "allocate", "block" = block_id, "offset" = offset, "size" = aligned);

        Ok(BlockPointer { block_id, offset })
    }

    /// Resolves a block id to a pinned handle. Takes only the read side of the lock,
    /// so concurrent scans never serialize on each other here.
    pub fn pin(&self, block_id: BlockId) -> Result<BlockHandle, ColumnDataError> {
        self.state
            .read()
            .blocks
            .get(block_id as usize)
            .cloned()
            .ok_or_else(|| ColumnDataError::internal(format!("unknown block id {}", block_id)))
    }

    pub fn block_count(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Total bytes handed out (including alignment padding).
    pub fn allocated_bytes(&self) -> usize {
        self.state.read().allocated_bytes
    }
}

//==================================================================================
// 3. Scoped Block Access
//==================================================================================

/// The set of blocks pinned for one append or scan call sequence.
///
/// Only block handles are kept here, never byte addresses: every read or write
/// takes a guard from a handle for the duration of a single copy or decode step.
#[derive(Debug, Default)]
pub struct ChunkState {
    handles: HashMap<BlockId, BlockHandle>,
}

impl ChunkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every pinned handle.
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Drops the handles for blocks not in `keep`.
    pub(crate) fn retain<F: Fn(&BlockId) -> bool>(&mut self, keep: F) {
        self.handles.retain(|block_id, _| keep(block_id));
    }

    /// Returns the handle for `block_id`, pinning it through `allocator` on first use.
    pub fn resolve(
        &mut self,
        allocator: &BufferAllocator,
        block_id: BlockId,
    ) -> Result<&BlockHandle, ColumnDataError> {
        if !self.handles.contains_key(&block_id) {
            let handle = allocator.pin(block_id)?;
            self.handles.insert(block_id, handle);
        }
        self.handles
            .get(&block_id)
            .ok_or_else(|| ColumnDataError::internal("block handle vanished after pinning"))
    }

    pub fn pinned_blocks(&self) -> usize {
        self.handles.len()
    }
}

//==================================================================================
// 4. Unit Tests
//==================================================================================
