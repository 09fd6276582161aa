// In: src/storage/segment.rs

//! The addressing model of a buffer segment.
//!
//! A segment owns three things: its chunks, a pool of `VectorMetaData` records and
//! one string heap. Every reference between them is an index into one of the
//! segment's vectors, and every reference into memory is a `(block_id, offset)`
//! pair resolved through a `ChunkState`. Nothing stores an address.
//!
//! Nested storage is attached through `child_indices`:
//! - a struct slot points at `n` consecutive child entries, one per field;
//! - a list slot points at one child entry, the root of a chain of child slots
//!   linked through `next_data`. The list slot also remembers the chain tail and
//!   the running number of child values, so appends never walk the chain.

use std::ops::Range;
use std::sync::Arc;

use arrow::datatypes::DataType;
use hashbrown::HashSet;

use crate::error::ColumnDataError;
use crate::storage::allocator::{BlockHandle, BlockId, BufferAllocator, ChunkState};
use crate::storage::heap::StringHeap;
use crate::types::PhysicalType;

//==================================================================================
// 1. Indices and Metadata Records
//==================================================================================

/// Index of a record in a segment's vector-metadata pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDataIndex(pub u32);

/// Index into a segment's child-index array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildIndex(pub u32);

impl VectorDataIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ChildIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The physical descriptor of one stored vector instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMetaData {
    pub block_id: BlockId,
    pub offset: u32,
    /// Rows written so far; never exceeds the segment capacity.
    pub count: usize,
    /// Struct: first of the per-field child entries. List: the chain root entry.
    pub child_index: Option<ChildIndex>,
    /// The following slot of a list child chain.
    pub next_data: Option<VectorDataIndex>,
    /// List only: child values resident across the whole chain.
    pub child_total: usize,
    /// List only: the last slot of the child chain.
    pub child_tail: Option<VectorDataIndex>,
}

/// One row group: a root vector per top-level column and the blocks it touches.
#[derive(Debug, Clone, Default)]
pub struct ChunkMetaData {
    pub vector_data: Vec<VectorDataIndex>,
    pub block_ids: HashSet<BlockId>,
    pub count: usize,
}

//==================================================================================
// 2. The Segment
//==================================================================================

#[derive(Debug)]
pub struct Segment {
    allocator: Arc<BufferAllocator>,
    types: Vec<DataType>,
    capacity: usize,
    chunk_data: Vec<ChunkMetaData>,
    vector_data: Vec<VectorMetaData>,
    /// `None` marks an entry reserved but not yet assigned.
    child_indices: Vec<Option<VectorDataIndex>>,
    heap: StringHeap,
    count: usize,
}

impl Segment {
    pub fn new(allocator: Arc<BufferAllocator>, types: Vec<DataType>) -> Self {
        let capacity = allocator.vector_capacity();
        let heap = StringHeap::new(allocator.config().heap_page_size);
        Self {
            allocator,
            types,
            capacity,
            chunk_data: Vec::new(),
            vector_data: Vec::new(),
            child_indices: Vec::new(),
            heap,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_data.len()
    }

    pub fn chunk(&self, chunk_index: usize) -> Result<&ChunkMetaData, ColumnDataError> {
        self.chunk_data.get(chunk_index).ok_or_else(|| {
            ColumnDataError::internal(format!(
                "chunk {} out of range ({} chunks)",
                chunk_index,
                self.chunk_data.len()
            ))
        })
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn allocator(&self) -> &Arc<BufferAllocator> {
        &self.allocator
    }

    pub fn heap(&self) -> &StringHeap {
        &self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut StringHeap {
        &mut self.heap
    }

    /// Appends an empty chunk and allocates one root vector per top-level column.
    pub fn allocate_new_chunk(&mut self) -> Result<usize, ColumnDataError> {
        let chunk_index = self.chunk_data.len();
        self.chunk_data.push(ChunkMetaData::default());

        let vector_mark = self.vector_data.len();
        let child_mark = self.child_indices.len();

        let types = self.types.clone();
        let mut roots = Vec::with_capacity(types.len());
        for data_type in &types {
            match self.allocate_vector(data_type, chunk_index) {
                Ok(root) => roots.push(root),
                Err(e) => {
                    // Roll back so no half-built chunk stays visible.
                    self.chunk_data.truncate(chunk_index);
                    self.vector_data.truncate(vector_mark);
                    self.child_indices.truncate(child_mark);
                    return Err(e);
                }
            }
        }
        self.chunk_data[chunk_index].vector_data = roots;

        log::debug!("segment: allocated chunk {}", chunk_index);
        log_metric!("event" = "new_chunk", "chunk" = chunk_index, "columns" = types.len());
        Ok(chunk_index)
    }

    /// Allocates one vector slot for `data_type` and records its block in the chunk.
    ///
    /// Struct slots get their child slots allocated right away, one per field. List
    /// slots start without children; the chain is created by the first append that
    /// carries child values.
    pub fn allocate_vector(
        &mut self,
        data_type: &DataType,
        chunk_index: usize,
    ) -> Result<VectorDataIndex, ColumnDataError> {
        let physical = PhysicalType::from_arrow_type(data_type)?;
        let pointer = self.allocator.allocate(physical.slot_size(self.capacity))?;

        let index = VectorDataIndex(to_index(self.vector_data.len())?);
        self.vector_data.push(VectorMetaData {
            block_id: pointer.block_id,
            offset: pointer.offset,
            count: 0,
            child_index: None,
            next_data: None,
            child_total: 0,
            child_tail: None,
        });
        self.chunk_data
            .get_mut(chunk_index)
            .ok_or_else(|| ColumnDataError::internal(format!("chunk {} does not exist", chunk_index)))?
            .block_ids
            .insert(pointer.block_id);

        if let DataType::Struct(fields) = data_type {
            let base = self.reserve_children(fields.len())?;
            for (offset, field) in fields.iter().enumerate() {
                let child = self.allocate_vector(field.data_type(), chunk_index)?;
                self.set_child_index(base, offset, child)?;
            }
            self.get_vector_data_mut(index)?.child_index = Some(base);
        }
        Ok(index)
    }

    /// Reserves `n` consecutive, unassigned child entries and returns the first.
    pub fn reserve_children(&mut self, n: usize) -> Result<ChildIndex, ColumnDataError> {
        let base = ChildIndex(to_index(self.child_indices.len())?);
        self.child_indices.resize(self.child_indices.len() + n, None);
        Ok(base)
    }

    pub fn set_child_index(
        &mut self,
        base: ChildIndex,
        offset: usize,
        child: VectorDataIndex,
    ) -> Result<(), ColumnDataError> {
        let entry = self
            .child_indices
            .get_mut(base.index() + offset)
            .ok_or_else(|| ColumnDataError::internal("child entry was never reserved"))?;
        *entry = Some(child);
        Ok(())
    }

    /// The vector stored in child entry `base + offset`.
    pub fn get_child_index(
        &self,
        base: ChildIndex,
        offset: usize,
    ) -> Result<VectorDataIndex, ColumnDataError> {
        self.child_indices
            .get(base.index() + offset)
            .copied()
            .flatten()
            .ok_or_else(|| {
                ColumnDataError::internal(format!(
                    "child entry {}+{} is unassigned",
                    base.index(),
                    offset
                ))
            })
    }

    /// Appends a single child entry pointing at `child`.
    pub fn add_child_index(&mut self, child: VectorDataIndex) -> Result<ChildIndex, ColumnDataError> {
        let index = ChildIndex(to_index(self.child_indices.len())?);
        self.child_indices.push(Some(child));
        Ok(index)
    }

    pub fn get_vector_data(&self, index: VectorDataIndex) -> Result<&VectorMetaData, ColumnDataError> {
        self.vector_data
            .get(index.index())
            .ok_or_else(|| ColumnDataError::internal(format!("vector data {} out of range", index.0)))
    }

    pub fn get_vector_data_mut(
        &mut self,
        index: VectorDataIndex,
    ) -> Result<&mut VectorMetaData, ColumnDataError> {
        self.vector_data
            .get_mut(index.index())
            .ok_or_else(|| ColumnDataError::internal(format!("vector data {} out of range", index.0)))
    }

    /// Prepares `state` for work on `chunk_index`: handles for blocks the chunk does
    /// not touch are released, the ones it does are pinned.
    pub fn initialize_chunk_state(
        &self,
        chunk_index: usize,
        state: &mut ChunkState,
    ) -> Result<(), ColumnDataError> {
        let chunk = self.chunk(chunk_index)?;
        state.retain(|block_id| chunk.block_ids.contains(block_id));
        for block_id in &chunk.block_ids {
            state.resolve(&self.allocator, *block_id)?;
        }
        Ok(())
    }

    /// Resolves the bytes of one vector slot: the pinned block and the byte range of
    /// the slot inside it.
    pub(crate) fn slot_location(
        &self,
        state: &mut ChunkState,
        index: VectorDataIndex,
        physical: PhysicalType,
    ) -> Result<(BlockHandle, Range<usize>), ColumnDataError> {
        let meta = self.get_vector_data(index)?;
        let handle = state.resolve(&self.allocator, meta.block_id)?.clone();
        let start = meta.offset as usize;
        let range = start..start + physical.slot_size(self.capacity);
        if range.end > handle.len() {
            return Err(ColumnDataError::internal(format!(
                "slot {:?} exceeds block {} ({} bytes)",
                range,
                meta.block_id,
                handle.len()
            )));
        }
        Ok((handle, range))
    }

    /// Records `rows` appended rows in chunk `chunk_index`.
    pub(crate) fn finish_chunk_append(
        &mut self,
        chunk_index: usize,
        rows: usize,
    ) -> Result<(), ColumnDataError> {
        let capacity = self.capacity;
        let chunk = self
            .chunk_data
            .get_mut(chunk_index)
            .ok_or_else(|| ColumnDataError::internal(format!("chunk {} does not exist", chunk_index)))?;
        chunk.count += rows;
        if chunk.count > capacity {
            return Err(ColumnDataError::internal(format!(
                "chunk {} overflowed: {} rows for capacity {}",
                chunk_index, chunk.count, capacity
            )));
        }
        self.count += rows;
        Ok(())
    }

    //==============================================================================
    // Verification
    //==============================================================================

    /// Checks every count invariant of the segment.
    pub fn verify(&self) -> Result<(), ColumnDataError> {
        let mut total = 0;
        for (chunk_index, chunk) in self.chunk_data.iter().enumerate() {
            if chunk.count > self.capacity {
                return Err(ColumnDataError::internal(format!(
                    "chunk {} holds {} rows, capacity is {}",
                    chunk_index, chunk.count, self.capacity
                )));
            }
            if chunk.vector_data.len() != self.types.len() {
                return Err(ColumnDataError::internal(format!(
                    "chunk {} has {} root vectors for {} columns",
                    chunk_index,
                    chunk.vector_data.len(),
                    self.types.len()
                )));
            }
            for (root, data_type) in chunk.vector_data.iter().zip(&self.types) {
                self.verify_vector(*root, data_type, chunk.count)?;
            }
            total += chunk.count;
        }
        if total != self.count {
            return Err(ColumnDataError::internal(format!(
                "segment count {} does not match its chunks ({})",
                self.count, total
            )));
        }
        Ok(())
    }

    fn verify_vector(
        &self,
        index: VectorDataIndex,
        data_type: &DataType,
        expected: usize,
    ) -> Result<(), ColumnDataError> {
        let meta = self.get_vector_data(index)?;
        if meta.count != expected {
            return Err(ColumnDataError::internal(format!(
                "vector {} holds {} rows, expected {}",
                index.0, meta.count, expected
            )));
        }
        match data_type {
            DataType::Struct(fields) => {
                let base = meta
                    .child_index
                    .ok_or_else(|| ColumnDataError::internal("struct vector without children"))?;
                for (offset, field) in fields.iter().enumerate() {
                    let child = self.get_child_index(base, offset)?;
                    self.verify_vector(child, field.data_type(), expected)?;
                }
            }
            DataType::List(field) => {
                let mut resident = 0;
                let mut cursor = match meta.child_index {
                    Some(root) => Some(self.get_child_index(root, 0)?),
                    None => None,
                };
                while let Some(child) = cursor {
                    let child_meta = self.get_vector_data(child)?;
                    // Only the tail of the chain may be partially filled.
                    if child_meta.next_data.is_some() && child_meta.count != self.capacity {
                        return Err(ColumnDataError::internal(format!(
                            "list chain slot {} is not full but has a successor",
                            child.0
                        )));
                    }
                    self.verify_vector(child, field.data_type(), child_meta.count)?;
                    resident += child_meta.count;
                    cursor = child_meta.next_data;
                }
                if resident != meta.child_total {
                    return Err(ColumnDataError::internal(format!(
                        "list chain holds {} values but the running total is {}",
                        resident, meta.child_total
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn to_index(len: usize) -> Result<u32, ColumnDataError> {
    u32::try_from(len).map_err(|_| ColumnDataError::internal("segment index space exhausted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnDataConfig;
    use arrow::datatypes::{Field, Fields};

    fn segment(types: Vec<DataType>) -> Segment {
        let allocator = BufferAllocator::shared(ColumnDataConfig::with_vector_capacity(64)).unwrap();
        Segment::new(allocator, types)
    }

    #[test]
    fn test_allocate_new_chunk_creates_one_root_per_column() {
        let mut segment = segment(vec![DataType::Int32, DataType::Utf8]);
        let chunk = segment.allocate_new_chunk().unwrap();
        assert_eq!(chunk, 0);
        let meta = segment.chunk(0).unwrap();
        assert_eq!(meta.vector_data.len(), 2);
        assert_eq!(meta.count, 0);
        assert!(!meta.block_ids.is_empty());
    }

    #[test]
    fn test_struct_slots_allocate_children_eagerly() {
        let strct = DataType::Struct(Fields::from(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let mut segment = segment(vec![strct]);
        segment.allocate_new_chunk().unwrap();
        let root = segment.chunk(0).unwrap().vector_data[0];
        let base = segment.get_vector_data(root).unwrap().child_index.unwrap();
        let a = segment.get_child_index(base, 0).unwrap();
        let b = segment.get_child_index(base, 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, root);
    }

    #[test]
    fn test_list_slots_start_without_a_chain() {
        let list = DataType::List(Arc::new(Field::new("item", DataType::Int32, true)));
        let mut segment = segment(vec![list]);
        segment.allocate_new_chunk().unwrap();
        let root = segment.chunk(0).unwrap().vector_data[0];
        let meta = segment.get_vector_data(root).unwrap();
        assert!(meta.child_index.is_none());
        assert!(meta.child_tail.is_none());
        assert_eq!(meta.child_total, 0);
    }

    #[test]
    fn test_reserved_children_must_be_assigned_before_use() {
        let mut segment = segment(vec![DataType::Int32]);
        segment.allocate_new_chunk().unwrap();
        let base = segment.reserve_children(2).unwrap();
        assert!(segment.get_child_index(base, 1).is_err());
        let vector = segment.allocate_vector(&DataType::Int32, 0).unwrap();
        segment.set_child_index(base, 1, vector).unwrap();
        assert_eq!(segment.get_child_index(base, 1).unwrap(), vector);
        assert!(segment.set_child_index(base, 5, vector).is_err());
    }

    #[test]
    fn test_chunk_state_follows_the_chunk() {
        let allocator = BufferAllocator::shared(ColumnDataConfig {
            allocation_strategy: crate::config::AllocationStrategy::Dedicated,
            ..ColumnDataConfig::with_vector_capacity(64)
        })
        .unwrap();
        let mut segment = Segment::new(allocator, vec![DataType::Int32]);
        segment.allocate_new_chunk().unwrap();
        segment.allocate_new_chunk().unwrap();

        let mut state = ChunkState::new();
        segment.initialize_chunk_state(0, &mut state).unwrap();
        assert_eq!(state.pinned_blocks(), 1);
        segment.initialize_chunk_state(1, &mut state).unwrap();
        // The first chunk's block was released.
        assert_eq!(state.pinned_blocks(), 1);
        assert!(segment.initialize_chunk_state(2, &mut state).is_err());
    }

    #[test]
    fn test_verify_catches_count_drift() {
        let mut segment = segment(vec![DataType::Int32]);
        segment.allocate_new_chunk().unwrap();
        assert!(segment.verify().is_ok());
        segment.count = 3;
        assert!(segment.verify().is_err());
    }

    #[test]
    fn test_unsupported_type_is_rejected_at_allocation() {
        let mut segment = segment(vec![DataType::LargeUtf8]);
        assert!(matches!(
            segment.allocate_new_chunk(),
            Err(ColumnDataError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_failed_chunk_allocation_leaves_no_partial_chunk() {
        let mut segment = segment(vec![DataType::Int32, DataType::LargeUtf8]);
        assert!(segment.allocate_new_chunk().is_err());
        assert_eq!(segment.chunk_count(), 0);
        assert!(segment.vector_data.is_empty());
        assert!(segment.child_indices.is_empty());
        assert!(segment.verify().is_ok());
    }
}
