// In: src/storage/reader.rs

//! Materializes stored chunks back into Arrow arrays.
//!
//! Every reader copies bytes out of the block under a short read guard and builds
//! owned Arrow buffers from them, so a returned batch never borrows segment memory.
//! Guards are released before recursing into child storage.

use std::sync::Arc;

use arrow::array::{
    make_array, new_empty_array, Array, ArrayData, ArrayRef, BooleanArray, ListArray, StructArray,
};
use arrow::buffer::{BooleanBuffer, Buffer, NullBuffer, OffsetBuffer};
use arrow::compute::concat;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::ColumnDataError;
use crate::null_handling::ValidityMask;
use crate::storage::allocator::ChunkState;
use crate::storage::heap::read_string_slot;
use crate::storage::segment::{Segment, VectorDataIndex};
use crate::types::{PhysicalType, LIST_ENTRY_WIDTH, STRING_SLOT_WIDTH};

impl Segment {
    /// Reads every column of chunk `chunk_index` into a new batch of `schema`.
    pub fn read_chunk(
        &self,
        chunk_index: usize,
        state: &mut ChunkState,
        schema: &SchemaRef,
    ) -> Result<RecordBatch, ColumnDataError> {
        self.initialize_chunk_state(chunk_index, state)?;
        let chunk = self.chunk(chunk_index)?;

        let columns = schema
            .fields()
            .iter()
            .zip(&chunk.vector_data)
            .map(|(field, index)| self.read_vector(state, *index, field.data_type()))
            .collect::<Result<Vec<_>, _>>()?;

        let options = RecordBatchOptions::new().with_row_count(Some(chunk.count));
        Ok(RecordBatch::try_new_with_options(
            schema.clone(),
            columns,
            &options,
        )?)
    }

    fn read_vector(
        &self,
        state: &mut ChunkState,
        index: VectorDataIndex,
        data_type: &DataType,
    ) -> Result<ArrayRef, ColumnDataError> {
        let physical = PhysicalType::from_arrow_type(data_type)?;
        match physical {
            PhysicalType::Varchar => self.read_varchar(state, index, data_type),
            PhysicalType::List => self.read_list(state, index, data_type),
            PhysicalType::Struct => self.read_struct(state, index, data_type),
            PhysicalType::Bool => {
                let (values, nulls) = self.read_fixed(state, index, physical)?;
                let bits = BooleanBuffer::from_iter(values.as_slice().iter().map(|byte| *byte != 0));
                Ok(Arc::new(BooleanArray::new(bits, nulls)))
            }
            _ => {
                let (values, nulls) = self.read_fixed(state, index, physical)?;
                let count = values.len() / physical.slot_width();
                let data = ArrayData::builder(data_type.clone())
                    .len(count)
                    .add_buffer(values)
                    .nulls(nulls)
                    .build()?;
                Ok(make_array(data))
            }
        }
    }

    /// Copies the first `count * width` value bytes and the validity of a slot. The
    /// copy lands in an aligned Arrow buffer.
    fn read_fixed(
        &self,
        state: &mut ChunkState,
        index: VectorDataIndex,
        physical: PhysicalType,
    ) -> Result<(Buffer, Option<NullBuffer>), ColumnDataError> {
        let count = self.get_vector_data(index)?.count;
        let width = physical.slot_width();
        let (handle, range) = self.slot_location(state, index, physical)?;
        let guard = handle.read();
        let slot = &guard[range];
        let (values, validity) = slot.split_at(width * self.capacity());
        let nulls = ValidityMask::from_bitmap_bytes(validity, count).to_null_buffer(count);
        Ok((Buffer::from_slice_ref(&values[..count * width]), nulls))
    }

    fn read_varchar(
        &self,
        state: &mut ChunkState,
        index: VectorDataIndex,
        data_type: &DataType,
    ) -> Result<ArrayRef, ColumnDataError> {
        let count = self.get_vector_data(index)?.count;
        let (handle, range) = self.slot_location(state, index, PhysicalType::Varchar)?;
        let guard = handle.read();
        let slot = &guard[range];
        let (values, validity) = slot.split_at(STRING_SLOT_WIDTH * self.capacity());
        let mask = ValidityMask::from_bitmap_bytes(validity, count);

        let mut offsets = Vec::with_capacity(count + 1);
        let mut bytes = Vec::new();
        offsets.push(0i32);
        for row in 0..count {
            if mask.row_is_valid(row) {
                let start = row * STRING_SLOT_WIDTH;
                let value = read_string_slot(&values[start..start + STRING_SLOT_WIDTH], self.heap())?;
                bytes.extend_from_slice(value);
            }
            let end = i32::try_from(bytes.len()).map_err(|_| {
                ColumnDataError::internal("string chunk exceeds i32 offsets")
            })?;
            offsets.push(end);
        }
        drop(guard);

        let data = ArrayData::builder(data_type.clone())
            .len(count)
            .add_buffer(Buffer::from_vec(offsets))
            .add_buffer(Buffer::from_vec(bytes))
            .nulls(mask.to_null_buffer(count))
            .build()?;
        Ok(make_array(data))
    }

    fn read_list(
        &self,
        state: &mut ChunkState,
        index: VectorDataIndex,
        data_type: &DataType,
    ) -> Result<ArrayRef, ColumnDataError> {
        let DataType::List(field) = data_type else {
            return Err(ColumnDataError::internal(format!(
                "list reader called for {:?}",
                data_type
            )));
        };
        let meta = self.get_vector_data(index)?.clone();
        let count = meta.count;

        // Entries and validity first; the guard is gone before the chain is read.
        let (lengths, nulls) = {
            let (handle, range) = self.slot_location(state, index, PhysicalType::List)?;
            let guard = handle.read();
            let slot = &guard[range];
            let (entries, validity) = slot.split_at(LIST_ENTRY_WIDTH * self.capacity());
            let nulls = ValidityMask::from_bitmap_bytes(validity, count).to_null_buffer(count);

            let mut lengths = Vec::with_capacity(count);
            let mut expected_offset = 0u64;
            for entry in entries[..count * LIST_ENTRY_WIDTH].chunks_exact(LIST_ENTRY_WIDTH) {
                let offset = bytemuck::pod_read_unaligned::<u64>(&entry[..8]);
                let length = bytemuck::pod_read_unaligned::<u64>(&entry[8..]);
                if offset != expected_offset {
                    return Err(ColumnDataError::internal(format!(
                        "list entry starts at {} but the previous entry ended at {}",
                        offset, expected_offset
                    )));
                }
                expected_offset += length;
                lengths.push(length as usize);
            }
            (lengths, nulls)
        };

        let mut parts = Vec::new();
        let mut cursor = match meta.child_index {
            Some(root) => Some(self.get_child_index(root, 0)?),
            None => None,
        };
        while let Some(child) = cursor {
            parts.push(self.read_vector(state, child, field.data_type())?);
            cursor = self.get_vector_data(child)?.next_data;
        }
        let values = match parts.len() {
            0 => new_empty_array(field.data_type()),
            1 => parts.remove(0),
            _ => {
                let refs: Vec<&dyn Array> = parts.iter().map(|part| part.as_ref()).collect();
                concat(&refs)?
            }
        };

        let total: usize = lengths.iter().sum();
        if total != values.len() || total > i32::MAX as usize {
            return Err(ColumnDataError::internal(format!(
                "list entries cover {} child values, chain holds {}",
                total,
                values.len()
            )));
        }
        let offsets = OffsetBuffer::<i32>::from_lengths(lengths);
        Ok(Arc::new(ListArray::try_new(field.clone(), offsets, values, nulls)?))
    }

    fn read_struct(
        &self,
        state: &mut ChunkState,
        index: VectorDataIndex,
        data_type: &DataType,
    ) -> Result<ArrayRef, ColumnDataError> {
        let DataType::Struct(fields) = data_type else {
            return Err(ColumnDataError::internal(format!(
                "struct reader called for {:?}",
                data_type
            )));
        };
        let (_, nulls) = self.read_fixed(state, index, PhysicalType::Struct)?;
        let base = self
            .get_vector_data(index)?
            .child_index
            .ok_or_else(|| ColumnDataError::internal("struct vector without children"))?;

        let children = fields
            .iter()
            .enumerate()
            .map(|(offset, field)| {
                let child = self.get_child_index(base, offset)?;
                self.read_vector(state, child, field.data_type())
            })
            .collect::<Result<Vec<_>, ColumnDataError>>()?;
        Ok(Arc::new(StructArray::try_new(fields.clone(), children, nulls)?))
    }
}
