use arrow::array::{Array, AsArray};
use arrow::datatypes::DataType;

use crate::copy::{write_validity, AppendContext};
use crate::error::ColumnDataError;
use crate::storage::heap::write_string_slot;
use crate::storage::VectorDataIndex;
use crate::types::{PhysicalType, STRING_SLOT_WIDTH};
use crate::vector::UnifiedColumn;

/// Copies strings and binary values into 16-byte slots, spilling long values to
/// the segment heap.
pub(super) fn copy_varlen(
    ctx: &mut AppendContext<'_>,
    target: VectorDataIndex,
    source: &UnifiedColumn,
    source_offset: usize,
    count: usize,
) -> Result<(), ColumnDataError> {
    let (offsets, data): (&[i32], &[u8]) = match source.values.data_type() {
        DataType::Utf8 => {
            let strings = source.values.as_string::<i32>();
            (strings.value_offsets(), strings.value_data())
        }
        DataType::Binary => {
            let binary = source.values.as_binary::<i32>();
            (binary.value_offsets(), binary.value_data())
        }
        other => {
            return Err(ColumnDataError::internal(format!(
                "variable-length copy of {:?}",
                other
            )))
        }
    };

    let capacity = ctx.segment.capacity();
    let target_offset = ctx.segment.get_vector_data(target)?.count;
    let (handle, range) = ctx.segment.slot_location(ctx.state, target, PhysicalType::Varchar)?;

    let mut guard = handle.write();
    let slot = &mut guard[range];
    let (values, bitmap) = slot.split_at_mut(STRING_SLOT_WIDTH * capacity);
    write_validity(bitmap, capacity, target_offset, source, source_offset, count);

    let heap = ctx.segment.heap_mut();
    let rows = values[target_offset * STRING_SLOT_WIDTH..(target_offset + count) * STRING_SLOT_WIDTH]
        .chunks_exact_mut(STRING_SLOT_WIDTH);
    for (row, out) in rows.enumerate() {
        if !source.row_is_valid(source_offset + row) {
            continue;
        }
        let index = source.selection.get_index(source_offset + row);
        let value = &data[offsets[index] as usize..offsets[index + 1] as usize];
        write_string_slot(out, value, heap)?;
    }
    Ok(())
}
