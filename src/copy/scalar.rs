use arrow::array::{Array, AsArray};

use crate::copy::{write_validity, AppendContext};
use crate::error::ColumnDataError;
use crate::storage::VectorDataIndex;
use crate::types::PhysicalType;
use crate::vector::UnifiedColumn;

/// Copies fixed-width values byte for byte. Null rows are left zeroed.
pub(super) fn copy_scalar(
    ctx: &mut AppendContext<'_>,
    physical: PhysicalType,
    target: VectorDataIndex,
    source: &UnifiedColumn,
    source_offset: usize,
    count: usize,
) -> Result<(), ColumnDataError> {
    let capacity = ctx.segment.capacity();
    let width = physical.slot_width();
    let target_offset = ctx.segment.get_vector_data(target)?.count;
    let (handle, range) = ctx.segment.slot_location(ctx.state, target, physical)?;

    let mut guard = handle.write();
    let slot = &mut guard[range];
    let (values, bitmap) = slot.split_at_mut(width * capacity);
    write_validity(bitmap, capacity, target_offset, source, source_offset, count);
    let values = &mut values[target_offset * width..(target_offset + count) * width];

    if physical == PhysicalType::Bool {
        let booleans = source.values.as_boolean();
        for (row, out) in values.iter_mut().enumerate() {
            let index = source.selection.get_index(source_offset + row);
            *out = booleans.value(index) as u8;
        }
        return Ok(());
    }

    let data = source.values.to_data();
    let buffer = data.buffers().first().ok_or_else(|| {
        ColumnDataError::internal(format!("{:?} array without a value buffer", data.data_type()))
    })?;
    let raw = &buffer.as_slice()[data.offset() * width..];

    if source.selection.is_identity() && source.validity.is_all_valid() {
        let start = source_offset * width;
        values.copy_from_slice(&raw[start..start + count * width]);
        return Ok(());
    }

    for (row, out) in values.chunks_exact_mut(width).enumerate() {
        if !source.row_is_valid(source_offset + row) {
            continue;
        }
        let index = source.selection.get_index(source_offset + row);
        out.copy_from_slice(&raw[index * width..(index + 1) * width]);
    }
    Ok(())
}
