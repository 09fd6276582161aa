use crate::copy::{write_validity, AppendContext, CopyFunction};
use crate::error::ColumnDataError;
use crate::storage::VectorDataIndex;
use crate::types::PhysicalType;
use crate::vector::UnifiedColumn;

/// Writes the struct's own validity, then runs every field's copy function over the
/// same rows so all children advance in lockstep with the parent.
pub(super) fn copy_struct(
    ctx: &mut AppendContext<'_>,
    children: &[CopyFunction],
    target: VectorDataIndex,
    source: &UnifiedColumn,
    source_offset: usize,
    count: usize,
) -> Result<(), ColumnDataError> {
    let capacity = ctx.segment.capacity();
    let meta = ctx.segment.get_vector_data(target)?;
    let target_offset = meta.count;
    let base = meta
        .child_index
        .ok_or_else(|| ColumnDataError::internal("struct vector without children"))?;

    {
        let (handle, range) = ctx.segment.slot_location(ctx.state, target, PhysicalType::Struct)?;
        let mut guard = handle.write();
        write_validity(&mut guard[range], capacity, target_offset, source, source_offset, count);
    }

    if source.children.len() != children.len() {
        return Err(ColumnDataError::internal(format!(
            "struct with {} fields flattened into {} children",
            children.len(),
            source.children.len()
        )));
    }
    for (offset, (function, child_source)) in children.iter().zip(&source.children).enumerate() {
        let child = ctx.segment.get_child_index(base, offset)?;
        function.copy(ctx, child, child_source, source_offset, count)?;
    }
    Ok(())
}
