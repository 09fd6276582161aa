// In: src/copy/list.rs

//! List append.
//!
//! The child values of the appended rows are gathered into one compact run (in row
//! order, skipping null lists) and appended to the list slot's child chain. Each
//! list entry then records `(resident_before + start_in_run, length)`, where
//! `resident_before` is the chain's running total before this call. Entries
//! therefore always describe consecutive, non-overlapping runs of the flattened
//! child storage, however many calls or chained slots contributed to it.

use arrow::array::AsArray;

use crate::copy::{write_validity, AppendContext, CopyFunction};
use crate::error::ColumnDataError;
use crate::storage::VectorDataIndex;
use crate::types::{PhysicalType, LIST_ENTRY_WIDTH};
use crate::vector::UnifiedColumn;

pub(super) fn copy_list(
    ctx: &mut AppendContext<'_>,
    child_function: &CopyFunction,
    target: VectorDataIndex,
    source: &UnifiedColumn,
    source_offset: usize,
    count: usize,
) -> Result<(), ColumnDataError> {
    let list = source.values.as_list::<i32>();
    let value_offsets = list.value_offsets();
    let child_source = source
        .children
        .first()
        .ok_or_else(|| ColumnDataError::internal("flattened list without a child column"))?;

    // 1. Gather the child rows and the entry of every appended list.
    let mut child_rows: Vec<u32> = Vec::new();
    let mut entries: Vec<(usize, usize)> = Vec::with_capacity(count);
    for row in 0..count {
        let start_in_run = child_rows.len();
        if !source.row_is_valid(source_offset + row) {
            entries.push((start_in_run, 0));
            continue;
        }
        let index = source.selection.get_index(source_offset + row);
        let start = value_offsets[index] as u32;
        let end = value_offsets[index + 1] as u32;
        child_rows.extend(start..end);
        entries.push((start_in_run, (end - start) as usize));
    }

    // 2. Append the child run to the chain.
    let resident_before = ctx.segment.get_vector_data(target)?.child_total;
    if !child_rows.is_empty() {
        let child_run = child_source.reselect(&child_rows);
        append_to_chain(ctx, child_function, target, &child_run, child_rows.len())?;
    }

    // 3. Write the entries and validity of the list slot itself.
    let capacity = ctx.segment.capacity();
    let target_offset = ctx.segment.get_vector_data(target)?.count;
    let (handle, range) = ctx.segment.slot_location(ctx.state, target, PhysicalType::List)?;
    let mut guard = handle.write();
    let slot = &mut guard[range];
    let (values, bitmap) = slot.split_at_mut(LIST_ENTRY_WIDTH * capacity);
    write_validity(bitmap, capacity, target_offset, source, source_offset, count);

    let slots = values[target_offset * LIST_ENTRY_WIDTH..(target_offset + count) * LIST_ENTRY_WIDTH]
        .chunks_exact_mut(LIST_ENTRY_WIDTH);
    for (out, (start_in_run, length)) in slots.zip(entries) {
        let offset = (resident_before + start_in_run) as u64;
        out[..8].copy_from_slice(&offset.to_le_bytes());
        out[8..].copy_from_slice(&(length as u64).to_le_bytes());
    }
    Ok(())
}

/// Appends `total` rows of `child_run` to the child chain of list slot `list`,
/// creating the chain root on first use and linking a new slot whenever the tail
/// is full.
fn append_to_chain(
    ctx: &mut AppendContext<'_>,
    child_function: &CopyFunction,
    list: VectorDataIndex,
    child_run: &UnifiedColumn,
    total: usize,
) -> Result<(), ColumnDataError> {
    let capacity = ctx.segment.capacity();
    let mut current = match ctx.segment.get_vector_data(list)?.child_tail {
        Some(tail) => tail,
        None => {
            let root = ctx
                .segment
                .allocate_vector(child_function.data_type(), ctx.chunk_index)?;
            let root_entry = ctx.segment.add_child_index(root)?;
            let meta = ctx.segment.get_vector_data_mut(list)?;
            meta.child_index = Some(root_entry);
            meta.child_tail = Some(root);
            root
        }
    };

    let mut copied = 0;
    while copied < total {
        let resident = ctx.segment.get_vector_data(current)?.count;
        if resident == capacity {
            let next = ctx
                .segment
                .allocate_vector(child_function.data_type(), ctx.chunk_index)?;
            ctx.segment.get_vector_data_mut(current)?.next_data = Some(next);
            ctx.segment.get_vector_data_mut(list)?.child_tail = Some(next);
            log::trace!("list chain extended with slot {}", next.0);
            current = next;
            continue;
        }
        let run = (capacity - resident).min(total - copied);
        child_function.copy(ctx, current, child_run, copied, run)?;
        copied += run;
    }

    ctx.segment.get_vector_data_mut(list)?.child_total += total;
    Ok(())
}
