// In: src/copy/mod.rs

//! The copy-function table.
//!
//! A `CopyFunction` is built once per column from its Arrow type and mirrors the
//! type's nesting: lists own the copy function of their item type, structs one per
//! field. Appending a run of rows is a single `copy` call on the column's function;
//! all per-type dispatch happens once per call, never per value.
//!
//! Every call writes `count` rows at the target slot's current count and advances
//! it. The caller guarantees the run fits in the slot; list children are the one
//! exception and spill into chained slots instead.

mod list;
mod scalar;
mod strct;
mod varlen;


use arrow::datatypes::DataType;
use bitvec::prelude::*;

use crate::error::ColumnDataError;
use crate::storage::{ChunkState, Segment, VectorDataIndex};
use crate::types::{validity_bytes, PhysicalType};
use crate::vector::UnifiedColumn;

/// Everything a copy function may touch while appending into one chunk.
pub struct AppendContext<'a> {
    pub segment: &'a mut Segment,
    pub state: &'a mut ChunkState,
    pub chunk_index: usize,
}

#[derive(Debug, Clone)]
pub enum CopyFunction {
    /// Any fixed-width value, including booleans (stored one byte per row).
    Scalar {
        data_type: DataType,
        physical: PhysicalType,
    },
    /// Utf8 and Binary.
    VarLen { data_type: DataType },
    List {
        data_type: DataType,
        child: Box<CopyFunction>,
    },
    Struct {
        data_type: DataType,
        children: Vec<CopyFunction>,
    },
}

impl CopyFunction {
    /// Builds the copy function for `data_type`, rejecting shapes the collection
    /// cannot store.
    pub fn for_type(data_type: &DataType) -> Result<Self, ColumnDataError> {
        let physical = PhysicalType::from_arrow_type(data_type)?;
        match (physical, data_type) {
            (PhysicalType::Varchar, _) => Ok(Self::VarLen {
                data_type: data_type.clone(),
            }),
            (PhysicalType::List, DataType::List(field)) => Ok(Self::List {
                data_type: data_type.clone(),
                child: Box::new(Self::for_type(field.data_type())?),
            }),
            (PhysicalType::Struct, DataType::Struct(fields)) => {
                if fields.is_empty() {
                    return Err(ColumnDataError::UnsupportedType(
                        "struct types need at least one field".to_string(),
                    ));
                }
                let children = fields
                    .iter()
                    .map(|field| Self::for_type(field.data_type()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Struct {
                    data_type: data_type.clone(),
                    children,
                })
            }
            (PhysicalType::List, _) | (PhysicalType::Struct, _) => Err(ColumnDataError::internal(
                format!("nested physical type for non-nested {:?}", data_type),
            )),
            (physical, _) => Ok(Self::Scalar {
                data_type: data_type.clone(),
                physical,
            }),
        }
    }

    pub fn data_type(&self) -> &DataType {
        match self {
            Self::Scalar { data_type, .. }
            | Self::VarLen { data_type }
            | Self::List { data_type, .. }
            | Self::Struct { data_type, .. } => data_type,
        }
    }

    /// Appends logical rows `source_offset..source_offset + count` of `source` to
    /// the vector at `target`.
    pub fn copy(
        &self,
        ctx: &mut AppendContext<'_>,
        target: VectorDataIndex,
        source: &UnifiedColumn,
        source_offset: usize,
        count: usize,
    ) -> Result<(), ColumnDataError> {
        if count == 0 {
            return Ok(());
        }
        let target_offset = ctx.segment.get_vector_data(target)?.count;
        if target_offset + count > ctx.segment.capacity() {
            return Err(ColumnDataError::internal(format!(
                "copy of {} rows at {} overflows vector capacity {}",
                count,
                target_offset,
                ctx.segment.capacity()
            )));
        }

        match self {
            Self::Scalar { physical, .. } => {
                scalar::copy_scalar(ctx, *physical, target, source, source_offset, count)?
            }
            Self::VarLen { .. } => varlen::copy_varlen(ctx, target, source, source_offset, count)?,
            Self::List { child, .. } => {
                list::copy_list(ctx, child, target, source, source_offset, count)?
            }
            Self::Struct { children, .. } => {
                strct::copy_struct(ctx, children, target, source, source_offset, count)?
            }
        }

        ctx.segment.get_vector_data_mut(target)?.count += count;
        Ok(())
    }
}

/// Writes the validity bits of `count` source rows into a slot's in-block bitmap,
/// starting at `target_offset`. The bitmap is reset to all valid on the first write
/// into the slot.
pub(crate) fn write_validity(
    bitmap: &mut [u8],
    capacity: usize,
    target_offset: usize,
    source: &UnifiedColumn,
    source_offset: usize,
    count: usize,
) {
    debug_assert_eq!(bitmap.len(), validity_bytes(capacity));
    let bits = bitmap.view_bits_mut::<Lsb0>();
    if target_offset == 0 {
        bits[..capacity].fill(true);
    }
    if source.validity.is_all_valid() {
        return;
    }
    for row in 0..count {
        if !source.row_is_valid(source_offset + row) {
            bits.set(target_offset + row, false);
        }
    }
}
