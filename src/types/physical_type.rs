//! This module defines the physical storage shape of every column type the
//! collection engine accepts.
//!
//! Logical Arrow types collapse onto a small set of physical shapes: a `Date32`
//! and an `Int32` are stored identically, a `Decimal128` is an opaque 16-byte
//! value. The copy-function table and the slot allocator only ever look at the
//! physical type.

use crate::error::ColumnDataError;
use arrow::datatypes::{DataType as ArrowDataType, IntervalUnit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a string slot: a 4-byte length followed by 12 bytes of either inline
/// data or a prefix plus heap handle.
pub const STRING_SLOT_WIDTH: usize = 16;

/// Width of a list entry slot: a `(offset: u64, length: u64)` pair.
pub const LIST_ENTRY_WIDTH: usize = 16;

/// The canonical physical representation of a stored column.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    /// Arrow's month/day/nanosecond interval, stored as an opaque 16-byte value.
    Interval,
    /// Variable-length bytes (`Utf8` and `Binary`).
    Varchar,
    List,
    Struct,
}

impl PhysicalType {
    /// Maps an Arrow `DataType` onto its physical storage shape.
    pub fn from_arrow_type(arrow_type: &ArrowDataType) -> Result<Self, ColumnDataError> {
        match arrow_type {
            ArrowDataType::Boolean => Ok(Self::Bool),
            ArrowDataType::Int8 => Ok(Self::Int8),
            ArrowDataType::Int16 => Ok(Self::Int16),
            ArrowDataType::Int32
            | ArrowDataType::Date32
            | ArrowDataType::Time32(_)
            | ArrowDataType::Interval(IntervalUnit::YearMonth) => Ok(Self::Int32),
            ArrowDataType::Int64
            | ArrowDataType::Date64
            | ArrowDataType::Time64(_)
            | ArrowDataType::Timestamp(_, _)
            | ArrowDataType::Duration(_)
            | ArrowDataType::Interval(IntervalUnit::DayTime) => Ok(Self::Int64),
            ArrowDataType::Decimal128(_, _) => Ok(Self::Int128),
            ArrowDataType::Interval(IntervalUnit::MonthDayNano) => Ok(Self::Interval),
            ArrowDataType::UInt8 => Ok(Self::UInt8),
            ArrowDataType::UInt16 => Ok(Self::UInt16),
            ArrowDataType::UInt32 => Ok(Self::UInt32),
            ArrowDataType::UInt64 => Ok(Self::UInt64),
            ArrowDataType::Float32 => Ok(Self::Float),
            ArrowDataType::Float64 => Ok(Self::Double),
            ArrowDataType::Utf8 | ArrowDataType::Binary => Ok(Self::Varchar),
            ArrowDataType::List(_) => Ok(Self::List),
            ArrowDataType::Struct(_) => Ok(Self::Struct),
            dt => Err(ColumnDataError::UnsupportedType(format!(
                "Cannot store Arrow type {:?} in a column data collection",
                dt
            ))),
        }
    }

    /// Width in bytes of one row in the slot's value region. Structs have no value
    /// region; their children carry the data.
    pub fn slot_width(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float => 4,
            Self::Int64 | Self::UInt64 | Self::Double => 8,
            Self::Int128 | Self::Interval => 16,
            Self::Varchar => STRING_SLOT_WIDTH,
            Self::List => LIST_ENTRY_WIDTH,
            Self::Struct => 0,
        }
    }

    /// Total bytes one vector slot of this type occupies for `capacity` rows: the
    /// value region followed by a `capacity`-bit validity bitmap.
    pub fn slot_size(&self, capacity: usize) -> usize {
        self.slot_width() * capacity + validity_bytes(capacity)
    }

    /// Returns `true` if the type owns child storage (struct children or a list chain).
    pub fn is_nested(&self) -> bool {
        matches!(self, Self::List | Self::Struct)
    }
}

/// Bytes needed for a validity bitmap of `capacity` rows.
pub fn validity_bytes(capacity: usize) -> usize {
    capacity.div_ceil(8)
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Fields, TimeUnit};
    use std::sync::Arc;

    #[test]
    fn test_logical_types_collapse_to_physical_shapes() {
        assert_eq!(
            PhysicalType::from_arrow_type(&ArrowDataType::Date32).unwrap(),
            PhysicalType::Int32
        );
        assert_eq!(
            PhysicalType::from_arrow_type(&ArrowDataType::Timestamp(
                TimeUnit::Microsecond,
                Some("UTC".into())
            ))
            .unwrap(),
            PhysicalType::Int64
        );
        assert_eq!(
            PhysicalType::from_arrow_type(&ArrowDataType::Decimal128(38, 2)).unwrap(),
            PhysicalType::Int128
        );
        assert_eq!(
            PhysicalType::from_arrow_type(&ArrowDataType::Binary).unwrap(),
            PhysicalType::Varchar
        );
    }

    #[test]
    fn test_nested_types_are_recognized() {
        let list = ArrowDataType::List(Arc::new(Field::new("item", ArrowDataType::Int32, true)));
        let strct = ArrowDataType::Struct(Fields::from(vec![Field::new(
            "a",
            ArrowDataType::Int32,
            true,
        )]));
        assert!(PhysicalType::from_arrow_type(&list).unwrap().is_nested());
        assert!(PhysicalType::from_arrow_type(&strct).unwrap().is_nested());
    }

    #[test]
    fn test_unsupported_types_are_rejected() {
        let result = PhysicalType::from_arrow_type(&ArrowDataType::LargeUtf8);
        assert!(matches!(result, Err(ColumnDataError::UnsupportedType(_))));
        let result = PhysicalType::from_arrow_type(&ArrowDataType::Float16);
        assert!(result.is_err());
    }

    #[test]
    fn test_slot_sizes_include_validity() {
        assert_eq!(PhysicalType::Int32.slot_size(2048), 4 * 2048 + 256);
        assert_eq!(PhysicalType::Struct.slot_size(2048), 256);
        assert_eq!(PhysicalType::Varchar.slot_size(64), 16 * 64 + 8);
    }
}
