//! The flattened view of an input column consumed by the copy functions.
//!
//! Arrow hands us arrays in several shapes (plain, sliced, dictionary encoded,
//! nested). `flatten` normalizes all of them into a `UnifiedColumn`: a dense value
//! array, a validity mask indexed by dense position, and a selection mapping each
//! logical row onto a dense position. Copy functions only ever see this shape.

mod flatten;

pub use flatten::flatten;

use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;

use crate::null_handling::ValidityMask;

/// Maps a logical row onto a position in the dense value array.
#[derive(Debug, Clone)]
pub enum SelectionVector {
    /// Row `i` is dense position `i`.
    Identity,
    Indices(Arc<[u32]>),
}

impl SelectionVector {
    #[inline]
    pub fn get_index(&self, row: usize) -> usize {
        match self {
            Self::Identity => row,
            Self::Indices(indices) => indices[row] as usize,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// The selection that first picks `rows` and then applies `self`.
    pub fn compose(&self, rows: &[u32]) -> SelectionVector {
        let indices: Arc<[u32]> = match self {
            Self::Identity => Arc::from(rows),
            Self::Indices(inner) => rows.iter().map(|row| inner[*row as usize]).collect(),
        };
        Self::Indices(indices)
    }
}

/// One column of an input batch after flattening.
#[derive(Debug, Clone)]
pub struct UnifiedColumn {
    /// Dense values. For lists and structs this is the list/struct array itself;
    /// the data of nested values lives in `children`.
    pub values: ArrayRef,
    /// Validity by dense position.
    pub validity: ValidityMask,
    pub selection: SelectionVector,
    /// Struct: one per field, indexed by the same logical rows as this column.
    /// List: exactly one, indexed by positions in the list's child array.
    pub children: Vec<UnifiedColumn>,
}

impl UnifiedColumn {
    /// `true` if logical row `row` holds a value.
    #[inline]
    pub fn row_is_valid(&self, row: usize) -> bool {
        self.validity.row_is_valid(self.selection.get_index(row))
    }

    /// A view of this column whose logical row `i` is this column's row `rows[i]`.
    ///
    /// Struct children are re-selected along with the parent since they share its
    /// row space. List children keep their own row space and are left alone.
    pub fn reselect(&self, rows: &[u32]) -> UnifiedColumn {
        let children = if is_struct(&self.values) {
            self.children.iter().map(|child| child.reselect(rows)).collect()
        } else {
            self.children.clone()
        };
        UnifiedColumn {
            values: self.values.clone(),
            validity: self.validity.clone(),
            selection: self.selection.compose(rows),
            children,
        }
    }
}

fn is_struct(values: &ArrayRef) -> bool {
    matches!(values.data_type(), DataType::Struct(_))
}
