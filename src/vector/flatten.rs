use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;

use crate::error::ColumnDataError;
use crate::null_handling::ValidityMask;
use crate::vector::{SelectionVector, UnifiedColumn};

/// Normalizes any supported Arrow array into a `UnifiedColumn`.
///
/// - Plain and sliced arrays are used as is (Arrow's accessors apply the offset).
/// - Dictionary arrays become a selection over their flattened values. A
///   dictionary with null keys is decoded to its value type first, since a null
///   key has no value position to select.
/// - Struct children are flattened alongside the parent; list children are
///   flattened over the list's child array.
pub fn flatten(array: &ArrayRef) -> Result<UnifiedColumn, ColumnDataError> {
    if let Some(dictionary) = array.as_any_dictionary_opt() {
        if dictionary.keys().null_count() > 0 {
            let value_type = dictionary.values().data_type().clone();
            let decoded = cast(array, &value_type)?;
            return flatten(&decoded);
        }
        let keys: Vec<u32> = dictionary
            .normalized_keys()
            .into_iter()
            .map(|key| key as u32)
            .collect();
        let values = flatten(dictionary.values())?;
        return Ok(values.reselect(&keys));
    }

    let validity = ValidityMask::from_null_buffer(array.nulls(), array.len());
    let children = match array.data_type() {
        DataType::Struct(_) => array
            .as_struct()
            .columns()
            .iter()
            .map(flatten)
            .collect::<Result<Vec<_>, _>>()?,
        DataType::List(_) => vec![flatten(array.as_list::<i32>().values())?],
        _ => Vec::new(),
    };

    Ok(UnifiedColumn {
        values: array.clone(),
        validity,
        selection: SelectionVector::Identity,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{DictionaryArray, Int32Array, ListArray, StringArray, StructArray};
    use arrow::datatypes::{Field, Int8Type, Int32Type};
    use std::sync::Arc;

    #[test]
    fn test_plain_array_is_identity() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![Some(1), None, Some(3)]));
        let column = flatten(&array).unwrap();
        assert!(column.selection.is_identity());
        assert!(column.row_is_valid(0));
        assert!(!column.row_is_valid(1));
        assert!(column.children.is_empty());
    }

    #[test]
    fn test_sliced_array_keeps_logical_rows() {
        let base: ArrayRef = Arc::new(Int32Array::from(vec![Some(1), None, Some(3), None]));
        let sliced = base.slice(1, 3);
        let column = flatten(&sliced).unwrap();
        assert!(!column.row_is_valid(0));
        assert!(column.row_is_valid(1));
        assert!(!column.row_is_valid(2));
        assert_eq!(column.values.as_primitive::<Int32Type>().value(1), 3);
    }

    #[test]
    fn test_dictionary_becomes_selection() {
        let dictionary: DictionaryArray<Int8Type> = vec!["x", "y", "x", "z"].into_iter().collect();
        let array: ArrayRef = Arc::new(dictionary);
        let column = flatten(&array).unwrap();

        let values = column.values.as_string::<i32>();
        let decoded: Vec<&str> = (0..4)
            .map(|row| values.value(column.selection.get_index(row)))
            .collect();
        assert_eq!(decoded, vec!["x", "y", "x", "z"]);
    }

    #[test]
    fn test_dictionary_with_null_keys_is_decoded() {
        let dictionary: DictionaryArray<Int8Type> =
            vec![Some("a"), None, Some("b")].into_iter().collect();
        let array: ArrayRef = Arc::new(dictionary);
        let column = flatten(&array).unwrap();
        assert_eq!(column.values.data_type(), &DataType::Utf8);
        assert!(column.selection.is_identity());
        assert!(!column.row_is_valid(1));
    }

    #[test]
    fn test_struct_children_follow_parent_rows() {
        let strct = StructArray::from(vec![
            (
                Arc::new(Field::new("a", DataType::Int32, true)),
                Arc::new(Int32Array::from(vec![10, 20, 30])) as ArrayRef,
            ),
            (
                Arc::new(Field::new("b", DataType::Utf8, true)),
                Arc::new(StringArray::from(vec!["p", "q", "r"])) as ArrayRef,
            ),
        ]);
        let array: ArrayRef = Arc::new(strct);
        let column = flatten(&array).unwrap();
        assert_eq!(column.children.len(), 2);

        let picked = column.reselect(&[2, 0]);
        let a = &picked.children[0];
        let a_values = a.values.as_primitive::<Int32Type>();
        assert_eq!(a_values.value(a.selection.get_index(0)), 30);
        assert_eq!(a_values.value(a.selection.get_index(1)), 10);
    }

    #[test]
    fn test_list_child_is_flattened_over_child_array() {
        let list = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![
            Some(vec![Some(1), Some(2)]),
            None,
            Some(vec![Some(3)]),
        ]);
        let array: ArrayRef = Arc::new(list);
        let column = flatten(&array).unwrap();
        assert_eq!(column.children.len(), 1);
        assert_eq!(column.children[0].values.len(), 3);

        // Re-selecting the list does not touch its child row space.
        let picked = column.reselect(&[2]);
        assert!(picked.children[0].selection.is_identity());
    }
}
