//! Append-only storage for variable-length values that do not fit inline in a
//! string slot.
//!
//! A string slot is 16 bytes. Values of up to `INLINE_LENGTH` bytes live entirely
//! in the slot; longer values keep a 4-byte prefix in the slot and point into the
//! segment's heap.
//!
//! ```text
//! inline:  [ len: u32 LE ][ bytes 0..12                              ]
//! heap:    [ len: u32 LE ][ prefix: 4 bytes ][ page: u32 ][ offset: u32 ]
//! ```

use crate::error::ColumnDataError;
use crate::types::STRING_SLOT_WIDTH;

/// Longest value that is stored directly inside its slot.
pub const INLINE_LENGTH: usize = 12;

const PREFIX_LENGTH: usize = 4;

/// A stable handle to one blob in a `StringHeap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapRef {
    pub page: u32,
    pub offset: u32,
}

#[derive(Debug)]
pub struct StringHeap {
    page_size: usize,
    pages: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl StringHeap {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Copies `blob` into the heap. Handles never move once issued.
    pub fn add_blob(&mut self, blob: &[u8]) -> Result<HeapRef, ColumnDataError> {
        let fits_tail = self
            .pages
            .last()
            .map(|page| page.len() + blob.len() <= self.page_size)
            .unwrap_or(false);
        if !fits_tail {
            // Oversized blobs get a page of their own.
            self.pages
                .push(Vec::with_capacity(self.page_size.max(blob.len())));
        }
        let page_index = self.pages.len() - 1;
        let page = &mut self.pages[page_index];
        let offset = page.len();
        page.extend_from_slice(blob);
        self.total_bytes += blob.len();

        Ok(HeapRef {
            page: to_u32(page_index)?,
            offset: to_u32(offset)?,
        })
    }

    /// Returns the `len` bytes stored at `heap_ref`.
    pub fn get(&self, heap_ref: HeapRef, len: usize) -> Result<&[u8], ColumnDataError> {
        let page = self.pages.get(heap_ref.page as usize).ok_or_else(|| {
            ColumnDataError::internal(format!("heap page {} does not exist", heap_ref.page))
        })?;
        let start = heap_ref.offset as usize;
        page.get(start..start + len).ok_or_else(|| {
            ColumnDataError::internal(format!(
                "heap read {}..{} out of bounds for page {} ({} bytes)",
                start,
                start + len,
                heap_ref.page,
                page.len()
            ))
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.total_bytes
    }
}

fn to_u32(value: usize) -> Result<u32, ColumnDataError> {
    u32::try_from(value)
        .map_err(|_| ColumnDataError::internal(format!("heap position {} overflows u32", value)))
}

//==================================================================================
// String Slot Encoding
//==================================================================================

/// Encodes `value` into a 16-byte slot, spilling to `heap` when it is too long.
pub fn write_string_slot(
    slot: &mut [u8],
    value: &[u8],
    heap: &mut StringHeap,
) -> Result<(), ColumnDataError> {
    debug_assert_eq!(slot.len(), STRING_SLOT_WIDTH);
    let len = u32::try_from(value.len()).map_err(|_| {
        ColumnDataError::internal(format!("string of {} bytes is too long", value.len()))
    })?;
    slot[..4].copy_from_slice(&len.to_le_bytes());
    slot[4..].fill(0);

    if value.len() <= INLINE_LENGTH {
        slot[4..4 + value.len()].copy_from_slice(value);
    } else {
        let heap_ref = heap.add_blob(value)?;
        slot[4..8].copy_from_slice(&value[..PREFIX_LENGTH]);
        slot[8..12].copy_from_slice(&heap_ref.page.to_le_bytes());
        slot[12..16].copy_from_slice(&heap_ref.offset.to_le_bytes());
    }
    Ok(())
}

/// Decodes a slot written by [`write_string_slot`].
pub fn read_string_slot<'a>(
    slot: &'a [u8],
    heap: &'a StringHeap,
) -> Result<&'a [u8], ColumnDataError> {
    let len = bytemuck::pod_read_unaligned::<u32>(&slot[..4]) as usize;
    if len <= INLINE_LENGTH {
        return Ok(&slot[4..4 + len]);
    }
    let heap_ref = HeapRef {
        page: bytemuck::pod_read_unaligned::<u32>(&slot[8..12]),
        offset: bytemuck::pod_read_unaligned::<u32>(&slot[12..16]),
    };
    heap.get(heap_ref, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_values_stay_inline() {
        let mut heap = StringHeap::new(1024);
        let mut slot = [0u8; STRING_SLOT_WIDTH];
        write_string_slot(&mut slot, b"hello world!", &mut heap).unwrap();
        assert_eq!(heap.page_count(), 0);
        assert_eq!(read_string_slot(&slot, &heap).unwrap(), b"hello world!");
    }

    #[test]
    fn test_long_values_spill_to_heap() {
        let mut heap = StringHeap::new(1024);
        let mut slot = [0u8; STRING_SLOT_WIDTH];
        let value = b"this value is longer than twelve bytes";
        write_string_slot(&mut slot, value, &mut heap).unwrap();
        assert_eq!(heap.size_in_bytes(), value.len());
        assert_eq!(&slot[4..8], b"this");
        assert_eq!(read_string_slot(&slot, &heap).unwrap(), value);
    }

    #[test]
    fn test_empty_value_round_trips() {
        let mut heap = StringHeap::new(16);
        let mut slot = [0xAAu8; STRING_SLOT_WIDTH];
        write_string_slot(&mut slot, b"", &mut heap).unwrap();
        assert_eq!(read_string_slot(&slot, &heap).unwrap(), b"");
    }

    #[test]
    fn test_pages_roll_over_and_handles_stay_stable() {
        let mut heap = StringHeap::new(32);
        let first = heap.add_blob(&[1u8; 20]).unwrap();
        let second = heap.add_blob(&[2u8; 20]).unwrap();
        let huge = heap.add_blob(&[3u8; 100]).unwrap();
        assert_eq!(first, HeapRef { page: 0, offset: 0 });
        assert_eq!(second, HeapRef { page: 1, offset: 0 });
        assert_eq!(huge.page, 2);
        assert_eq!(heap.get(first, 20).unwrap(), &[1u8; 20]);
        assert_eq!(heap.get(huge, 100).unwrap(), &[3u8; 100][..]);
    }

    #[test]
    fn test_out_of_bounds_read_is_an_error() {
        let mut heap = StringHeap::new(32);
        let handle = heap.add_blob(b"abc").unwrap();
        assert!(heap.get(handle, 10).is_err());
        assert!(heap.get(HeapRef { page: 5, offset: 0 }, 1).is_err());
    }
}
