// In: src/collection/scan.rs

//! Sequential and parallel scanning.
//!
//! Both forms share one cursor type. A sequential scan owns its cursor; a parallel
//! scan keeps it behind a mutex that is held only while the next chunk is handed
//! out. Decoding always happens outside the lock, on the worker's own
//! `ChunkState`.

use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;

use crate::collection::ColumnDataCollection;
use crate::error::ColumnDataError;
use crate::storage::ChunkState;

/// Position of a scan: the next chunk to hand out and the absolute index of its
/// first row.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    pub segment_index: usize,
    pub chunk_index: usize,
    pub next_row_index: usize,
}

/// A chunk assigned to a scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanTarget {
    pub segment_index: usize,
    pub chunk_index: usize,
    pub row_index: usize,
}

#[derive(Debug, Default)]
pub struct ScanState {
    cursor: ScanCursor,
    current_row_index: usize,
    chunk_state: ChunkState,
}

impl ScanState {
    /// Absolute index of the first row of the chunk returned last.
    pub fn current_row_index(&self) -> usize {
        self.current_row_index
    }
}

/// Shared state of a parallel scan.
#[derive(Debug, Default)]
pub struct ParallelScanState {
    cursor: Mutex<ScanCursor>,
}

/// Per-worker state of a parallel scan.
#[derive(Debug, Default)]
pub struct LocalScanState {
    current_row_index: usize,
    chunk_state: ChunkState,
}

impl LocalScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute index of the first row of the chunk this worker received last.
    pub fn current_row_index(&self) -> usize {
        self.current_row_index
    }
}

impl ColumnDataCollection {
    pub fn init_scan(&self) -> ScanState {
        ScanState::default()
    }

    /// Returns the next chunk, or `None` once the collection is exhausted.
    pub fn scan(&self, state: &mut ScanState) -> Result<Option<RecordBatch>, ColumnDataError> {
        let Some(target) = self.next_scan_index(&mut state.cursor, &mut state.chunk_state) else {
            return Ok(None);
        };
        state.current_row_index = target.row_index;
        self.read_target(target, &mut state.chunk_state).map(Some)
    }

    pub fn init_parallel_scan(&self) -> ParallelScanState {
        ParallelScanState::default()
    }

    /// Parallel form of [`ColumnDataCollection::scan`]. Any number of workers may
    /// call this concurrently with the same `state`, each with its own `local`.
    pub fn scan_parallel(
        &self,
        state: &ParallelScanState,
        local: &mut LocalScanState,
    ) -> Result<Option<RecordBatch>, ColumnDataError> {
        let target = {
            let mut cursor = state.cursor.lock();
            self.next_scan_index(&mut cursor, &mut local.chunk_state)
        };
        let Some(target) = target else {
            return Ok(None);
        };
        local.current_row_index = target.row_index;
        self.read_target(target, &mut local.chunk_state).map(Some)
    }

    /// Scans the whole collection, handing every chunk to `callback`.
    pub fn for_each_chunk<F>(&self, mut callback: F) -> Result<(), ColumnDataError>
    where
        F: FnMut(RecordBatch) -> Result<(), ColumnDataError>,
    {
        let mut state = self.init_scan();
        while let Some(batch) = self.scan(&mut state)? {
            callback(batch)?;
        }
        Ok(())
    }

    /// An iterator over all chunks in scan order.
    pub fn chunks(&self) -> ChunkIter<'_> {
        ChunkIter {
            collection: self,
            state: self.init_scan(),
            done: false,
        }
    }

    /// Reads the chunk with global index `chunk_index` (counting across segments).
    pub fn fetch_chunk(&self, chunk_index: usize) -> Result<RecordBatch, ColumnDataError> {
        let mut remaining = chunk_index;
        for segment in self.segments() {
            if remaining < segment.chunk_count() {
                return segment.read_chunk(remaining, &mut ChunkState::new(), self.schema());
            }
            remaining -= segment.chunk_count();
        }
        Err(ColumnDataError::internal(format!(
            "chunk {} out of range ({} chunks)",
            chunk_index,
            self.chunk_count()
        )))
    }

    /// Advances `cursor` past exhausted segments and hands out the next chunk.
    /// Leaving a segment drops the handles pinned for it.
    fn next_scan_index(&self, cursor: &mut ScanCursor, chunk_state: &mut ChunkState) -> Option<ScanTarget> {
        let segments = self.segments();
        while cursor.segment_index < segments.len() {
            let segment = &segments[cursor.segment_index];
            if let Ok(chunk) = segment.chunk(cursor.chunk_index) {
                let target = ScanTarget {
                    segment_index: cursor.segment_index,
                    chunk_index: cursor.chunk_index,
                    row_index: cursor.next_row_index,
                };
                cursor.next_row_index += chunk.count;
                cursor.chunk_index += 1;
                return Some(target);
            }
            cursor.segment_index += 1;
            cursor.chunk_index = 0;
            chunk_state.clear();
        }
        None
    }

    fn read_target(&self, target: ScanTarget, chunk_state: &mut ChunkState) -> Result<RecordBatch, ColumnDataError> {
        let segment = self.segments().get(target.segment_index).ok_or_else(|| {
            ColumnDataError::internal(format!("segment {} out of range", target.segment_index))
        })?;
        let batch = segment.read_chunk(target.chunk_index, chunk_state, self.schema())?;
        log::trace!(
            "scan: segment {} chunk {} -> {} rows at row {}",
            target.segment_index,
            target.chunk_index,
            batch.num_rows(),
            target.row_index
        );
        Ok(batch)
    }
}

/// Iterator returned by [`ColumnDataCollection::chunks`]. Stops after the first
/// error.
pub struct ChunkIter<'a> {
    collection: &'a ColumnDataCollection,
    state: ScanState,
    done: bool,
}

impl Iterator for ChunkIter<'_> {
    type Item = Result<RecordBatch, ColumnDataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.collection.scan(&mut self.state) {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
