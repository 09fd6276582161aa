// In: src/collection/mod.rs

//! The `ColumnDataCollection`: an append-only, chunked, in-memory column store.
//!
//! Rows arrive as Arrow `RecordBatch`es and are copied into segments made of
//! fixed-capacity chunks. Scans hand the chunks back as batches of at most
//! `vector_capacity` rows, either sequentially or through a shared parallel cursor.
//!
//! The concurrency discipline is expressed through borrows: appending, combining
//! and resetting take `&mut self`, scanning takes `&self`. Any number of scans may
//! therefore run while no append is in progress, and never during one.

mod scan;


pub use scan::{ChunkIter, LocalScanState, ParallelScanState, ScanCursor, ScanState};

use std::fmt;
use std::sync::Arc;

use arrow::array::Array;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::config::ColumnDataConfig;
use crate::copy::{AppendContext, CopyFunction};
use crate::error::ColumnDataError;
use crate::storage::{BufferAllocator, ChunkState, Segment};
use crate::vector::flatten;

/// Reusable state for a sequence of appends.
#[derive(Debug, Default)]
pub struct AppendState {
    chunk_state: ChunkState,
}

/// Summary statistics reported by [`ColumnDataCollection::describe`].
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub column_count: usize,
    pub row_count: usize,
    pub segment_count: usize,
    pub chunk_count: usize,
    pub vector_capacity: usize,
    pub block_count: usize,
    pub allocated_bytes: usize,
    pub heap_bytes: usize,
    pub finished_append: bool,
}

#[derive(Debug)]
pub struct ColumnDataCollection {
    schema: SchemaRef,
    types: Vec<DataType>,
    copy_functions: Vec<CopyFunction>,
    allocator: Arc<BufferAllocator>,
    segments: Vec<Segment>,
    count: usize,
    finished_append: bool,
}

impl ColumnDataCollection {
    //==============================================================================
    // Construction
    //==============================================================================

    /// Creates an empty collection for `schema` with the default configuration.
    pub fn new(schema: SchemaRef) -> Result<Self, ColumnDataError> {
        Self::with_config(schema, ColumnDataConfig::default())
    }

    pub fn with_config(schema: SchemaRef, config: ColumnDataConfig) -> Result<Self, ColumnDataError> {
        Self::with_allocator(BufferAllocator::shared(config)?, schema)
    }

    /// Creates an empty collection drawing memory from an existing allocator.
    ///
    /// Fails with `UnsupportedType` if any column type cannot be stored.
    pub fn with_allocator(
        allocator: Arc<BufferAllocator>,
        schema: SchemaRef,
    ) -> Result<Self, ColumnDataError> {
        let types: Vec<DataType> = schema
            .fields()
            .iter()
            .map(|field| field.data_type().clone())
            .collect();
        let copy_functions = types
            .iter()
            .map(CopyFunction::for_type)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            schema,
            types,
            copy_functions,
            allocator,
            segments: Vec::new(),
            count: 0,
            finished_append: false,
        })
    }

    /// Creates an empty collection sharing `other`'s schema and allocator. `other`
    /// is closed for appends from here on.
    pub fn from_collection(other: &mut ColumnDataCollection) -> Result<Self, ColumnDataError> {
        let collection = Self::with_allocator(other.allocator.clone(), other.schema.clone())?;
        other.finished_append = true;
        Ok(collection)
    }

    //==============================================================================
    // Append
    //==============================================================================

    /// Prepares an append stream. Fails once the collection is finished.
    pub fn init_append(&mut self) -> Result<AppendState, ColumnDataError> {
        if self.finished_append {
            return Err(ColumnDataError::AppendAfterFinish);
        }
        if self.segments.is_empty() {
            self.create_segment();
        }
        Ok(AppendState::default())
    }

    /// Appends every row of `batch`.
    pub fn append(&mut self, batch: &RecordBatch) -> Result<(), ColumnDataError> {
        let mut state = self.init_append()?;
        self.append_with_state(&mut state, batch)
    }

    /// Appends every row of `batch`, reusing the pinned blocks in `state`.
    pub fn append_with_state(
        &mut self,
        state: &mut AppendState,
        batch: &RecordBatch,
    ) -> Result<(), ColumnDataError> {
        if self.finished_append {
            return Err(ColumnDataError::AppendAfterFinish);
        }
        self.check_batch_schema(batch)?;
        let rows = batch.num_rows();
        if rows == 0 {
            return Ok(());
        }
        if self.segments.is_empty() {
            self.create_segment();
        }

        let columns = batch
            .columns()
            .iter()
            .map(flatten)
            .collect::<Result<Vec<_>, _>>()?;

        let segment = self
            .segments
            .last_mut()
            .ok_or_else(|| ColumnDataError::internal("append without a segment"))?;
        let capacity = segment.capacity();

        let mut offset = 0;
        while offset < rows {
            let needs_chunk = match segment.chunk_count() {
                0 => true,
                n => segment.chunk(n - 1)?.count == capacity,
            };
            if needs_chunk {
                segment.allocate_new_chunk()?;
            }
            let chunk_index = segment.chunk_count() - 1;
            segment.initialize_chunk_state(chunk_index, &mut state.chunk_state)?;

            let chunk = segment.chunk(chunk_index)?;
            let append_count = (rows - offset).min(capacity - chunk.count);
            let roots = chunk.vector_data.clone();

            for ((function, column), target) in self.copy_functions.iter().zip(&columns).zip(roots) {
                let mut ctx = AppendContext {
                    segment: &mut *segment,
                    state: &mut state.chunk_state,
                    chunk_index,
                };
                function.copy(&mut ctx, target, column, offset, append_count)?;
            }
            segment.finish_chunk_append(chunk_index, append_count)?;
            offset += append_count;
        }

        self.count += rows;
        log::trace!("append: {} rows, collection now holds {}", rows, self.count);
        Ok(())
    }

    /// Column types must match exactly; a dictionary column is accepted where its
    /// value type is expected. Nulls are rejected in columns declared non-nullable.
    fn check_batch_schema(&self, batch: &RecordBatch) -> Result<(), ColumnDataError> {
        if batch.num_columns() != self.types.len() {
            return Err(ColumnDataError::SchemaMismatch(format!(
                "expected {} columns, batch has {}",
                self.types.len(),
                batch.num_columns()
            )));
        }
        for (index, (expected, column)) in self.types.iter().zip(batch.columns()).enumerate() {
            let actual = column.data_type();
            let compatible = actual == expected
                || matches!(actual, DataType::Dictionary(_, value) if value.as_ref() == expected);
            if !compatible {
                return Err(ColumnDataError::SchemaMismatch(format!(
                    "column {} expects {:?}, batch has {:?}",
                    index, expected, actual
                )));
            }
            let field = self.schema.field(index);
            let null_count = column.logical_nulls().map_or(0, |nulls| nulls.null_count());
            if !field.is_nullable() && null_count > 0 {
                return Err(ColumnDataError::SchemaMismatch(format!(
                    "column {} ('{}') is not nullable, batch has {} nulls",
                    index,
                    field.name(),
                    null_count
                )));
            }
        }
        Ok(())
    }

    fn create_segment(&mut self) {
        self.segments
            .push(Segment::new(self.allocator.clone(), self.types.clone()));
        log::debug!("collection: created segment {}", self.segments.len() - 1);
    }

    //==============================================================================
    // Combine, Reset, Verify
    //==============================================================================

    /// Moves all of `other`'s segments to the end of this collection. No data is
    /// copied; `other` is left empty.
    ///
    /// Types must be equal, and a non-nullable column only accepts a non-nullable one.
    pub fn combine(&mut self, other: &mut ColumnDataCollection) -> Result<(), ColumnDataError> {
        if self.types != other.types {
            return Err(ColumnDataError::SchemaMismatch(format!(
                "cannot combine collections of {:?} and {:?}",
                self.types, other.types
            )));
        }
        let widened = self
            .schema
            .fields()
            .iter()
            .zip(other.schema.fields())
            .find(|(ours, theirs)| !ours.is_nullable() && theirs.is_nullable());
        if let Some((ours, _)) = widened {
            return Err(ColumnDataError::SchemaMismatch(format!(
                "cannot combine a nullable '{}' column into a non-nullable one",
                ours.name()
            )));
        }
        let moved_rows = other.count;
        let moved_segments = other.segments.len();
        self.segments.append(&mut other.segments);
        self.count += moved_rows;
        other.count = 0;
        log::debug!(
            "combine: moved {} segments ({} rows), collection now holds {}",
            moved_segments,
            moved_rows,
            self.count
        );
        log_metric!("event" = "combine", "segments" = moved_segments, "rows" = moved_rows);

        #[cfg(debug_assertions)]
        self.verify()?;
        Ok(())
    }

    /// Drops all stored data. The collection stays open (or finished) as before.
    pub fn reset(&mut self) {
        self.count = 0;
        self.segments.clear();
    }

    /// Checks every count invariant from the collection down to the list chains.
    pub fn verify(&self) -> Result<(), ColumnDataError> {
        let mut total = 0;
        for segment in &self.segments {
            segment.verify()?;
            total += segment.count();
        }
        if total != self.count {
            return Err(ColumnDataError::internal(format!(
                "collection count {} does not match its segments ({})",
                self.count, total
            )));
        }
        Ok(())
    }

    //==============================================================================
    // Accessors
    //==============================================================================

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn column_count(&self) -> usize {
        self.types.len()
    }

    pub fn row_count(&self) -> usize {
        self.count
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.segments.iter().map(Segment::chunk_count).sum()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_append
    }

    pub fn allocator(&self) -> &Arc<BufferAllocator> {
        &self.allocator
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            column_count: self.column_count(),
            row_count: self.count,
            segment_count: self.segments.len(),
            chunk_count: self.chunk_count(),
            vector_capacity: self.allocator.vector_capacity(),
            block_count: self.allocator.block_count(),
            allocated_bytes: self.allocator.allocated_bytes(),
            heap_bytes: self
                .segments
                .iter()
                .map(|segment| segment.heap().size_in_bytes())
                .sum(),
            finished_append: self.finished_append,
        }
    }

    /// The collection's statistics as pretty-printed JSON.
    pub fn describe(&self) -> Result<String, ColumnDataError> {
        Ok(serde_json::to_string_pretty(&self.stats())?)
    }
}

impl fmt::Display for ColumnDataCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Column Data Collection [{} rows, {} segments, {} chunks]",
            self.count,
            self.segments.len(),
            self.chunk_count()
        )?;
        for field in self.schema.fields() {
            write!(f, "\n  {}: {}", field.name(), field.data_type())?;
        }
        Ok(())
    }
}
