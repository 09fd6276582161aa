//! Physical storage: the shared block allocator, per-segment string heaps, and the
//! segment addressing model that ties chunks and vector slots to allocator blocks.

pub mod allocator;
pub mod heap;
mod reader;
pub mod segment;

pub use allocator::{BlockHandle, BlockId, BlockPointer, BufferAllocator, ChunkState};
pub use heap::{HeapRef, StringHeap};
pub use segment::{ChildIndex, ChunkMetaData, Segment, VectorDataIndex, VectorMetaData};
