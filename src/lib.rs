//! This file is the root of the `coldata` Rust crate.
//!
//! `coldata` is an in-memory columnar accumulate/replay engine. Arrow record
//! batches are appended into buffer-backed segments and later scanned back as
//! batches, sequentially or by several workers sharing one cursor.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library.
//! 2.  Re-exporting the handful of types a caller needs to drive a collection.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
pub mod observability; // Make macros available throughout the crate

pub mod collection;
pub mod config;
pub mod copy;
pub mod error;
pub mod null_handling;
pub mod storage;
pub mod types;
pub mod vector;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use collection::{
    AppendState, CollectionStats, ColumnDataCollection, LocalScanState, ParallelScanState,
    ScanState,
};
pub use config::{AllocationStrategy, ColumnDataConfig, STANDARD_VECTOR_SIZE};
pub use error::ColumnDataError;
pub use null_handling::ValidityMask;
pub use storage::BufferAllocator;
