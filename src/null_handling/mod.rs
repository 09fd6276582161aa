//! This module serves as the public API for all null-handling logic within the
//! collection engine.
//!
//! Validity is tracked separately from values everywhere in the engine: flattened
//! input columns carry a `ValidityMask`, stored vector slots carry an in-block
//! bitmap with the same bit order, and scans hand the bits back to Arrow as a
//! `NullBuffer`.

//==================================================================================
// 1. Module Declarations
//==================================================================================

/// The copy-on-write validity mask and its combine/slice/resize algebra.
pub mod validity;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================

pub use validity::{word_count, ValidityMask, ValidityWord, BITS_PER_WORD};

//==================================================================================
// 3. Unit Tests (Module-level integration tests)
//==================================================================================

#[cfg(test)]
mod validity_tests;
