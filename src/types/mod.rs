//! This module defines the core, strongly-typed storage representations used
//! throughout the collection engine.
//!
//! It currently includes the `PhysicalType` enum, which collapses Arrow's logical
//! types onto the handful of physical slot shapes the segment allocator knows about.

pub mod physical_type;

// Re-export the main type(s) for easier access.
pub use physical_type::{validity_bytes, PhysicalType, LIST_ENTRY_WIDTH, STRING_SLOT_WIDTH};
