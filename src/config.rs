// In: src/config.rs

//! The single source of truth for all collection configuration.
//!
//! `ColumnDataConfig` is created once (usually via `Default`, or parsed from JSON at
//! the application boundary) and copied into every collection and allocator built
//! from it. Collections that share an allocator must agree on `vector_capacity`,
//! which is why the capacity travels with the allocator rather than the collection.

use serde::{Deserialize, Serialize};

use crate::error::ColumnDataError;

//==================================================================================
// 0. Constants
//==================================================================================

/// The default number of rows per chunk and per stored vector slot. This is the same
/// batch size the execution layer uses for its row batches.
pub const STANDARD_VECTOR_SIZE: usize = 2048;

/// Default size of one allocator block.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default size of one string-heap page.
pub const DEFAULT_HEAP_PAGE_SIZE: usize = 64 * 1024;

//==================================================================================
// I. Configuration Enums & Structs
//==================================================================================

/// How the `BufferAllocator` carves vector slots out of memory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// **Default:** Slots are bump-allocated inside fixed-size blocks. Many slots
    /// (possibly from several collections sharing the allocator) live in one block.
    #[default]
    Blocked,

    /// Every slot gets its own block, sized exactly. Useful for small collections
    /// and for tests that want block ids to map one-to-one onto slots.
    Dedicated,
}

/// The configuration shared by an allocator and the collections built on it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ColumnDataConfig {
    /// **Rows per chunk.** Also the capacity of every vector slot, including the
    /// chained slots that hold list children. Must be a non-zero multiple of 64 so
    /// that validity bitmaps always cover whole words.
    #[serde(default = "default_vector_capacity")]
    pub vector_capacity: usize,

    /// Size in bytes of one allocator block. Requests larger than this get a
    /// dedicated oversized block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default)]
    pub allocation_strategy: AllocationStrategy,

    /// Size in bytes of one page of a segment's string heap.
    #[serde(default = "default_heap_page_size")]
    pub heap_page_size: usize,
}

impl Default for ColumnDataConfig {
    fn default() -> Self {
        Self {
            vector_capacity: default_vector_capacity(),
            block_size: default_block_size(),
            allocation_strategy: AllocationStrategy::default(),
            heap_page_size: default_heap_page_size(),
        }
    }
}

impl ColumnDataConfig {
    /// Convenience constructor for a non-default chunk capacity.
    pub fn with_vector_capacity(vector_capacity: usize) -> Self {
        Self {
            vector_capacity,
            ..Self::default()
        }
    }

    /// Checks the structural requirements every component relies on.
    pub fn validate(&self) -> Result<(), ColumnDataError> {
        if self.vector_capacity == 0 || self.vector_capacity % 64 != 0 {
            return Err(ColumnDataError::InvalidConfig(format!(
                "vector_capacity must be a non-zero multiple of 64, got {}",
                self.vector_capacity
            )));
        }
        if self.block_size == 0 {
            return Err(ColumnDataError::InvalidConfig(
                "block_size must be non-zero".to_string(),
            ));
        }
        if self.heap_page_size == 0 {
            return Err(ColumnDataError::InvalidConfig(
                "heap_page_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses a JSON document into a validated config. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ColumnDataError> {
        let config: ColumnDataConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Helper for `serde` to provide a default for `vector_capacity`.
fn default_vector_capacity() -> usize {
    STANDARD_VECTOR_SIZE
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_heap_page_size() -> usize {
    DEFAULT_HEAP_PAGE_SIZE
}

//==================================================================================
// II. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ColumnDataConfig::default();
        assert_eq!(config.vector_capacity, STANDARD_VECTOR_SIZE);
        assert_eq!(config.allocation_strategy, AllocationStrategy::Blocked);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_missing_fields_with_defaults() {
        let config =
            ColumnDataConfig::from_json(r#"{"vector_capacity": 128, "allocation_strategy": "dedicated"}"#)
                .unwrap();
        assert_eq!(config.vector_capacity, 128);
        assert_eq!(config.allocation_strategy, AllocationStrategy::Dedicated);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.heap_page_size, DEFAULT_HEAP_PAGE_SIZE);
    }

    #[test]
    fn test_validate_rejects_unaligned_capacity() {
        let result = ColumnDataConfig::with_vector_capacity(100).validate();
        assert!(matches!(result, Err(ColumnDataError::InvalidConfig(_))));

        let result = ColumnDataConfig::with_vector_capacity(0).validate();
        assert!(matches!(result, Err(ColumnDataError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json_rejects_zero_block_size() {
        let result = ColumnDataConfig::from_json(r#"{"block_size": 0}"#);
        assert!(matches!(result, Err(ColumnDataError::InvalidConfig(_))));
    }
}
