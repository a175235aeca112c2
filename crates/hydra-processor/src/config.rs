use serde::{Deserialize, Serialize};

/// Largest encoded item accepted by default (16 MiB).
pub const DEFAULT_MAX_ITEM_BYTES: usize = 16 * 1024 * 1024;

/// Configuration for the [`crate::ChunkProcessor`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Encoded items (stream items or lines) larger than this are reported
    /// as [`crate::ProcessorError::TooLarge`] and skipped.
    pub max_item_bytes: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
        }
    }
}
