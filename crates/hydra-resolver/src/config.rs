use serde::{Deserialize, Serialize};

use crate::grammar::DEFAULT_PLACEHOLDER_PATTERN;

/// Configuration for the [`crate::PlaceholderResolver`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Placeholder pattern with exactly one capture group.
    pub placeholder_pattern: String,
    /// Maximum cached results before the cache is flushed. Zero disables caching.
    pub cache_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            placeholder_pattern: DEFAULT_PLACEHOLDER_PATTERN.to_string(),
            cache_capacity: 256,
        }
    }
}
