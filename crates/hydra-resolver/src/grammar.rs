use std::collections::BTreeSet;

use hydra_types::ChunkId;
use regex::Regex;
use serde_json::Value;

use crate::error::{ResolverError, Result};

/// Default placeholder grammar: `$` followed by one or more digits.
pub const DEFAULT_PLACEHOLDER_PATTERN: &str = r"^\$([0-9]+)$";

/// Decides which document values are placeholders.
///
/// A value is a placeholder only when it is a string and the *whole* string
/// matches the pattern; the pattern is wrapped in `^(?:...)$` so that
/// unanchored patterns cannot match a substring. The single capture group
/// yields the chunk identifier.
#[derive(Clone, Debug)]
pub struct PlaceholderGrammar {
    pattern: String,
    regex: Regex,
}

impl PlaceholderGrammar {
    /// Compile a grammar from a pattern with exactly one capture group.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            ResolverError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;

        // captures_len counts the implicit whole-match group.
        let found = regex.captures_len() - 1;
        if found != 1 {
            return Err(ResolverError::CaptureGroups {
                pattern: pattern.to_string(),
                found,
            });
        }

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as configured.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` iff `value` is a string that is a placeholder.
    pub fn is_placeholder(&self, value: &Value) -> bool {
        self.extract_id(value).is_some()
    }

    /// Chunk identifier of a placeholder value; `None` for anything else.
    pub fn extract_id(&self, value: &Value) -> Option<ChunkId> {
        match value {
            Value::String(s) => self.extract_id_str(s),
            _ => None,
        }
    }

    /// Chunk identifier of a placeholder string.
    ///
    /// A full match whose capture group is empty or did not participate
    /// is not a placeholder.
    pub fn extract_id_str(&self, s: &str) -> Option<ChunkId> {
        let caps = self.regex.captures(s)?;
        let id = caps.get(1)?;
        ChunkId::parse(id.as_str()).ok()
    }

    /// Every identifier referenced anywhere in `document`.
    ///
    /// Visits every mapping value and sequence element; keys are never
    /// inspected.
    pub fn find_all_ids(&self, document: &Value) -> BTreeSet<ChunkId> {
        let mut ids = BTreeSet::new();
        self.collect_ids(document, &mut ids);
        ids
    }

    fn collect_ids(&self, value: &Value, ids: &mut BTreeSet<ChunkId>) {
        match value {
            Value::Object(map) => {
                for child in map.values() {
                    self.collect_ids(child, ids);
                }
            }
            Value::Array(items) => {
                for child in items {
                    self.collect_ids(child, ids);
                }
            }
            scalar => {
                if let Some(id) = self.extract_id(scalar) {
                    ids.insert(id);
                }
            }
        }
    }
}

impl Default for PlaceholderGrammar {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_PATTERN).expect("default placeholder pattern is valid")
    }
}
