use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One batch of chunks: identifier to raw decoded data, in arrival order.
pub type Batch = serde_json::Map<String, serde_json::Value>;

/// Opaque identifier of a chunk.
///
/// The default placeholder grammar produces digit strings, but nothing
/// outside the grammar assumes any ordering or numeric meaning. Two
/// placeholders carrying the same identifier refer to the same chunk.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Create a `ChunkId`, rejecting the empty string.
    pub fn parse(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyChunkId);
        }
        Ok(Self(id))
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier, returning the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChunkId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ChunkId {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ChunkId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Lifecycle state of a chunk.
///
/// `Pending -> Loaded` and `Pending -> Error` are the only transitions;
/// both targets are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkState {
    /// Registered (or never seen) and not yet settled.
    #[default]
    Pending,
    /// Settled with data.
    Loaded,
    /// Settled with a failure.
    Error,
}

impl ChunkState {
    /// Returns `true` for `Loaded` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Loaded => "loaded",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Why a chunk failed to load.
///
/// Cloned out to every waiter of the rejected chunk, so it carries only
/// a message rather than an arbitrary error source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub message: String,
}

impl ChunkFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<&E> for ChunkFailure {
    fn from(error: &E) -> Self {
        Self::new(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(ChunkId::parse(""), Err(TypeError::EmptyChunkId));
    }

    #[test]
    fn parse_keeps_text_verbatim() {
        let id = ChunkId::parse("007").unwrap();
        assert_eq!(id.as_str(), "007");
        assert_eq!(format!("{id}"), "007");
        assert_eq!(format!("{id:?}"), "ChunkId(007)");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ChunkId::parse("42").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"42\"");
        let parsed: ChunkId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!ChunkState::Pending.is_terminal());
        assert!(ChunkState::Loaded.is_terminal());
        assert!(ChunkState::Error.is_terminal());
        assert_eq!(ChunkState::default(), ChunkState::Pending);
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&ChunkState::Loaded).unwrap();
        assert_eq!(json, "\"loaded\"");
    }

    #[test]
    fn failure_from_error_keeps_message() {
        let err = TypeError::EmptyChunkId;
        let failure = ChunkFailure::from(&err);
        assert_eq!(failure.message, "chunk identifier must not be empty");
    }

    proptest! {
        #[test]
        fn non_empty_ids_always_parse(s in ".+") {
            let id = ChunkId::parse(s.clone()).unwrap();
            prop_assert_eq!(id.into_inner(), s);
        }
    }
}
