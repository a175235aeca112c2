use std::collections::BTreeMap;
use std::sync::Arc;

use hydra_types::{Batch, ChunkId, ChunkState};

use crate::error::ProcessorError;

/// One event on the processor's update channel.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateEvent {
    /// A batch that has been fully written to the ledger, with the ledger's
    /// chunk states as they stood right after it was applied.
    Batch {
        batch: Arc<Batch>,
        states: Arc<BTreeMap<ChunkId, ChunkState>>,
    },
    /// A batch or encoded item that failed.
    Error(ProcessorError),
}

impl UpdateEvent {
    /// The batch carried by this event, if any.
    pub fn as_batch(&self) -> Option<&Batch> {
        match self {
            Self::Batch { batch, .. } => Some(batch),
            Self::Error(_) => None,
        }
    }

    /// Chunk states recorded when the batch was published.
    pub fn states(&self) -> Option<&BTreeMap<ChunkId, ChunkState>> {
        match self {
            Self::Batch { states, .. } => Some(states),
            Self::Error(_) => None,
        }
    }

    /// The error carried by this event, if any.
    pub fn as_error(&self) -> Option<&ProcessorError> {
        match self {
            Self::Error(error) => Some(error),
            Self::Batch { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
