use hydra_types::{ChunkFailure, ChunkState};
use serde_json::Value;

/// The settled-or-not content of one chunk record.
///
/// A slot only ever leaves `Pending`; the ledger never overwrites a
/// settled slot, which is what makes the first write win.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ChunkSlot {
    #[default]
    Pending,
    Loaded(Value),
    Failed(ChunkFailure),
}

impl ChunkSlot {
    pub fn state(&self) -> ChunkState {
        match self {
            Self::Pending => ChunkState::Pending,
            Self::Loaded(_) => ChunkState::Loaded,
            Self::Failed(_) => ChunkState::Error,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ChunkFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Move a pending slot to `next`. Returns `false` (and leaves the slot
    /// untouched) if the slot was already settled.
    pub(crate) fn settle(&mut self, next: ChunkSlot) -> bool {
        if self.is_settled() {
            return false;
        }
        *self = next;
        true
    }
}
