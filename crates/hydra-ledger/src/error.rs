use hydra_types::{ChunkFailure, ChunkId};

/// Errors produced by ledger wait operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("chunk {id} was rejected: {failure}")]
    ChunkRejected { id: ChunkId, failure: ChunkFailure },

    #[error("ledger was cleared while waiting for chunk {id}")]
    Cleared { id: ChunkId },
}
