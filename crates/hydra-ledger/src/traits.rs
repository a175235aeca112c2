use std::collections::{BTreeMap, BTreeSet};

use hydra_types::{ChunkFailure, ChunkId, ChunkState};
use serde_json::Value;

/// Write boundary for chunk settlement.
pub trait ChunkWriter: Send + Sync {
    /// Create a pending record if none exists. Idempotent.
    fn register(&self, id: ChunkId);

    /// Settle a chunk with data, registering it first if needed.
    ///
    /// Returns `false` when the record was already settled; the stored
    /// value is left as it was.
    fn resolve(&self, id: ChunkId, data: Value) -> bool;

    /// Settle a registered chunk with a failure.
    ///
    /// Returns `false` for unknown identifiers and already settled records.
    fn reject(&self, id: &ChunkId, failure: ChunkFailure) -> bool;

    /// Drop every record.
    fn clear(&self);
}

/// Read boundary for chunk lookups. Lookups never wait.
pub trait ChunkReader: Send + Sync {
    /// State of a chunk; unknown identifiers read as `Pending`.
    fn state(&self, id: &ChunkId) -> ChunkState;

    /// Resolved value, if the chunk is loaded.
    fn value(&self, id: &ChunkId) -> Option<Value>;

    /// Failure, if the chunk was rejected.
    fn error(&self, id: &ChunkId) -> Option<ChunkFailure>;

    /// `true` iff the chunk is loaded (not merely settled).
    fn is_resolved(&self, id: &ChunkId) -> bool {
        self.state(id) == ChunkState::Loaded
    }

    /// `true` iff at least one registered chunk is not loaded.
    fn has_unresolved_work(&self) -> bool;

    /// Snapshot of every record's state, in identifier order.
    fn states(&self) -> BTreeMap<ChunkId, ChunkState>;

    /// Every loaded identifier, in order.
    fn resolved_ids(&self) -> BTreeSet<ChunkId>;

    /// Counter bumped each time the reader's records are cleared.
    fn generation(&self) -> u64;
}

/// A ledger that can be both read and written, e.g. by an ingestion loop
/// that reports the state it leaves behind.
pub trait ChunkStore: ChunkReader + ChunkWriter {}

impl<T: ChunkReader + ChunkWriter + ?Sized> ChunkStore for T {}
