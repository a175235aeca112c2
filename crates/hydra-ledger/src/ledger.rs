use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use hydra_types::{ChunkFailure, ChunkId, ChunkState};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::error::LedgerError;
use crate::slot::ChunkSlot;
use crate::traits::{ChunkReader, ChunkWriter};

/// In-memory chunk ledger.
///
/// Each record is a `watch` channel holding the chunk's [`ChunkSlot`]. The
/// channel is both the stored state and the wait-handle: synchronous
/// readers borrow the current slot, waiters subscribe and block until the
/// slot settles. Every waiter observes the same settlement.
pub struct ChunkLedger {
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    records: HashMap<ChunkId, watch::Sender<ChunkSlot>>,
    resolved: BTreeSet<ChunkId>,
    generation: u64,
}

impl ChunkLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
        }
    }

    /// Number of records (pending or settled).
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Returns `true` if a record exists for `id`.
    pub fn contains(&self, id: &ChunkId) -> bool {
        self.read().records.contains_key(id)
    }

    /// Registered identifiers that have not settled yet, in order.
    pub fn pending_ids(&self) -> Vec<ChunkId> {
        let state = self.read();
        let mut ids: Vec<_> = state
            .records
            .iter()
            .filter(|(_, tx)| !tx.borrow().is_settled())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Wait for a chunk to settle.
    ///
    /// Resolves to `Ok(None)` immediately for identifiers the ledger has
    /// never seen. Otherwise waits until the chunk is loaded (`Ok(Some)`)
    /// or rejected (`Err(ChunkRejected)`). A wait on a chunk that never
    /// settles never completes; layer a timeout on top if needed.
    pub async fn await_chunk(&self, id: &ChunkId) -> Result<Option<Value>, LedgerError> {
        let mut rx = {
            let state = self.read();
            match state.records.get(id) {
                Some(tx) => tx.subscribe(),
                None => return Ok(None),
            }
        };

        let slot = rx
            .wait_for(ChunkSlot::is_settled)
            .await
            .map(|slot| (*slot).clone())
            .map_err(|_| LedgerError::Cleared { id: id.clone() })?;

        match slot {
            ChunkSlot::Loaded(value) => Ok(Some(value)),
            ChunkSlot::Failed(failure) => Err(LedgerError::ChunkRejected {
                id: id.clone(),
                failure,
            }),
            ChunkSlot::Pending => unreachable!("wait_for only yields settled slots"),
        }
    }

    /// Wait until every listed chunk has settled.
    ///
    /// Does not return early on the first rejection: all chunks must reach
    /// a terminal state first. The first rejection in identifier order is
    /// then reported. Unknown identifiers are skipped.
    pub async fn await_all(
        &self,
        ids: &BTreeSet<ChunkId>,
    ) -> Result<BTreeMap<ChunkId, Value>, LedgerError> {
        let outcomes = join_all(ids.iter().map(|id| self.await_chunk(id))).await;

        let mut values = BTreeMap::new();
        for (id, outcome) in ids.iter().zip(outcomes) {
            if let Some(value) = outcome? {
                values.insert(id.clone(), value);
            }
        }
        Ok(values)
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChunkLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkWriter for ChunkLedger {
    fn register(&self, id: ChunkId) {
        let mut state = self.write();
        if state.records.contains_key(&id) {
            return;
        }
        trace!(chunk = %id, "chunk registered");
        let (tx, _) = watch::channel(ChunkSlot::Pending);
        state.records.insert(id, tx);
    }

    fn resolve(&self, id: ChunkId, data: Value) -> bool {
        let mut state = self.write();
        let tx = state
            .records
            .entry(id.clone())
            .or_insert_with(|| watch::channel(ChunkSlot::Pending).0);

        let settled = tx.send_if_modified(|slot| slot.settle(ChunkSlot::Loaded(data)));
        if settled {
            state.resolved.insert(id.clone());
            debug!(chunk = %id, "chunk loaded");
        } else {
            debug!(chunk = %id, "ignoring resolve of settled chunk");
        }
        settled
    }

    fn reject(&self, id: &ChunkId, failure: ChunkFailure) -> bool {
        let state = self.write();
        let Some(tx) = state.records.get(id) else {
            debug!(chunk = %id, "ignoring reject of unknown chunk");
            return false;
        };

        let message = failure.message.clone();
        let settled = tx.send_if_modified(|slot| slot.settle(ChunkSlot::Failed(failure)));
        if settled {
            debug!(chunk = %id, error = %message, "chunk rejected");
        } else {
            debug!(chunk = %id, "ignoring reject of settled chunk");
        }
        settled
    }

    fn clear(&self) {
        let mut state = self.write();
        let dropped = state.records.len();
        let generation = state.generation.wrapping_add(1);
        *state = LedgerState {
            generation,
            ..LedgerState::default()
        };
        info!(dropped, generation, "ledger cleared");
    }
}

impl ChunkReader for ChunkLedger {
    fn state(&self, id: &ChunkId) -> ChunkState {
        self.read()
            .records
            .get(id)
            .map(|tx| tx.borrow().state())
            .unwrap_or(ChunkState::Pending)
    }

    fn value(&self, id: &ChunkId) -> Option<Value> {
        self.read()
            .records
            .get(id)
            .and_then(|tx| tx.borrow().value().cloned())
    }

    fn error(&self, id: &ChunkId) -> Option<ChunkFailure> {
        self.read()
            .records
            .get(id)
            .and_then(|tx| tx.borrow().failure().cloned())
    }

    fn has_unresolved_work(&self) -> bool {
        let state = self.read();
        state.resolved.len() < state.records.len()
    }

    fn states(&self) -> BTreeMap<ChunkId, ChunkState> {
        self.read()
            .records
            .iter()
            .map(|(id, tx)| (id.clone(), tx.borrow().state()))
            .collect()
    }

    fn resolved_ids(&self) -> BTreeSet<ChunkId> {
        self.read().resolved.clone()
    }

    fn generation(&self) -> u64 {
        self.read().generation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use serde_json::json;

    fn id(s: &str) -> ChunkId {
        ChunkId::parse(s).unwrap()
    }

    #[test]
    fn unknown_chunk_reads_as_pending() {
        let ledger = ChunkLedger::new();
        assert_eq!(ledger.state(&id("1")), ChunkState::Pending);
        assert_eq!(ledger.value(&id("1")), None);
        assert!(!ledger.is_resolved(&id("1")));
        assert!(!ledger.has_unresolved_work());
    }

    #[test]
    fn register_is_idempotent() {
        let ledger = ChunkLedger::new();
        ledger.register(id("1"));
        ledger.resolve(id("1"), json!("a"));
        ledger.register(id("1"));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.state(&id("1")), ChunkState::Loaded);
        assert_eq!(ledger.value(&id("1")), Some(json!("a")));
    }

    #[tokio::test]
    async fn register_keeps_waiters_in_flight() {
        let ledger = Arc::new(ChunkLedger::new());
        ledger.register(id("1"));

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.await_chunk(&id("1")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        ledger.register(id("1"));
        assert_eq!(ledger.state(&id("1")), ChunkState::Pending);
        ledger.resolve(id("1"), json!("a"));

        assert_eq!(waiter.await.unwrap(), Ok(Some(json!("a"))));
    }

    #[test]
    fn first_write_wins() {
        let ledger = ChunkLedger::new();
        ledger.register(id("1"));
        assert!(ledger.resolve(id("1"), json!("a")));
        assert!(!ledger.resolve(id("1"), json!("b")));
        assert!(!ledger.reject(&id("1"), ChunkFailure::new("late")));

        assert_eq!(ledger.value(&id("1")), Some(json!("a")));
        assert_eq!(ledger.state(&id("1")), ChunkState::Loaded);
    }

    #[test]
    fn resolve_registers_unknown_chunk() {
        let ledger = ChunkLedger::new();
        assert!(ledger.resolve(id("9"), json!({"k": 1})));
        assert!(ledger.contains(&id("9")));
        assert!(ledger.is_resolved(&id("9")));
    }

    #[test]
    fn reject_of_unknown_chunk_is_ignored() {
        let ledger = ChunkLedger::new();
        assert!(!ledger.reject(&id("1"), ChunkFailure::new("boom")));
        assert!(!ledger.contains(&id("1")));
        assert_eq!(ledger.state(&id("1")), ChunkState::Pending);
    }

    #[test]
    fn rejected_chunk_stays_rejected() {
        let ledger = ChunkLedger::new();
        ledger.register(id("1"));
        assert!(ledger.reject(&id("1"), ChunkFailure::new("boom")));
        assert!(!ledger.resolve(id("1"), json!("late")));

        assert_eq!(ledger.state(&id("1")), ChunkState::Error);
        assert_eq!(ledger.value(&id("1")), None);
        assert_eq!(ledger.error(&id("1")), Some(ChunkFailure::new("boom")));
        assert!(!ledger.is_resolved(&id("1")));
    }

    #[test]
    fn unresolved_work_tracks_registered_chunks() {
        let ledger = ChunkLedger::new();
        ledger.register(id("1"));
        ledger.register(id("2"));
        ledger.resolve(id("1"), json!("x"));
        assert!(ledger.has_unresolved_work());
        assert_eq!(ledger.pending_ids(), vec![id("2")]);

        ledger.resolve(id("2"), json!("y"));
        assert!(!ledger.has_unresolved_work());
        assert!(ledger.pending_ids().is_empty());
    }

    #[test]
    fn rejected_chunk_counts_as_unresolved() {
        let ledger = ChunkLedger::new();
        ledger.register(id("1"));
        ledger.reject(&id("1"), ChunkFailure::new("boom"));
        assert!(ledger.has_unresolved_work());
    }

    #[test]
    fn clear_resets_records_and_bumps_generation() {
        let ledger = ChunkLedger::new();
        ledger.resolve(id("1"), json!(1));
        assert_eq!(ledger.generation(), 0);

        ledger.clear();
        assert!(ledger.is_empty());
        assert!(ledger.resolved_ids().is_empty());
        assert_eq!(ledger.state(&id("1")), ChunkState::Pending);
        assert_eq!(ledger.generation(), 1);
    }

    #[test]
    fn states_snapshot_is_ordered() {
        let ledger = ChunkLedger::new();
        ledger.register(id("b"));
        ledger.resolve(id("a"), json!(1));
        let states: Vec<_> = ledger.states().into_iter().collect();
        assert_eq!(
            states,
            vec![(id("a"), ChunkState::Loaded), (id("b"), ChunkState::Pending)]
        );
    }

    #[tokio::test]
    async fn await_unknown_chunk_is_immediate() {
        let ledger = ChunkLedger::new();
        assert_eq!(ledger.await_chunk(&id("1")).await, Ok(None));
    }

    #[tokio::test]
    async fn await_settled_chunk_is_immediate() {
        let ledger = ChunkLedger::new();
        ledger.resolve(id("1"), json!("a"));
        ledger.resolve(id("1"), json!("b"));
        assert_eq!(ledger.await_chunk(&id("1")).await, Ok(Some(json!("a"))));
    }

    #[tokio::test]
    async fn many_waiters_observe_the_same_value() {
        let ledger = Arc::new(ChunkLedger::new());
        ledger.register(id("1"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move { ledger.await_chunk(&id("1")).await }));
        }

        tokio::task::yield_now().await;
        ledger.resolve(id("1"), json!("hello"));

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(Some(json!("hello"))));
        }
    }

    #[tokio::test]
    async fn waiters_receive_rejection() {
        let ledger = Arc::new(ChunkLedger::new());
        ledger.register(id("1"));

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.await_chunk(&id("1")).await })
        };

        tokio::task::yield_now().await;
        ledger.reject(&id("1"), ChunkFailure::new("boom"));

        assert_eq!(
            waiter.await.unwrap(),
            Err(LedgerError::ChunkRejected {
                id: id("1"),
                failure: ChunkFailure::new("boom"),
            })
        );
        // Later waiters see the same outcome.
        assert!(matches!(
            ledger.await_chunk(&id("1")).await,
            Err(LedgerError::ChunkRejected { .. })
        ));
    }

    #[tokio::test]
    async fn clear_releases_waiters() {
        let ledger = Arc::new(ChunkLedger::new());
        ledger.register(id("1"));

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.await_chunk(&id("1")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        ledger.clear();

        assert_eq!(
            waiter.await.unwrap(),
            Err(LedgerError::Cleared { id: id("1") })
        );
    }

    #[tokio::test]
    async fn await_all_waits_for_every_chunk() {
        let ledger = Arc::new(ChunkLedger::new());
        ledger.register(id("1"));
        ledger.register(id("2"));
        let ids: BTreeSet<_> = [id("1"), id("2")].into_iter().collect();

        let waiter = {
            let ledger = Arc::clone(&ledger);
            let ids = ids.clone();
            tokio::spawn(async move { ledger.await_all(&ids).await })
        };

        ledger.resolve(id("1"), json!("a"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        ledger.resolve(id("2"), json!("b"));
        let values = waiter.await.unwrap().unwrap();
        assert_eq!(values.get(&id("1")), Some(&json!("a")));
        assert_eq!(values.get(&id("2")), Some(&json!("b")));
    }

    #[tokio::test]
    async fn await_all_reports_rejection_after_everything_settles() {
        let ledger = Arc::new(ChunkLedger::new());
        ledger.register(id("1"));
        ledger.register(id("2"));
        let ids: BTreeSet<_> = [id("1"), id("2")].into_iter().collect();

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.await_all(&ids).await })
        };

        ledger.reject(&id("1"), ChunkFailure::new("boom"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        ledger.resolve(id("2"), json!("b"));
        assert!(matches!(
            waiter.await.unwrap(),
            Err(LedgerError::ChunkRejected { id: failed, .. }) if failed == id("1")
        ));
    }
}
