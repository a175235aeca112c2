use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use futures::Stream;
use hydra_ledger::{ChunkLedger, ChunkReader, ChunkWriter};
use hydra_processor::{ChunkProcessor, StreamSummary, UpdateEvent};
use hydra_resolver::PlaceholderResolver;
use hydra_types::{Batch, ChunkId, ChunkState};
use serde_json::Value;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::HydraConfig;
use crate::error::{SdkError, SdkResult};

/// A mapping document whose placeholders fill in as chunks arrive.
///
/// Owns one ledger, resolver, and processor. Every placeholder in the
/// document is registered on construction, so the ledger knows which
/// chunks are still outstanding.
///
/// Reads never wait: [`Self::get`] and [`Self::resolved`] return the best
/// currently known answer, with pending placeholders left as their
/// placeholder strings. Use [`Self::get_async`] or [`Self::wait_for_all`]
/// to wait for chunks.
pub struct HydratedDocument {
    document: RwLock<Value>,
    ledger: Arc<ChunkLedger>,
    resolver: PlaceholderResolver,
    processor: ChunkProcessor,
}

impl HydratedDocument {
    /// Wrap a document using the default configuration.
    pub fn new(document: Value) -> SdkResult<Self> {
        Self::with_config(document, &HydraConfig::default())
    }

    /// Wrap a document. The root must be a JSON object.
    pub fn with_config(document: Value, config: &HydraConfig) -> SdkResult<Self> {
        if !document.is_object() {
            return Err(SdkError::NotAnObject(kind_name(&document)));
        }

        let ledger = Arc::new(ChunkLedger::new());
        let resolver = PlaceholderResolver::from_config(&config.resolver)?;
        let processor = ChunkProcessor::with_config(ledger.clone(), &config.processor);

        let ids = resolver.find_all_ids(&document);
        for id in &ids {
            ledger.register(id.clone());
        }
        debug!(placeholders = ids.len(), "document hydration started");

        Ok(Self {
            document: RwLock::new(document),
            ledger,
            resolver,
            processor,
        })
    }

    pub fn ledger(&self) -> &ChunkLedger {
        &self.ledger
    }

    pub fn resolver(&self) -> &PlaceholderResolver {
        &self.resolver
    }

    pub fn processor(&self) -> &ChunkProcessor {
        &self.processor
    }

    /// The document as constructed (plus any [`Self::set`] assignments),
    /// placeholders untouched.
    pub fn raw(&self) -> Value {
        self.read().clone()
    }

    /// Top-level keys, in document order.
    pub fn keys(&self) -> Vec<String> {
        self.read()
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().get(key).is_some()
    }

    /// Current value of one key, with loaded placeholders substituted.
    pub fn get(&self, key: &str) -> Option<Value> {
        let document = self.read();
        let value = document.get(key)?;
        Some(self.resolver.resolve_value(value, self.ledger.as_ref()))
    }

    /// Wait for every placeholder under `key` to settle, then read it.
    ///
    /// Fails if any of those chunks was rejected.
    pub async fn get_async(&self, key: &str) -> SdkResult<Option<Value>> {
        let ids = match self.read().get(key) {
            Some(value) => self.resolver.find_all_ids(value),
            None => return Ok(None),
        };
        self.ledger.await_all(&ids).await?;
        Ok(self.get(key))
    }

    /// Snapshot of the whole document with loaded placeholders substituted.
    pub fn resolved(&self) -> Value {
        let document = self.read();
        self.resolver
            .resolve_placeholders(&document, self.ledger.as_ref(), true)
    }

    /// Like [`Self::resolved`], but fails while any placeholder is not loaded.
    pub fn try_resolved(&self) -> SdkResult<Value> {
        let pending = self.pending_ids();
        if !pending.is_empty() {
            return Err(SdkError::Incomplete { pending });
        }
        Ok(self.resolved())
    }

    /// Wait until every placeholder currently in the document has settled,
    /// then return the resolved document.
    ///
    /// Does not complete on the first chunk's arrival; a rejected chunk is
    /// reported only once all chunks have settled.
    pub async fn wait_for_all(&self) -> SdkResult<Value> {
        let ids = self.placeholder_ids();
        self.ledger.await_all(&ids).await?;
        Ok(self.resolved())
    }

    /// Every chunk identifier referenced in the document.
    pub fn placeholder_ids(&self) -> BTreeSet<ChunkId> {
        self.resolver.find_all_ids(&self.read())
    }

    /// Identifiers referenced in the document that are not loaded yet.
    pub fn pending_ids(&self) -> Vec<ChunkId> {
        self.placeholder_ids()
            .into_iter()
            .filter(|id| !self.ledger.is_resolved(id))
            .collect()
    }

    /// `true` once every placeholder currently in the document is loaded.
    ///
    /// Chunks the ledger still tracks for placeholders that [`Self::set`]
    /// has since overwritten do not count.
    pub fn is_fully_hydrated(&self) -> bool {
        self.placeholder_ids()
            .iter()
            .all(|id| self.ledger.is_resolved(id))
    }

    /// Like [`Self::is_fully_hydrated`], judged against a recorded state
    /// snapshot such as the one carried by an [`UpdateEvent`].
    pub fn is_hydrated_in(&self, states: &BTreeMap<ChunkId, ChunkState>) -> bool {
        self.placeholder_ids()
            .iter()
            .all(|id| states.get(id) == Some(&ChunkState::Loaded))
    }

    pub fn state(&self, id: &ChunkId) -> ChunkState {
        self.ledger.state(id)
    }

    /// Assign a top-level key directly. Placeholders in `value` are
    /// registered like those present at construction.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        for id in self.resolver.find_all_ids(&value) {
            self.ledger.register(id);
        }
        let mut document = self.document.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(map) = document.as_object_mut() {
            map.insert(key.into(), value);
        }
    }

    pub fn process_batch(&self, batch: Batch) -> SdkResult<()> {
        Ok(self.processor.process_batch(batch)?)
    }

    pub async fn process_encoded_stream<S, T>(&self, stream: S) -> SdkResult<StreamSummary>
    where
        S: Stream<Item = T>,
        T: AsRef<[u8]>,
    {
        Ok(self.processor.process_encoded_stream(stream).await?)
    }

    pub async fn process_lines<R>(&self, reader: R) -> SdkResult<StreamSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        Ok(self.processor.process_lines(reader).await?)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UpdateEvent> {
        self.processor.subscribe()
    }

    pub fn updates(&self) -> impl Stream<Item = UpdateEvent> + Send + Unpin + 'static {
        self.processor.updates()
    }

    /// Forget every chunk and cached resolution.
    ///
    /// The document's placeholders are registered again, so the document
    /// reads as freshly constructed.
    pub fn clear(&self) {
        self.ledger.clear();
        self.resolver.clear_cache();
        for id in self.placeholder_ids() {
            self.ledger.register(id);
        }
        info!("document hydration reset");
    }

    /// Close the update channel. No further batches are accepted.
    pub fn close(&self) {
        self.processor.close();
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.document.read().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
