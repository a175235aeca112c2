use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use futures::{future, stream, Stream, StreamExt};
use hydra_ledger::{ChunkReader, ChunkWriter};
use hydra_processor::{StreamSummary, UpdateEvent};
use hydra_types::{Batch, ChunkFailure, ChunkId, ChunkState};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncBufRead;
use tracing::{debug, warn};

use crate::config::HydraConfig;
use crate::document::HydratedDocument;
use crate::error::{ConversionError, SdkResult};
use crate::field::{ChunkField, FieldHandle};

type Deserializer<T> = Arc<dyn Fn(&Value) -> Result<T, ConversionError> + Send + Sync>;
type FieldTable = Arc<RwLock<BTreeMap<String, Arc<dyn FieldHandle>>>>;
type FieldIndex = Arc<RwLock<HashMap<ChunkId, String>>>;

/// A field touched by a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate {
    pub field: String,
    pub chunk_id: ChunkId,
    pub state: ChunkState,
}

/// A [`HydratedDocument`] read back as `T`.
///
/// Named [`ChunkField`]s can be attached to individual chunk identifiers;
/// every batch that carries one of those identifiers is pushed into the
/// matching field as well as into the document.
pub struct TypedObject<T> {
    document: Arc<HydratedDocument>,
    deserializer: Deserializer<T>,
    fields: FieldTable,
    field_index: FieldIndex,
}

impl<T> TypedObject<T>
where
    T: Send + 'static,
{
    pub fn new<F>(document: Value, deserializer: F) -> SdkResult<Self>
    where
        F: Fn(&Value) -> Result<T, ConversionError> + Send + Sync + 'static,
    {
        Self::with_config(document, &HydraConfig::default(), deserializer)
    }

    pub fn with_config<F>(document: Value, config: &HydraConfig, deserializer: F) -> SdkResult<Self>
    where
        F: Fn(&Value) -> Result<T, ConversionError> + Send + Sync + 'static,
    {
        Ok(Self {
            document: Arc::new(HydratedDocument::with_config(document, config)?),
            deserializer: Arc::new(deserializer),
            fields: Arc::default(),
            field_index: Arc::default(),
        })
    }

    /// Read the document back with serde.
    pub fn strict(document: Value) -> SdkResult<Self>
    where
        T: DeserializeOwned,
    {
        Self::new(document, |value| Ok(serde_json::from_value(value.clone())?))
    }

    pub fn document(&self) -> &HydratedDocument {
        &self.document
    }

    /// Attach a field under `name`, replacing any field of the same name.
    ///
    /// The field's chunk is registered with the ledger. A chunk that has
    /// already settled is pushed into the field straight away.
    pub fn add_field<F>(&self, name: impl Into<String>, field: ChunkField<F>) -> Arc<ChunkField<F>>
    where
        F: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let name = name.into();
        let field = Arc::new(field);
        let id = field.chunk_id().clone();

        let ledger = self.document.ledger();
        ledger.register(id.clone());
        sync_field(&*field, ledger);

        let handle: Arc<dyn FieldHandle> = field.clone();
        let previous = self
            .fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), handle);
        {
            let mut index = self.field_index.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = previous {
                index.remove(previous.chunk_id());
            }
            index.insert(id.clone(), name.clone());
        }
        debug!(field = %name, chunk = %id, "field attached");

        field
    }

    pub fn field(&self, name: &str) -> Option<Arc<dyn FieldHandle>> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Push matching entries into their fields, then hand the batch to the
    /// document.
    pub fn process_batch(&self, batch: Batch) -> SdkResult<()> {
        for update in push_to_fields(&batch, &self.fields, &self.field_index) {
            debug!(field = %update.field, state = %update.state, "field updated");
        }
        self.document.process_batch(batch)
    }

    /// Feed an encoded stream through the document. Fields are brought up to
    /// date with the ledger once the stream ends.
    pub async fn process_encoded_stream<S, B>(&self, stream: S) -> SdkResult<StreamSummary>
    where
        S: Stream<Item = B>,
        B: AsRef<[u8]>,
    {
        let summary = self.document.process_encoded_stream(stream).await;
        self.sync_fields();
        summary
    }

    pub async fn process_lines<R>(&self, reader: R) -> SdkResult<StreamSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let summary = self.document.process_lines(reader).await;
        self.sync_fields();
        summary
    }

    /// Reject a chunk in the ledger and fail any field attached to it.
    pub fn reject(&self, id: &ChunkId, failure: ChunkFailure) -> bool {
        let rejected = self.document.ledger().reject(id, failure.clone());
        if let Some(field) = self.field_for(id) {
            field.fail(failure);
        }
        rejected
    }

    /// Deserialize the current resolved document. Pending placeholders are
    /// still placeholder strings, so the deserializer sees a partial value.
    pub fn value(&self) -> Result<T, ConversionError> {
        (self.deserializer)(&self.document.resolved())
    }

    /// Wait for every placeholder to settle, then deserialize.
    pub async fn wait_for_value(&self) -> SdkResult<T> {
        let resolved = self.document.wait_for_all().await?;
        Ok((self.deserializer)(&resolved)?)
    }

    /// Every processor event, unchanged.
    pub fn raw_updates(&self) -> impl Stream<Item = UpdateEvent> + Send + 'static {
        self.document.updates()
    }

    /// One [`FieldUpdate`] per attached field touched by a batch.
    pub fn field_updates(&self) -> impl Stream<Item = FieldUpdate> + Send + 'static {
        let fields = Arc::clone(&self.fields);
        let index = Arc::clone(&self.field_index);
        self.document.updates().flat_map(move |event| {
            let updates = match event.as_batch() {
                Some(batch) => push_to_fields(batch, &fields, &index),
                None => Vec::new(),
            };
            stream::iter(updates)
        })
    }

    /// A fresh `T` after each batch that leaves the document fully hydrated.
    ///
    /// Hydration is judged from the state snapshot taken when the batch was
    /// published, so a consumer that falls behind still gets one value per
    /// qualifying batch and none for earlier ones. Values the deserializer
    /// rejects are skipped.
    pub fn resolved_updates(&self) -> impl Stream<Item = T> + Send + 'static {
        let document = Arc::clone(&self.document);
        let deserializer = Arc::clone(&self.deserializer);
        self.document.updates().filter_map(move |event| {
            let value = match event.states() {
                Some(states) if document.is_hydrated_in(states) => {
                    match deserializer(&document.resolved()) {
                        Ok(value) => Some(value),
                        Err(error) => {
                            warn!(error = %error, "hydrated document failed to deserialize");
                            None
                        }
                    }
                }
                _ => None,
            };
            future::ready(value)
        })
    }

    /// Every chunk's state as it stood right after each batch.
    pub fn state_updates(&self) -> impl Stream<Item = BTreeMap<ChunkId, ChunkState>> + Send + 'static {
        self.document
            .updates()
            .filter_map(|event| future::ready(event.states().cloned()))
    }

    /// Reset the document and detach every field.
    pub fn clear(&self) {
        self.document.clear();
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.field_index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn close(&self) {
        self.document.close();
    }

    fn field_for(&self, id: &ChunkId) -> Option<Arc<dyn FieldHandle>> {
        let name = self
            .field_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()?;
        self.field(&name)
    }

    fn sync_fields(&self) {
        let ledger = self.document.ledger();
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        for field in fields.values() {
            sync_field(&**field, ledger);
        }
    }
}

/// Bring a pending field in line with its settled ledger record.
fn sync_field<R: ChunkReader + ?Sized>(field: &dyn FieldHandle, ledger: &R) {
    if field.state().is_terminal() {
        return;
    }
    let id = field.chunk_id();
    match ledger.state(id) {
        ChunkState::Loaded => {
            if let Some(value) = ledger.value(id) {
                field.push(&value);
            }
        }
        ChunkState::Error => {
            if let Some(failure) = ledger.error(id) {
                field.fail(failure);
            }
        }
        ChunkState::Pending => {}
    }
}

fn push_to_fields(batch: &Batch, fields: &FieldTable, index: &FieldIndex) -> Vec<FieldUpdate> {
    let index = index.read().unwrap_or_else(PoisonError::into_inner);
    let fields = fields.read().unwrap_or_else(PoisonError::into_inner);

    let mut updates = Vec::new();
    for (key, raw) in batch {
        let Ok(id) = ChunkId::parse(key.as_str()) else {
            continue;
        };
        let Some(name) = index.get(&id) else {
            continue;
        };
        let Some(field) = fields.get(name) else {
            continue;
        };
        field.push(raw);
        updates.push(FieldUpdate {
            field: name.clone(),
            chunk_id: id,
            state: field.state(),
        });
    }
    updates
}
