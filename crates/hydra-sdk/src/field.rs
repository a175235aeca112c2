use std::fmt;
use std::sync::Arc;

use hydra_types::{ChunkFailure, ChunkId, ChunkState};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ConversionError, SdkError, SdkResult};

type Converter<T> = Arc<dyn Fn(&Value) -> Result<T, ConversionError> + Send + Sync>;

/// How a field turns its raw chunk value into `T`.
pub enum FieldDecoding<T> {
    /// Deserialize the raw value into `T` with serde.
    Strict,
    /// Hand the raw value to a caller-supplied converter.
    Converter(Converter<T>),
}

impl<T> Clone for FieldDecoding<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Strict => Self::Strict,
            Self::Converter(f) => Self::Converter(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for FieldDecoding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("Strict"),
            Self::Converter(_) => f.write_str("Converter(..)"),
        }
    }
}

#[derive(Clone, Debug)]
enum FieldSlot<T> {
    Pending,
    Loaded(T),
    Failed(ChunkFailure),
}

impl<T> FieldSlot<T> {
    fn state(&self) -> ChunkState {
        match self {
            Self::Pending => ChunkState::Pending,
            Self::Loaded(_) => ChunkState::Loaded,
            Self::Failed(_) => ChunkState::Error,
        }
    }

    fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }
}

/// One placeholder's value, converted to `T`, tracked outside the ledger.
///
/// Follows the same `pending -> loaded | error` machine as a ledger
/// record, driven by whoever pushes the raw chunk value into it. A
/// conversion failure settles the field as `Error`.
pub struct ChunkField<T> {
    chunk_id: ChunkId,
    decoding: FieldDecoding<T>,
    slot: watch::Sender<FieldSlot<T>>,
}

impl<T> ChunkField<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// A field that deserializes its chunk strictly into `T`.
    pub fn new(chunk_id: ChunkId) -> Self {
        Self::with_decoding(chunk_id, FieldDecoding::Strict)
    }

    /// A field that converts its chunk with `converter`.
    pub fn with_converter<F>(chunk_id: ChunkId, converter: F) -> Self
    where
        F: Fn(&Value) -> Result<T, ConversionError> + Send + Sync + 'static,
    {
        Self::with_decoding(chunk_id, FieldDecoding::Converter(Arc::new(converter)))
    }

    pub fn with_decoding(chunk_id: ChunkId, decoding: FieldDecoding<T>) -> Self {
        let (slot, _) = watch::channel(FieldSlot::Pending);
        Self {
            chunk_id,
            decoding,
            slot,
        }
    }

    pub fn chunk_id(&self) -> &ChunkId {
        &self.chunk_id
    }

    pub fn decoding(&self) -> &FieldDecoding<T> {
        &self.decoding
    }

    /// Convert and store a raw chunk value. Returns `false` if the field
    /// had already settled.
    pub fn push(&self, raw: &Value) -> bool {
        if self.slot.borrow().is_settled() {
            debug!(chunk = %self.chunk_id, "ignoring push to settled field");
            return false;
        }

        let next = match self.convert(raw) {
            Ok(value) => FieldSlot::Loaded(value),
            Err(error) => {
                debug!(chunk = %self.chunk_id, error = %error, "field conversion failed");
                FieldSlot::Failed(ChunkFailure::new(error.to_string()))
            }
        };
        self.settle(next)
    }

    /// Settle the field as failed. Returns `false` if already settled.
    pub fn fail(&self, failure: ChunkFailure) -> bool {
        self.settle(FieldSlot::Failed(failure))
    }

    pub fn state(&self) -> ChunkState {
        self.slot.borrow().state()
    }

    pub fn value(&self) -> Option<T> {
        match &*self.slot.borrow() {
            FieldSlot::Loaded(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<ChunkFailure> {
        match &*self.slot.borrow() {
            FieldSlot::Failed(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Wait for the field to settle.
    pub async fn wait(&self) -> SdkResult<T> {
        let mut rx = self.slot.subscribe();
        let slot = rx
            .wait_for(FieldSlot::is_settled)
            .await
            .map(|slot| (*slot).clone())
            .map_err(|_| SdkError::FieldDropped {
                id: self.chunk_id.clone(),
            })?;

        match slot {
            FieldSlot::Loaded(value) => Ok(value),
            FieldSlot::Failed(failure) => Err(SdkError::FieldFailed {
                id: self.chunk_id.clone(),
                failure,
            }),
            FieldSlot::Pending => unreachable!("wait_for only yields settled slots"),
        }
    }

    fn convert(&self, raw: &Value) -> Result<T, ConversionError> {
        match &self.decoding {
            FieldDecoding::Strict => Ok(serde_json::from_value(raw.clone())?),
            FieldDecoding::Converter(convert) => convert(raw),
        }
    }

    fn settle(&self, next: FieldSlot<T>) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_settled() {
                return false;
            }
            *slot = next;
            true
        })
    }
}

/// Type-erased view of a [`ChunkField`], used by [`crate::TypedObject`] to
/// drive fields of different value types.
pub trait FieldHandle: Send + Sync {
    fn chunk_id(&self) -> &ChunkId;
    fn push(&self, raw: &Value) -> bool;
    fn fail(&self, failure: ChunkFailure) -> bool;
    fn state(&self) -> ChunkState;
    fn error(&self) -> Option<ChunkFailure>;
}

impl<T> FieldHandle for ChunkField<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn chunk_id(&self) -> &ChunkId {
        ChunkField::chunk_id(self)
    }

    fn push(&self, raw: &Value) -> bool {
        ChunkField::push(self, raw)
    }

    fn fail(&self, failure: ChunkFailure) -> bool {
        ChunkField::fail(self, failure)
    }

    fn state(&self) -> ChunkState {
        ChunkField::state(self)
    }

    fn error(&self) -> Option<ChunkFailure> {
        ChunkField::error(self)
    }
}
