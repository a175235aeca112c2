use hydra_types::{ChunkFailure, ChunkId};
use thiserror::Error;

/// A raw chunk or document value could not be converted into the target type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conversion failed: {message}")]
pub struct ConversionError {
    pub message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ConversionError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("document root must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("document has unresolved placeholders: {}", join_ids(.pending))]
    Incomplete { pending: Vec<ChunkId> },

    #[error("field for chunk {id} failed: {failure}")]
    FieldFailed { id: ChunkId, failure: ChunkFailure },

    #[error("field for chunk {id} was dropped before it settled")]
    FieldDropped { id: ChunkId },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger error: {0}")]
    Ledger(#[from] hydra_ledger::LedgerError),

    #[error("resolver error: {0}")]
    Resolver(#[from] hydra_resolver::ResolverError),

    #[error("processor error: {0}")]
    Processor(#[from] hydra_processor::ProcessorError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

pub type SdkResult<T> = Result<T, SdkError>;

fn join_ids(ids: &[ChunkId]) -> String {
    ids.iter()
        .map(ChunkId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
