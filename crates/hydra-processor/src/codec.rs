use hydra_types::Batch;
use serde_json::Value;

use crate::error::{ProcessorError, Result};

/// Decodes one encoded item from a chunk source into a batch.
pub trait BatchDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Batch>;
}

/// Decodes a single top-level JSON object, e.g. `{"1": "hello"}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBatchDecoder;

impl BatchDecoder for JsonBatchDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Batch> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| ProcessorError::Decode {
            reason: e.to_string(),
        })?;

        match value {
            Value::Object(batch) => Ok(batch),
            other => Err(ProcessorError::Decode {
                reason: format!("expected a JSON object, found {}", kind_name(&other)),
            }),
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
