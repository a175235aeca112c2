//! High-level SDK for Hydra.
//!
//! Wires one ledger, resolver, and processor together behind a document
//! façade. This is the main entry point for applications hydrating
//! documents.
//!
//! - [`HydratedDocument`]: a mapping document whose placeholders fill in
//!   as chunks arrive
//! - [`TypedObject`]: a hydrated document plus a deserializer into `T` and
//!   optional per-chunk [`ChunkField`]s

pub mod config;
pub mod document;
pub mod error;
pub mod field;
pub mod object;

pub use config::HydraConfig;
pub use document::HydratedDocument;
pub use error::{ConversionError, SdkError, SdkResult};
pub use field::{ChunkField, FieldDecoding, FieldHandle};
pub use object::{FieldUpdate, TypedObject};

// Re-export key types
pub use hydra_ledger::{ChunkLedger, ChunkReader, ChunkWriter};
pub use hydra_processor::{ProcessorConfig, StreamSummary, UpdateEvent};
pub use hydra_resolver::{PlaceholderGrammar, ResolverConfig};
pub use hydra_types::{Batch, ChunkFailure, ChunkId, ChunkState};
