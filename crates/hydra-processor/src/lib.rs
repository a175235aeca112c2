//! Chunk ingestion for Hydra.
//!
//! The [`ChunkProcessor`] is the front door for chunk data. Every accepted
//! batch is written into the ledger and then delivered to every
//! subscriber, so subscribers always observe a ledger that already contains
//! the batch they are reacting to. Decode and batch failures become
//! [`UpdateEvent::Error`] events instead of aborting ingestion.

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod processor;

pub use codec::{BatchDecoder, JsonBatchDecoder};
pub use config::{ProcessorConfig, DEFAULT_MAX_ITEM_BYTES};
pub use error::ProcessorError;
pub use event::UpdateEvent;
pub use processor::{ChunkProcessor, StreamSummary};
