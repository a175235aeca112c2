//! Chunk ledger for Hydra.
//!
//! The ledger is the state-tracking hub of hydration. It provides:
//! - Per-identifier lifecycle (`pending -> loaded | error`), first write wins
//! - Resolved-value storage for synchronous lookups
//! - One shared wait-handle per identifier that any number of tasks can await
//! - `ChunkReader` / `ChunkWriter` trait boundaries, joined as `ChunkStore`

pub mod error;
pub mod ledger;
pub mod slot;
pub mod traits;

pub use error::LedgerError;
pub use ledger::ChunkLedger;
pub use slot::ChunkSlot;
pub use traits::{ChunkReader, ChunkStore, ChunkWriter};
