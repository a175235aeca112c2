//! Foundation types for Hydra, the progressive hydration engine.
//!
//! A document is built up front with placeholder strings (`"$1"`, `"$2"`)
//! standing in for data that has not arrived yet. Out-of-band chunks later
//! fill those placeholders in. This crate holds the vocabulary every other
//! Hydra crate shares.
//!
//! # Key Types
//!
//! - [`ChunkId`]: Opaque identifier linking a placeholder to its chunk
//! - [`ChunkState`]: Lifecycle of a chunk: pending, loaded, or error
//! - [`ChunkFailure`]: Cloneable failure delivered to every waiter of a rejected chunk
//! - [`Batch`]: One ordered mapping of chunk identifier to raw data

pub mod chunk;
pub mod error;

pub use chunk::{Batch, ChunkFailure, ChunkId, ChunkState};
pub use error::TypeError;
