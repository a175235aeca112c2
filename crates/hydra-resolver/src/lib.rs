//! Placeholder grammar and resolution for Hydra documents.
//!
//! - [`PlaceholderGrammar`] decides which strings are placeholders and
//!   extracts their chunk identifiers
//! - [`PlaceholderResolver`] builds a resolved copy of a document from a
//!   [`hydra_ledger::ChunkReader`], caching results by [`Fingerprint`]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod grammar;
pub mod resolver;

pub use config::ResolverConfig;
pub use error::ResolverError;
pub use fingerprint::{Fingerprint, FingerprintHasher};
pub use grammar::{PlaceholderGrammar, DEFAULT_PLACEHOLDER_PATTERN};
pub use resolver::PlaceholderResolver;
