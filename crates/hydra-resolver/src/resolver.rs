use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use hydra_ledger::ChunkReader;
use hydra_types::ChunkId;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::config::ResolverConfig;
use crate::error::Result;
use crate::fingerprint::{Fingerprint, FingerprintHasher};
use crate::grammar::PlaceholderGrammar;

/// Builds resolved copies of documents.
///
/// Every placeholder whose chunk the reader reports as loaded is replaced
/// by the chunk's value, at any depth. Pending and rejected placeholders,
/// non-placeholder scalars, and mapping keys pass through untouched. The
/// input document is never modified.
///
/// Results are cached under a [`Fingerprint`] of the document content, the
/// reader's clear generation, and its loaded-identifier set. Chunk values
/// never change once loaded, so a matching fingerprint always maps to the
/// same answer; any new load changes the fingerprint and stale entries are
/// simply never looked up again.
pub struct PlaceholderResolver {
    grammar: PlaceholderGrammar,
    cache: RwLock<HashMap<Fingerprint, Value>>,
    cache_capacity: usize,
}

impl PlaceholderResolver {
    pub fn new(grammar: PlaceholderGrammar, cache_capacity: usize) -> Self {
        Self {
            grammar,
            cache: RwLock::new(HashMap::new()),
            cache_capacity,
        }
    }

    /// Build a resolver from configuration, compiling its grammar.
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let grammar = PlaceholderGrammar::new(&config.placeholder_pattern)?;
        Ok(Self::new(grammar, config.cache_capacity))
    }

    pub fn grammar(&self) -> &PlaceholderGrammar {
        &self.grammar
    }

    /// Every chunk identifier referenced in `document`.
    pub fn find_all_ids(&self, document: &Value) -> BTreeSet<ChunkId> {
        self.grammar.find_all_ids(document)
    }

    /// Resolved copy of `document`.
    ///
    /// With `use_cache` the result is looked up by fingerprint first and
    /// stored after a miss. Without it the document is always walked and the
    /// cache is neither read nor written.
    pub fn resolve_placeholders<R>(&self, document: &Value, reader: &R, use_cache: bool) -> Value
    where
        R: ChunkReader + ?Sized,
    {
        if !use_cache || self.cache_capacity == 0 {
            return self.resolve_value(document, reader);
        }

        let key = FingerprintHasher::RESOLUTION.resolution(
            document,
            reader.generation(),
            &reader.resolved_ids(),
        );

        if let Some(hit) = self.read_cache(&key) {
            trace!(fingerprint = %key.short_hex(), "resolution cache hit");
            return hit;
        }

        let resolved = self.resolve_value(document, reader);

        let mut cache = self.write_cache();
        if cache.len() >= self.cache_capacity {
            debug!(entries = cache.len(), "resolution cache full, flushing");
            cache.clear();
        }
        cache.insert(key, resolved.clone());
        trace!(fingerprint = %key.short_hex(), "resolution cached");

        resolved
    }

    /// Resolved copy of a single value or subtree, bypassing the cache.
    pub fn resolve_value<R>(&self, value: &Value, reader: &R) -> Value
    where
        R: ChunkReader + ?Sized,
    {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.resolve_value(child, reader));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|child| self.resolve_value(child, reader))
                    .collect(),
            ),
            scalar => self
                .grammar
                .extract_id(scalar)
                .and_then(|id| reader.value(&id))
                .unwrap_or_else(|| scalar.clone()),
        }
    }

    /// Forget every cached result. Ledger state is unaffected.
    pub fn clear_cache(&self) {
        let mut cache = self.write_cache();
        let dropped = cache.len();
        cache.clear();
        debug!(dropped, "resolution cache cleared");
    }

    /// Number of cached results.
    pub fn cache_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn read_cache(&self, key: &Fingerprint) -> Option<Value> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<Fingerprint, Value>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PlaceholderResolver {
    fn default() -> Self {
        Self::new(
            PlaceholderGrammar::default(),
            ResolverConfig::default().cache_capacity,
        )
    }
}
