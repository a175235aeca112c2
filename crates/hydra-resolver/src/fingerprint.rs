use std::collections::BTreeSet;
use std::fmt;

use hydra_types::ChunkId;
use serde_json::Value;

/// Deterministic BLAKE3 digest used as a resolution-cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Domain-separated structural hasher for resolution-cache keys.
///
/// Values are hashed by walking their structure with a type tag and a
/// length prefix per node, so `["a", "b"]` and `["ab"]` differ and no
/// serialization step can fail. Mapping entries are hashed in document
/// order.
pub struct FingerprintHasher {
    domain: &'static str,
}

impl FingerprintHasher {
    /// Hasher for resolution-cache keys.
    pub const RESOLUTION: Self = Self {
        domain: "hydra-resolution-v1",
    };

    /// Cache key for resolving `value` against a ledger whose loaded set is
    /// `resolved` at the given clear `generation`.
    pub fn resolution(
        &self,
        value: &Value,
        generation: u64,
        resolved: &BTreeSet<ChunkId>,
    ) -> Fingerprint {
        let mut hasher = self.start();
        hash_value(&mut hasher, value);
        hasher.update(&generation.to_le_bytes());
        hasher.update(&(resolved.len() as u64).to_le_bytes());
        for id in resolved {
            hash_str(&mut hasher, id.as_str());
        }
        Fingerprint(*hasher.finalize().as_bytes())
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_ARRAY: u8 = 4;
const TAG_OBJECT: u8 = 5;

fn hash_value(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(&[TAG_NULL]);
        }
        Value::Bool(b) => {
            hasher.update(&[TAG_BOOL, u8::from(*b)]);
        }
        Value::Number(n) => {
            hasher.update(&[TAG_NUMBER]);
            hash_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update(&[TAG_STRING]);
            hash_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update(&[TAG_ARRAY]);
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(&[TAG_OBJECT]);
            hasher.update(&(map.len() as u64).to_le_bytes());
            for (key, child) in map {
                hash_str(hasher, key);
                hash_value(hasher, child);
            }
        }
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
