#![forbid(unsafe_code)]

//! Unwrapped symmetric keys shared between processing passes.
//!
//! The cache is keyed by the `EncryptedKeySHA1` of the wrapped key, which
//! depends only on the ciphertext. Any pass that unwraps a key publishes it
//! so later passes (or later references in the same message) skip the RSA
//! private-key operation.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use zeroize::Zeroizing;

/// An unwrapped symmetric key. Cloning shares the buffer, which is zeroed
/// when the last clone is dropped.
#[derive(Clone)]
pub struct SecretKey(Arc<Zeroizing<Vec<u8>>>);

impl SecretKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Zeroizing::new(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for SecretKey {}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey({} bytes)", self.len())
    }
}

/// Map from `EncryptedKeySHA1` (base64) to the unwrapped key.
///
/// Implementations are shared by concurrent passes. `put` must be
/// idempotent: every legitimate writer publishes the same key for the same
/// digest.
pub trait EncryptedKeyCache: Send + Sync {
    fn get(&self, sha1: &str) -> Option<SecretKey>;
    fn put(&self, sha1: &str, key: SecretKey);
}

const SHARDS: usize = 16;

/// In-memory cache split into independently locked shards, so publishes of
/// unrelated digests do not contend.
pub struct ShardedKeyCache {
    shards: Vec<RwLock<HashMap<String, SecretKey>>>,
}

impl Default for ShardedKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedKeyCache {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, sha1: &str) -> &RwLock<HashMap<String, SecretKey>> {
        let mut hasher = DefaultHasher::new();
        sha1.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EncryptedKeyCache for ShardedKeyCache {
    fn get(&self, sha1: &str) -> Option<SecretKey> {
        self.shard(sha1)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sha1)
            .cloned()
    }

    fn put(&self, sha1: &str, key: SecretKey) {
        self.shard(sha1)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sha1.to_owned(), key);
    }
}
