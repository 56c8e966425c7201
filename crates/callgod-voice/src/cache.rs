//! Bounded FIFO caches for response text and response audio.
//!
//! Both caches share one shape: a fixed-capacity map from a content hash to a value,
//! evicting the oldest insertion once full. Recency of reads is not tracked.

use crate::artifact::AudioRef;
use crate::text::normalize_input;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Maximum entries held by each cache unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Fixed-length content hash (32 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for the language cache: hash of the normalized prompt.
    pub fn for_prompt(prompt: &str) -> Self {
        Self::digest(&[&normalize_input(prompt)])
    }

    /// Key for the response cache: normalized text scoped by the voice id.
    pub fn for_speech(text: &str, voice_id: &str) -> Self {
        Self::digest(&[&normalize_input(text), voice_id])
    }

    fn digest(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update(b"_");
            }
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cached mapping. `inserted_at` is a monotonic insertion sequence, not wall time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub value: V,
    pub inserted_at: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    order: VecDeque<CacheKey>,
    next_seq: u64,
}

/// Fixed-capacity FIFO map. All operations take the internal lock briefly and never await.
#[derive(Debug)]
pub struct BoundedCache<V> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

/// Generated response text keyed by normalized prompt. Independent of voice.
pub type LanguageCache = BoundedCache<String>;

/// Synthesized artifacts keyed by normalized text + voice id.
pub type ResponseCache = BoundedCache<AudioRef>;

impl<V: Clone> BoundedCache<V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // A poisoned cache still holds consistent data: every mutation completes before unlock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.lock().entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or overwrite. Overwriting keeps the original insertion slot.
    /// Returns the evicted entry when the insert pushed the cache over capacity.
    pub fn put(&self, key: CacheKey, value: V) -> Option<CacheEntry<V>> {
        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get_mut(&key) {
            existing.value = value;
            return None;
        }

        let mut evicted = None;
        if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                evicted = inner.entries.remove(&oldest);
                tracing::debug!(target: "callgod::cache", cache = self.name, key = %oldest, "evicted oldest entry");
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                inserted_at: seq,
            },
        );
        evicted
    }

    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        let mut inner = self.lock();
        let removed = inner.entries.remove(key)?;
        inner.order.retain(|k| k != key);
        Some(removed.value)
    }

    /// Drop every entry. Returns how many were held.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let n = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from oldest to newest insertion.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.lock().order.iter().cloned().collect()
    }
}
