//! Bounded response cache keyed by prompt hash.
//!
//! The knowledge document is static per process lifetime, so identical
//! prompts may soundly return identical replies until evicted. Concurrent
//! misses on the same key collapse to a single in-flight generation.

use sofia_core::error::SofiaError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::debug;

struct LruMap {
    entries: HashMap<String, (String, u64)>,
    tick: u64,
}

impl LruMap {
    fn get(&mut self, key: &str) -> Option<String> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|(value, used)| {
            *used = tick;
            value.clone()
        })
    }

    fn insert(&mut self, key: String, value: String, capacity: usize) {
        self.tick += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= capacity {
            // Evict the least-recently-used entry. Linear scan; capacity
            // is small (default 128).
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        let tick = self.tick;
        self.entries.insert(key, (value, tick));
    }
}

/// LRU cache of generated replies with per-key single-flight.
pub struct ResponseCache {
    capacity: usize,
    entries: StdMutex<LruMap>,
    /// Per-key generation locks: concurrent misses on the same hash wait
    /// here instead of each calling the generator.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: StdMutex::new(LruMap {
                entries: HashMap::new(),
                tick: 0,
            }),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached reply for `hash`, or run `generate` and cache
    /// its result. Generator errors are propagated and never cached.
    pub async fn get_or_generate<F, Fut>(
        &self,
        hash: &str,
        generate: F,
    ) -> Result<String, SofiaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, SofiaError>>,
    {
        if self.capacity == 0 {
            return generate().await;
        }

        if let Some(hit) = self.lookup(hash) {
            debug!("cache hit for {}", &hash[..12.min(hash.len())]);
            return Ok(hit);
        }

        let key_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(hash.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        // A concurrent caller may have generated while we waited.
        if let Some(hit) = self.lookup(hash) {
            return Ok(hit);
        }

        let result = generate().await;
        if let Ok(reply) = &result {
            self.store(hash, reply.clone());
        }

        let mut inflight = self.inflight.lock().await;
        inflight.remove(hash);

        result
    }

    /// Drop every cached entry. Operator maintenance only; regeneration
    /// happens lazily on the next miss.
    pub fn clear(&self) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, hash: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(hash)
    }

    fn store(&self, hash: &str, reply: String) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(hash.to_string(), reply, self.capacity);
    }
}
