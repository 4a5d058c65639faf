// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Clone)]
struct CacheEntry {
    body: Vec<u8>,
    inserted_at: Instant,
}

/// Object bodies keyed by name and checksum, shared across concurrent validations.
///
/// Expired entries are never returned; they are dropped on lookup and swept on insert.
pub struct ObjectCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

#[must_use]
pub fn cache_key(name: &str, checksum: &str) -> String {
    format!("{name}:{checksum}")
}

impl ObjectCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: String, body: Vec<u8>) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, v| v.inserted_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                body,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
