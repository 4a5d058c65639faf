// SPDX-License-Identifier: Apache-2.0

use crate::backend::{ObjectAttrs, ObjectStore, StoreError, StoreErrorCode};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// In-memory bucket with per-object read counters and switchable failures.
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    reads: Mutex<HashMap<String, u64>>,
    pub list_calls: AtomicU64,
    pub fail_reads: AtomicBool,
    pub fail_listing: AtomicBool,
}

/// Stand-in for the store's MD5 field: first 16 bytes of SHA-256, base64 encoded.
#[must_use]
pub fn fake_checksum(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    STANDARD.encode(&digest[..16])
}

impl FakeObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bucket: &str, name: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), name.to_string()), body.into());
    }

    pub async fn reads_of(&self, name: &str) -> u64 {
        self.reads.lock().await.get(name).copied().unwrap_or(0)
    }

    pub async fn total_reads(&self) -> u64 {
        self.reads.lock().await.values().sum()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    fn backend_tag(&self) -> &'static str {
        "fake"
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectAttrs>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(StoreError::new(StoreErrorCode::Network, "listing unavailable"));
        }
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .filter(|((b, name), _)| b == bucket && name.starts_with(prefix))
            .map(|((_, name), body)| ObjectAttrs {
                name: name.clone(),
                size: body.len() as u64,
                md5_hash: Some(fake_checksum(body)),
                crc32c: None,
            })
            .collect())
    }

    async fn read_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StoreError> {
        *self.reads.lock().await.entry(name.to_string()).or_insert(0) += 1;
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::new(StoreErrorCode::Network, "read unavailable"));
        }
        self.objects
            .lock()
            .await
            .get(&(bucket.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::new(StoreErrorCode::NotFound, format!("{bucket}/{name}")))
    }
}
