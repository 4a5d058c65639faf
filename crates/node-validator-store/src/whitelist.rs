// SPDX-License-Identifier: Apache-2.0

use crate::backend::{ObjectStore, StoreError};
use crate::cache::{cache_key, ObjectCache};
use async_trait::async_trait;
use node_validator_core::{Instance, ValidatorError, WhitelistProvider};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Objects above this size are not treated as script fragments.
pub const MAX_OBJECT_BYTES: u64 = 1024 * 1024;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Whitelist made of every object under a bucket prefix.
pub struct CloudStorageWhitelistProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    cache: ObjectCache,
}

impl CloudStorageWhitelistProvider {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: String::new(),
            cache: ObjectCache::new(DEFAULT_CACHE_TTL),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = ObjectCache::new(ttl);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    #[instrument(
        name = "bucket_whitelist_fetch",
        skip(self),
        fields(bucket = %self.bucket, prefix = %self.prefix, backend = self.store.backend_tag())
    )]
    async fn fetch_fragments(&self) -> Result<Vec<String>, StoreError> {
        let objects = self.store.list_objects(&self.bucket, &self.prefix).await?;
        let mut fragments = Vec::with_capacity(objects.len());
        for attrs in objects {
            if attrs.size == 0 {
                continue;
            }
            if attrs.size > MAX_OBJECT_BYTES {
                info!(object = %attrs.name, size = attrs.size, "skipping oversized whitelist object");
                continue;
            }
            let body = match attrs.checksum() {
                Some(checksum) => self.read_cached(&attrs.name, checksum).await?,
                // Without a checksum a cached copy could never be shown to be current.
                None => self.store.read_object(&self.bucket, &attrs.name).await?,
            };
            fragments.push(decode_fragment(&attrs.name, &body));
        }
        Ok(fragments)
    }

    async fn read_cached(&self, name: &str, checksum: &str) -> Result<Vec<u8>, StoreError> {
        let key = cache_key(name, checksum);
        if let Some(body) = self.cache.get(&key).await {
            debug!(object = %name, "whitelist object served from cache");
            return Ok(body);
        }
        let body = self.store.read_object(&self.bucket, name).await?;
        self.cache.insert(key, body.clone()).await;
        Ok(body)
    }
}

/// Bodies that are not valid UTF-8 are kept with replacement characters. Such a
/// fragment will not match any script, so the conversion is logged.
fn decode_fragment(name: &str, body: &[u8]) -> String {
    match String::from_utf8_lossy(body) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => {
            warn!(object = %name, size = body.len(), "whitelist object is not valid UTF-8");
            text
        }
    }
}

#[async_trait]
impl WhitelistProvider for CloudStorageWhitelistProvider {
    fn provider_tag(&self) -> &'static str {
        "cloud_storage"
    }

    async fn get_whitelist(&self, _instance: &Instance) -> Result<Vec<String>, ValidatorError> {
        Ok(self.fetch_fragments().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeObjectStore;
    use std::sync::atomic::Ordering;

    async fn seeded_store() -> Arc<FakeObjectStore> {
        let store = Arc::new(FakeObjectStore::new());
        store.put("wl", "gke/bootstrap.sh", "echo bootstrap").await;
        store.put("wl", "gke/cloud-init.yaml", "#cloud-config").await;
        store.put("wl", "other/ignored.sh", "echo ignored").await;
        store.put("elsewhere", "gke/foreign.sh", "echo foreign").await;
        store
    }

    fn provider(store: &Arc<FakeObjectStore>) -> CloudStorageWhitelistProvider {
        CloudStorageWhitelistProvider::new(store.clone(), "wl").with_prefix("gke/")
    }

    #[tokio::test]
    async fn returns_every_object_under_prefix() {
        let store = seeded_store().await;
        let mut fragments = provider(&store)
            .get_whitelist(&Instance::default())
            .await
            .expect("whitelist");
        fragments.sort();
        assert_eq!(fragments, vec!["#cloud-config", "echo bootstrap"]);
    }

    #[tokio::test]
    async fn unchanged_objects_are_read_at_most_once() {
        let store = seeded_store().await;
        let provider = provider(&store);

        provider.get_whitelist(&Instance::default()).await.expect("first");
        provider.get_whitelist(&Instance::default()).await.expect("second");

        assert_eq!(store.reads_of("gke/bootstrap.sh").await, 1);
        assert_eq!(store.reads_of("gke/cloud-init.yaml").await, 1);
        assert_eq!(store.list_calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn checksum_change_rereads_only_that_object() {
        let store = seeded_store().await;
        let provider = provider(&store);
        provider.get_whitelist(&Instance::default()).await.expect("warm");

        store.put("wl", "gke/bootstrap.sh", "echo bootstrap v2").await;
        let fragments = provider.get_whitelist(&Instance::default()).await.expect("after change");

        assert!(fragments.contains(&"echo bootstrap v2".to_string()));
        assert_eq!(store.reads_of("gke/bootstrap.sh").await, 2);
        assert_eq!(store.reads_of("gke/cloud-init.yaml").await, 1);
    }

    #[tokio::test]
    async fn oversized_and_empty_objects_are_skipped() {
        let store = seeded_store().await;
        let oversized = vec![b'#'; usize::try_from(MAX_OBJECT_BYTES).expect("fits") + 1];
        store.put("wl", "gke/huge.bin", oversized).await;
        store.put("wl", "gke/empty.sh", Vec::new()).await;
        let exactly_max = vec![b'x'; usize::try_from(MAX_OBJECT_BYTES).expect("fits")];
        store.put("wl", "gke/max.sh", exactly_max).await;

        let fragments = provider(&store)
            .get_whitelist(&Instance::default())
            .await
            .expect("oversized objects do not fail the call");

        assert_eq!(fragments.len(), 3);
        assert_eq!(store.reads_of("gke/huge.bin").await, 0);
        assert_eq!(store.reads_of("gke/empty.sh").await, 0);
        assert_eq!(store.reads_of("gke/max.sh").await, 1);
    }

    #[tokio::test]
    async fn read_failure_aborts_the_whole_call() {
        let store = seeded_store().await;
        store.fail_reads.store(true, Ordering::Relaxed);
        let err = provider(&store)
            .get_whitelist(&Instance::default())
            .await
            .expect_err("partial whitelist must not be returned");
        assert!(matches!(err, ValidatorError::Upstream { service: "cloud_storage", .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn listing_failure_is_an_upstream_error() {
        let store = seeded_store().await;
        store.fail_listing.store(true, Ordering::Relaxed);
        let err = provider(&store)
            .get_whitelist(&Instance::default())
            .await
            .expect_err("listing failure");
        assert!(err.is_retryable());
        assert_eq!(store.total_reads().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_read_again() {
        let store = seeded_store().await;
        let provider = provider(&store).with_cache_ttl(Duration::from_secs(60));

        provider.get_whitelist(&Instance::default()).await.expect("warm");
        tokio::time::advance(Duration::from_secs(59)).await;
        provider.get_whitelist(&Instance::default()).await.expect("cached");
        assert_eq!(store.reads_of("gke/bootstrap.sh").await, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        provider.get_whitelist(&Instance::default()).await.expect("expired");
        assert_eq!(store.reads_of("gke/bootstrap.sh").await, 2);
    }

    #[tokio::test]
    async fn non_utf8_objects_are_kept_lossily() {
        let store = seeded_store().await;
        store.put("wl", "gke/binary.bin", vec![0xff, b'o', b'k']).await;
        let fragments = provider(&store)
            .get_whitelist(&Instance::default())
            .await
            .expect("whitelist");
        assert!(fragments.contains(&"\u{FFFD}ok".to_string()));
        assert_eq!(decode_fragment("plain", b"echo ok"), "echo ok");
    }
}
