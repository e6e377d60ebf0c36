use super::ObjectStore;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory [`ObjectStore`] for tests and dry runs.
///
/// Tracks how many `put_object` calls are in flight at once and the peak of
/// that number, and can be told to fail uploads for specific keys.
#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<BTreeSet<String>>,
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    failing_keys: Mutex<HashSet<String>>,
    put_latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    put_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

/// Decrements the in-flight counter on every exit path
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload sleeps this long, so overlapping uploads are observable
    pub fn with_put_latency(mut self, latency: Duration) -> Self {
        self.put_latency = latency;
        self
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        lock(&self.buckets).insert(bucket.to_string());
        self
    }

    /// Seed an object without counting it as an upload
    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        lock(&self.buckets).insert(bucket.to_string());
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), data.to_vec());
        self
    }

    /// Uploads to `key` fail with a storage error
    pub fn fail_key(&self, key: &str) {
        lock(&self.failing_keys).insert(key.to_string());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Highest number of uploads observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

// A poisoned lock only means another test thread panicked mid-insert; the
// maps are still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(lock(&self.buckets).contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        if !lock(&self.buckets).insert(bucket.to_string()) {
            return Err(IngestError::storage(
                "create bucket",
                format!("BucketAlreadyOwnedByYou: {}", bucket),
            ));
        }
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if !lock(&self.buckets).contains(bucket) {
            return Err(IngestError::storage(
                "list objects",
                format!("NoSuchBucket: {}", bucket),
            ));
        }

        Ok(lock(&self.objects)
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.put_latency.is_zero() {
            tokio::time::sleep(self.put_latency).await;
        }

        if lock(&self.failing_keys).contains(key) {
            return Err(IngestError::storage(
                "put object",
                format!("simulated failure for {}", key),
            ));
        }

        if !lock(&self.buckets).contains(bucket) {
            return Err(IngestError::storage(
                "put object",
                format!("NoSuchBucket: {}", bucket),
            ));
        }

        lock(&self.objects).insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }
}
