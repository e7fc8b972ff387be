use super::bucket::{BucketSnapshot, RateLimitBucket};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct Inner {
    buckets: HashMap<String, Arc<RateLimitBucket>>,
    /// Route key to canonical `hash:major` key, learned from responses.
    aliases: HashMap<String, String>,
}

/// Lazily created buckets, keyed by route key until the server names them.
///
/// Buckets are never evicted; the set of routes an application touches is small.
#[derive(Default)]
pub struct BucketRegistry {
    inner: Mutex<Inner>,
}

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registry key the route is counted under: its server bucket once known.
    pub fn bucket_key(&self, route_key: &str) -> String {
        self.lock()
            .aliases
            .get(route_key)
            .cloned()
            .unwrap_or_else(|| route_key.to_string())
    }

    pub fn get_or_create(&self, route_key: &str) -> Arc<RateLimitBucket> {
        let mut inner = self.lock();
        let key = inner
            .aliases
            .get(route_key)
            .cloned()
            .unwrap_or_else(|| route_key.to_string());
        Arc::clone(
            inner
                .buckets
                .entry(key.clone())
                .or_insert_with(|| RateLimitBucket::new(key)),
        )
    }

    /// Record that `route_key` belongs to the server bucket `canonical`.
    ///
    /// Returns the bucket that now owns the route. When another route already
    /// reported the same server bucket, `current` is merged into it.
    pub fn alias(
        &self,
        route_key: &str,
        canonical: &str,
        current: &Arc<RateLimitBucket>,
    ) -> Arc<RateLimitBucket> {
        let mut inner = self.lock();
        if inner.aliases.get(route_key).map(String::as_str) == Some(canonical) {
            if let Some(existing) = inner.buckets.get(canonical) {
                return Arc::clone(existing);
            }
        }

        let target = match inner.buckets.get(canonical).cloned() {
            Some(existing) if !Arc::ptr_eq(&existing, current) => {
                debug!(
                    route_key = route_key,
                    bucket = canonical,
                    "merging route into shared bucket"
                );
                current.merge_into(Arc::clone(&existing));
                existing
            }
            Some(existing) => existing,
            None => {
                inner
                    .buckets
                    .insert(canonical.to_string(), Arc::clone(current));
                Arc::clone(current)
            }
        };

        inner
            .aliases
            .insert(route_key.to_string(), canonical.to_string());
        if route_key != canonical {
            inner.buckets.remove(route_key);
        }
        target
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buckets.is_empty()
    }

    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let buckets: Vec<Arc<RateLimitBucket>> = {
            let inner = self.lock();
            let mut seen: Vec<Arc<RateLimitBucket>> = Vec::new();
            for bucket in inner.buckets.values() {
                if !seen.iter().any(|b| Arc::ptr_eq(b, bucket)) {
                    seen.push(Arc::clone(bucket));
                }
            }
            seen
        };
        let mut out: Vec<BucketSnapshot> = buckets.iter().map(|b| b.snapshot()).collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}
