use crate::resilience::{BucketSnapshot, GlobalSnapshot, LatencySnapshot};

/// A point-in-time view of the scheduler, for dashboards and debugging.
///
/// Facts only: nothing here feeds back into scheduling decisions.
#[derive(Debug, Clone)]
pub struct SignalsSnapshot {
    pub global: GlobalSnapshot,
    pub latency: LatencySnapshot,
    /// One entry per live bucket, sorted by key.
    pub buckets: Vec<BucketSnapshot>,
}

impl SignalsSnapshot {
    pub fn bucket(&self, key: &str) -> Option<&BucketSnapshot> {
        self.buckets.iter().find(|b| b.key == key)
    }

    pub fn queued(&self) -> usize {
        self.buckets.iter().map(|b| b.queued).sum()
    }
}
