//! Per-route rate-limit bucket.
//!
//! A bucket admits one dispatch at a time: the holder of a [`BucketPermit`]
//! is the only request allowed to talk to the server for that bucket. This
//! keeps the bootstrap probe single-flight while the limit is unknown and
//! gives strict priority-then-FIFO ordering once it is known.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use super::headers::instant_after;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Where a waiter lands in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Back,
    /// Before the first non-priority waiter, after earlier priority waiters.
    Priority,
    /// Ahead of everyone. Used for requests that were already dispatched once.
    Front,
}

impl Placement {
    pub fn for_priority(priority: bool) -> Self {
        if priority {
            Placement::Priority
        } else {
            Placement::Back
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketPhase {
    /// No response seen yet; one probe at a time.
    Unknown,
    Known,
    /// Out of budget until the reset deadline.
    Throttled,
}

/// Outcome of checking the bucket budget before a dispatch.
#[derive(Debug)]
pub enum Reservation {
    Ready,
    /// Budget exhausted until the given instant.
    Wait(Instant),
    /// The bucket was merged into another one; queue there instead.
    Redirect(Arc<RateLimitBucket>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub key: String,
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_in: Option<Duration>,
    pub queued: usize,
    pub in_flight: bool,
    pub phase: BucketPhase,
}

struct Waiter {
    id: u64,
    priority: bool,
    tx: oneshot::Sender<()>,
}

struct State {
    limit: Option<u32>,
    remaining: u32,
    reset_at: Option<Instant>,
    reset_after: Option<Duration>,
    throttled: bool,
    busy: bool,
    queue: VecDeque<Waiter>,
    next_id: u64,
    merged_into: Option<Arc<RateLimitBucket>>,
}

pub struct RateLimitBucket {
    key: String,
    state: Mutex<State>,
}

impl fmt::Debug for RateLimitBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitBucket")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl RateLimitBucket {
    pub fn new(key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            state: Mutex::new(State {
                limit: None,
                remaining: 0,
                reset_at: None,
                reset_after: None,
                throttled: false,
                busy: false,
                queue: VecDeque::new(),
                next_id: 0,
                merged_into: None,
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the queue. The returned ticket resolves once this caller holds the bucket.
    pub fn enqueue(self: &Arc<Self>, placement: Placement) -> Ticket {
        let mut st = self.lock();
        let id = st.next_id;
        st.next_id += 1;

        if !st.busy {
            st.busy = true;
            return Ticket {
                bucket: Arc::clone(self),
                id,
                rx: None,
                armed: true,
            };
        }

        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            id,
            priority: placement != Placement::Back,
            tx,
        };
        match placement {
            Placement::Back => st.queue.push_back(waiter),
            Placement::Front => st.queue.push_front(waiter),
            Placement::Priority => {
                let index = st
                    .queue
                    .iter()
                    .position(|w| !w.priority)
                    .unwrap_or(st.queue.len());
                st.queue.insert(index, waiter);
            }
        }

        Ticket {
            bucket: Arc::clone(self),
            id,
            rx: Some(rx),
            armed: true,
        }
    }

    /// Hand the bucket to the next live waiter, or mark it idle.
    fn release(&self) {
        let mut st = self.lock();
        while let Some(waiter) = st.queue.pop_front() {
            if waiter.tx.send(()).is_ok() {
                return;
            }
        }
        st.busy = false;
    }

    fn reserve(&self) -> Reservation {
        let mut st = self.lock();
        if let Some(target) = &st.merged_into {
            return Reservation::Redirect(Arc::clone(target));
        }

        let now = Instant::now();
        if let Some(reset_at) = st.reset_at {
            if reset_at <= now {
                st.reset_at = None;
                st.throttled = false;
                if let Some(limit) = st.limit {
                    st.remaining = limit;
                }
            } else if st.remaining == 0 && (st.limit.is_some() || st.throttled) {
                return Reservation::Wait(reset_at);
            }
        }

        if st.limit.is_some() {
            st.remaining = st.remaining.saturating_sub(1);
        }
        Reservation::Ready
    }

    /// Apply the budget a response reported. `reset_in` is relative to now.
    pub fn update(
        &self,
        limit: Option<u32>,
        remaining: Option<i64>,
        reset_in: Option<Duration>,
        reset_after: Option<Duration>,
    ) {
        let mut st = self.lock();
        if let Some(limit) = limit {
            st.limit = Some(limit);
        }
        if let Some(remaining) = remaining {
            st.remaining = remaining.clamp(0, u32::MAX as i64) as u32;
        }
        if let Some(reset_in) = reset_in {
            st.reset_at = Some(instant_after(Instant::now(), reset_in));
        }
        if reset_after.is_some() {
            st.reset_after = reset_after;
        }
    }

    /// A local 429: nothing leaves this bucket until `retry_after` elapses.
    pub fn on_throttled(&self, retry_after: Duration) {
        let mut st = self.lock();
        let until = instant_after(Instant::now(), retry_after);
        st.remaining = 0;
        st.throttled = true;
        st.reset_at = Some(st.reset_at.map_or(until, |current| current.max(until)));
    }

    pub(crate) fn merge_into(&self, target: Arc<RateLimitBucket>) {
        self.lock().merged_into = Some(target);
    }

    pub fn phase(&self) -> BucketPhase {
        Self::phase_of(&self.lock(), Instant::now())
    }

    fn phase_of(st: &State, now: Instant) -> BucketPhase {
        let pending_reset = st.reset_at.map_or(false, |r| r > now);
        if pending_reset && (st.throttled || (st.limit.is_some() && st.remaining == 0)) {
            BucketPhase::Throttled
        } else if st.limit.is_none() {
            BucketPhase::Unknown
        } else {
            BucketPhase::Known
        }
    }

    pub fn snapshot(&self) -> BucketSnapshot {
        let st = self.lock();
        let now = Instant::now();
        BucketSnapshot {
            key: self.key.clone(),
            limit: st.limit,
            remaining: st.remaining,
            reset_in: st.reset_at.and_then(|r| r.checked_duration_since(now)),
            queued: st.queue.len(),
            in_flight: st.busy,
            phase: Self::phase_of(&st, now),
        }
    }
}

/// A place in a bucket queue. Dropping it gives up the place.
pub struct Ticket {
    bucket: Arc<RateLimitBucket>,
    id: u64,
    rx: Option<oneshot::Receiver<()>>,
    armed: bool,
}

impl Ticket {
    pub async fn granted(mut self) -> BucketPermit {
        if let Some(rx) = self.rx.take() {
            // The sender is only dropped unsent when this ticket leaves the queue.
            let _ = rx.await;
        }
        self.armed = false;
        BucketPermit {
            bucket: Arc::clone(&self.bucket),
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = {
            let mut st = self.bucket.lock();
            match st.queue.iter().position(|w| w.id == self.id) {
                Some(index) => {
                    st.queue.remove(index);
                    true
                }
                None => false,
            }
        };
        // Not in the queue means the bucket was already handed to us.
        if !removed {
            self.bucket.release();
        }
    }
}

/// Exclusive right to dispatch on a bucket. Released on drop.
pub struct BucketPermit {
    bucket: Arc<RateLimitBucket>,
}

impl BucketPermit {
    pub fn bucket(&self) -> &Arc<RateLimitBucket> {
        &self.bucket
    }

    /// Check and consume budget for one dispatch.
    pub fn reserve(&self) -> Reservation {
        self.bucket.reserve()
    }
}

impl Drop for BucketPermit {
    fn drop(&mut self) {
        self.bucket.release();
    }
}
