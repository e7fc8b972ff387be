use super::headers::{instant_after, secs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSnapshot {
    pub max_inflight: Option<usize>,
    pub available: Option<usize>,
    pub rps: Option<f64>,
    pub tokens: Option<f64>,
    /// Remaining global freeze after a global 429 (ms).
    pub blocked_for_ms: Option<u64>,
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last: Instant,
    /// Set by a global 429; nothing is dispatched before it.
    blocked_until: Option<Instant>,
}

/// Application-wide gate every dispatch passes through.
///
/// Composes three limits: an optional ceiling on outstanding requests, an
/// optional token bucket on dispatch rate, and the freeze imposed by a global 429.
pub struct GlobalLimiter {
    inflight: Option<Arc<Semaphore>>,
    max_inflight: Option<usize>,
    rps: Option<f64>,
    burst: f64,
    state: Mutex<State>,
}

/// One outstanding request's slot. Released on drop.
#[derive(Debug)]
pub struct GlobalPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl GlobalPermit {
    pub fn release(self) {}
}

impl GlobalLimiter {
    pub fn new(max_inflight: Option<usize>, rps: Option<f64>) -> Self {
        let max_inflight = max_inflight.map(|n| n.max(1));
        let rps = rps.filter(|r| r.is_finite() && *r > 0.0);
        let burst = rps.map(|r| r.max(1.0)).unwrap_or(0.0);
        Self {
            inflight: max_inflight.map(|n| Arc::new(Semaphore::new(n))),
            max_inflight,
            rps,
            burst,
            state: Mutex::new(State {
                tokens: burst,
                last: Instant::now(),
                blocked_until: None,
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    fn refill_locked(rps: f64, burst: f64, st: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(st.last).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * rps).min(burst);
            st.last = now;
        }
    }

    /// Suspends until a slot is free, the global freeze is over, and a token is available.
    pub async fn acquire(&self) -> GlobalPermit {
        let permit = match &self.inflight {
            // The semaphore is never closed.
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        };

        loop {
            let wait_until = {
                let mut st = self.state.lock().await;
                let now = Instant::now();

                match st.blocked_until {
                    Some(until) if until > now => Some(until),
                    _ => {
                        st.blocked_until = None;
                        match self.rps {
                            None => None,
                            Some(rps) => {
                                Self::refill_locked(rps, self.burst, &mut st);
                                if st.tokens >= 1.0 {
                                    st.tokens -= 1.0;
                                    None
                                } else {
                                    let missing = 1.0 - st.tokens;
                                    Some(instant_after(now, secs(missing / rps)))
                                }
                            }
                        }
                    }
                }
            };

            match wait_until {
                Some(until) => tokio::time::sleep_until(until).await,
                None => return GlobalPermit { _permit: permit },
            }
        }
    }

    /// Freeze all dispatch for `retry_after`. Never shortens an existing freeze.
    pub async fn on_global_throttle(&self, retry_after: Duration) {
        let mut st = self.state.lock().await;
        let until = instant_after(Instant::now(), retry_after);
        st.blocked_until = Some(st.blocked_until.map_or(until, |current| current.max(until)));
    }

    pub async fn blocked_for(&self) -> Option<Duration> {
        let st = self.state.lock().await;
        st.blocked_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    pub async fn snapshot(&self) -> GlobalSnapshot {
        let mut st = self.state.lock().await;
        if let Some(rps) = self.rps {
            Self::refill_locked(rps, self.burst, &mut st);
        }
        let now = Instant::now();
        GlobalSnapshot {
            max_inflight: self.max_inflight,
            available: self.inflight.as_ref().map(|s| s.available_permits()),
            rps: self.rps,
            tokens: self.rps.map(|_| st.tokens),
            blocked_for_ms: st
                .blocked_until
                .and_then(|until| until.checked_duration_since(now))
                .map(|d| d.as_millis() as u64)
                .filter(|ms| *ms > 0),
        }
    }
}
