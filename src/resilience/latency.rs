use super::headers::MAX_WAIT;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    pub latency_ms: u64,
    /// Server clock minus local clock, in ms.
    pub time_offset_ms: i64,
    pub samples: usize,
}

#[derive(Debug, Default)]
struct State {
    raw: VecDeque<Duration>,
    latency: Duration,
    offsets: VecDeque<i64>,
    time_offset_ms: i64,
}

/// Rolling round-trip times and server clock offset.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    state: Mutex<State>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, rtt: Duration, server_date: Option<DateTime<Utc>>) {
        self.record_at(rtt, server_date, Utc::now());
    }

    pub(crate) fn record_at(
        &self,
        rtt: Duration,
        server_date: Option<DateTime<Utc>>,
        local_now: DateTime<Utc>,
    ) {
        let mut st = self.lock();

        st.raw.push_back(rtt);
        if st.raw.len() > WINDOW {
            st.raw.pop_front();
        }
        let total: Duration = st.raw.iter().sum();
        st.latency = total / st.raw.len() as u32;

        if let Some(date) = server_date {
            // The Date header was stamped roughly half a round trip before we saw it.
            let offset = date.timestamp_millis() + (rtt.as_millis() as i64 / 2)
                - local_now.timestamp_millis();
            st.offsets.push_back(offset);
            if st.offsets.len() > WINDOW {
                st.offsets.pop_front();
            }
            st.time_offset_ms = st.offsets.iter().sum::<i64>() / st.offsets.len() as i64;
        }
    }

    pub fn latency(&self) -> Duration {
        self.lock().latency
    }

    pub fn time_offset_ms(&self) -> i64 {
        self.lock().time_offset_ms
    }

    /// Local wait until an absolute server-side reset (Unix seconds).
    pub fn until_server_time(&self, reset_epoch_secs: f64, compensate: bool) -> Duration {
        self.until_server_time_at(reset_epoch_secs, compensate, Utc::now())
    }

    pub(crate) fn until_server_time_at(
        &self,
        reset_epoch_secs: f64,
        compensate: bool,
        local_now: DateTime<Utc>,
    ) -> Duration {
        let offset = if compensate { self.time_offset_ms() } else { 0 };
        let server_now_ms = local_now.timestamp_millis() + offset;
        let reset_ms = (reset_epoch_secs * 1000.0) as i64;
        let wait_ms = reset_ms.saturating_sub(server_now_ms).max(0) as u64;
        Duration::from_millis(wait_ms).min(MAX_WAIT)
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let st = self.lock();
        LatencySnapshot {
            latency_ms: st.latency.as_millis() as u64,
            time_offset_ms: st.time_offset_ms,
            samples: st.raw.len(),
        }
    }
}
