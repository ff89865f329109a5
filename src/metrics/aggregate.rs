use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::request::RequestObservation;
use super::running::RunningStat;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe aggregate over every observed request.
/// The rewrite filter calls `observe()`, the JSON/SSE endpoints call
/// `snapshot()`.
///
/// One instance is shared (`Arc`) by every in-flight response. A single
/// lock covers the three families and the request count, so readers only
/// ever see whole observations.
pub struct AggregateMetrics {
    inner: Mutex<Inner>,
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Consistent copy of the aggregate, shipped to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSnapshot {
    pub body_length: RunningStat,
    pub request_ms: RunningStat,
    pub handler_ms: RunningStat,

    pub total_observed_requests: u64,
    pub requests_per_minute: u64,
    pub elapsed_secs: f64,
    pub started_at: DateTime<Utc>,
}

// ─── Internal state ──────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    body_length: RunningStat,
    request_ms: RunningStat,
    handler_ms: RunningStat,
    total_observed_requests: u64,
}

/// One request's samples, read before the lock is taken.
struct Samples {
    body_length: u64,
    request_ms: u64,
    handler_ms: u64,
}

// ─── AggregateMetrics impl ───────────────────────────────────────

impl AggregateMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Fold one request into all three families and bump the count, as a
    /// single critical section.
    pub fn observe(&self, observation: &RequestObservation) {
        let samples = Samples {
            body_length: observation.response_body_length(),
            request_ms: observation.request_elapsed_ms(),
            handler_ms: observation.handler_elapsed_ms(),
        };
        self.inner.lock().fold(samples);
    }

    pub fn body_length(&self) -> RunningStat {
        self.inner.lock().body_length
    }

    pub fn request_ms(&self) -> RunningStat {
        self.inner.lock().request_ms
    }

    pub fn handler_ms(&self) -> RunningStat {
        self.inner.lock().handler_ms
    }

    pub fn total_observed_requests(&self) -> u64 {
        self.inner.lock().total_observed_requests
    }

    pub fn elapsed_since_start(&self) -> Duration {
        self.started.elapsed()
    }

    /// Observed requests per minute since construction.
    pub fn requests_per_minute(&self) -> u64 {
        let total = self.total_observed_requests();
        requests_per_minute(total, self.elapsed_since_start())
    }

    /// Produce a read-only snapshot for the dashboard.
    pub fn snapshot(&self) -> AggregateSnapshot {
        let elapsed = self.elapsed_since_start();
        let inner = self.inner.lock();
        AggregateSnapshot {
            body_length: inner.body_length,
            request_ms: inner.request_ms,
            handler_ms: inner.handler_ms,
            total_observed_requests: inner.total_observed_requests,
            requests_per_minute: requests_per_minute(inner.total_observed_requests, elapsed),
            elapsed_secs: elapsed.as_secs_f64(),
            started_at: self.started_at,
        }
    }
}

impl Default for AggregateMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// `total / (whole minutes + 1)`, never reported above `total`.
pub(crate) fn requests_per_minute(total: u64, elapsed: Duration) -> u64 {
    let rate = total / (elapsed.as_secs() / 60 + 1);
    rate.min(total)
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn fold(&mut self, samples: Samples) {
        let first = self.total_observed_requests == 0;

        self.body_length.fold(samples.body_length, first);
        self.request_ms.fold(samples.request_ms, first);
        self.handler_ms.fold(samples.handler_ms, first);

        self.total_observed_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn observation_with_length(length: u64) -> RequestObservation {
        let obs = RequestObservation::new("/test");
        obs.mark_request_start();
        obs.mark_handler_start();
        obs.sample_response_length(length);
        obs
    }

    #[test]
    fn fresh_set_reads_as_zero() {
        let metrics = AggregateMetrics::new();
        assert_eq!(metrics.total_observed_requests(), 0);
        assert_eq!(metrics.body_length(), RunningStat::empty());
        assert_eq!(metrics.requests_per_minute(), 0);
    }

    #[test]
    fn sequential_observations_track_min_max_and_decaying_mean() {
        let metrics = AggregateMetrics::new();
        let samples = [300u64, 100, 700, 50, 400];

        let mut expected_mean = samples[0];
        for (i, &s) in samples.iter().enumerate() {
            metrics.observe(&observation_with_length(s));
            if i > 0 {
                expected_mean = (expected_mean + s) / 2;
            }
        }

        let body = metrics.body_length();
        assert_eq!(body.minimum, 50);
        assert_eq!(body.maximum, 700);
        assert_eq!(body.mean, expected_mean);
        // Not the arithmetic mean (310).
        assert_eq!(body.mean, 325);
        assert_eq!(metrics.total_observed_requests(), samples.len() as u64);
    }

    #[test]
    fn first_observation_is_not_averaged_against_zero() {
        let metrics = AggregateMetrics::new();
        metrics.observe(&observation_with_length(1000));
        let body = metrics.body_length();
        assert_eq!(body.minimum, 1000);
        assert_eq!(body.maximum, 1000);
        assert_eq!(body.mean, 1000);
    }

    #[test]
    fn concurrent_observations_keep_groups_whole() {
        let metrics = Arc::new(AggregateMetrics::new());

        thread::scope(|s| {
            for worker in 0..8u64 {
                let metrics = metrics.clone();
                s.spawn(move || {
                    for i in 0..250u64 {
                        metrics.observe(&observation_with_length(worker * 1000 + i + 1));
                    }
                });
            }
            // Concurrent reader: every snapshot must satisfy the family invariant.
            let reader = metrics.clone();
            s.spawn(move || {
                for _ in 0..500 {
                    let snap = reader.snapshot();
                    if snap.total_observed_requests > 0 {
                        let b = snap.body_length;
                        assert!(b.minimum <= b.mean && b.mean <= b.maximum);
                    }
                }
            });
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.total_observed_requests, 2000);
        assert_eq!(snap.body_length.minimum, 1);
        assert_eq!(snap.body_length.maximum, 7250);
        assert!(snap.body_length.minimum <= snap.body_length.mean);
        assert!(snap.body_length.mean <= snap.body_length.maximum);
    }

    #[test]
    fn rate_divides_by_minutes_plus_one_and_caps_at_total() {
        assert_eq!(requests_per_minute(0, Duration::ZERO), 0);
        assert_eq!(requests_per_minute(10, Duration::from_secs(5)), 10);
        assert_eq!(requests_per_minute(10, Duration::from_secs(60)), 5);
        assert_eq!(requests_per_minute(10, Duration::from_secs(179)), 3);
    }

    #[test]
    fn snapshot_serializes_every_family() {
        let metrics = AggregateMetrics::new();
        metrics.observe(&observation_with_length(64));
        let json = serde_json::to_value(metrics.snapshot()).expect("serialize");
        assert_eq!(json["body_length"]["maximum"], 64);
        assert_eq!(json["total_observed_requests"], 1);
        assert!(json.get("request_ms").is_some());
        assert!(json.get("handler_ms").is_some());
    }
}
