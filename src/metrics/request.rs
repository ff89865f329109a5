use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use once_cell::sync::Lazy;

/// Anchor for measurements that were never started.
static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Source of `RequestObservation::sequence_id`.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Per-request timing and size record.
///
/// Created when the request enters the pipeline, marked by the lifecycle
/// middleware, sampled by the rewrite filter and finally folded into the
/// shared [`AggregateMetrics`](super::AggregateMetrics). Instances are not
/// reused across requests.
///
/// Every mutator takes `&self` so one record can be shared (`Arc`) between
/// the middleware that marks it and the filter that samples it.
#[derive(Debug)]
pub struct RequestObservation {
    sequence_id: u64,
    source_uri: String,
    request_start: OnceLock<Instant>,
    handler_start: OnceLock<Instant>,
    response_body_length: AtomicU64,
}

impl RequestObservation {
    pub fn new(source_uri: impl Into<String>) -> Self {
        // Touch the anchor so unmarked measurements count from no later
        // than the first record ever built.
        Lazy::force(&PROCESS_START);
        Self {
            sequence_id: SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1,
            source_uri: source_uri.into(),
            request_start: OnceLock::new(),
            handler_start: OnceLock::new(),
            response_body_length: AtomicU64::new(0),
        }
    }

    /// Unique within the process, strictly increasing.
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// Start the request stopwatch. Later calls are ignored.
    pub fn mark_request_start(&self) {
        let _ = self.request_start.set(Instant::now());
    }

    /// Start the handler stopwatch. Later calls are ignored.
    pub fn mark_handler_start(&self) {
        let _ = self.handler_start.set(Instant::now());
    }

    pub fn sample_response_length(&self, length: u64) {
        self.response_body_length.store(length, Ordering::Relaxed);
    }

    /// Milliseconds since the request was marked, or since process start.
    pub fn request_elapsed_ms(&self) -> u64 {
        elapsed_ms(&self.request_start)
    }

    /// Milliseconds since the handler was marked, or since process start.
    pub fn handler_elapsed_ms(&self) -> u64 {
        elapsed_ms(&self.handler_start)
    }

    pub fn response_body_length(&self) -> u64 {
        self.response_body_length.load(Ordering::Relaxed)
    }
}

fn elapsed_ms(mark: &OnceLock<Instant>) -> u64 {
    let since = mark.get().copied().unwrap_or(*PROCESS_START);
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sequence_ids_strictly_increase() {
        let a = RequestObservation::new("/a");
        let b = RequestObservation::new("/b");
        let c = RequestObservation::new("/c");
        assert!(a.sequence_id() < b.sequence_id());
        assert!(b.sequence_id() < c.sequence_id());
        assert_eq!(a.source_uri(), "/a");
    }

    #[test]
    fn sequence_ids_unique_across_threads() {
        let mut ids: Vec<u64> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..100)
                            .map(|_| RequestObservation::new("/").sequence_id())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("worker"))
                .collect()
        });
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 800);
    }

    #[test]
    fn marks_only_take_effect_once() {
        let obs = RequestObservation::new("/");
        obs.mark_request_start();
        thread::sleep(Duration::from_millis(20));
        // A second mark must not reset the stopwatch.
        obs.mark_request_start();
        assert!(obs.request_elapsed_ms() >= 20);
    }

    #[test]
    fn handler_never_exceeds_request_when_marked_in_order() {
        let obs = RequestObservation::new("/");
        obs.mark_request_start();
        thread::sleep(Duration::from_millis(5));
        obs.mark_handler_start();
        assert!(obs.handler_elapsed_ms() <= obs.request_elapsed_ms());
    }

    #[test]
    fn unmarked_measurements_read_without_failing() {
        let obs = RequestObservation::new("/");
        let first = obs.request_elapsed_ms();
        thread::sleep(Duration::from_millis(2));
        assert!(obs.request_elapsed_ms() >= first);
        let _ = obs.handler_elapsed_ms();
        assert_eq!(obs.response_body_length(), 0);
    }

    #[test]
    fn response_length_is_zero_until_sampled() {
        let obs = RequestObservation::new("/");
        assert_eq!(obs.response_body_length(), 0);
        obs.sample_response_length(1234);
        assert_eq!(obs.response_body_length(), 1234);
    }
}
