use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared counters for cross-thread acquisition monitoring.
///
/// `event_count` and `lost_word_count` have a single writer (the acquisition
/// worker) and any number of readers; they use release/acquire ordering so a
/// polling controller never observes an event total ahead of the data that
/// was actually appended to the store. The remaining counters are
/// diagnostics and use relaxed ordering.
#[derive(Clone)]
pub struct AcquisitionMetrics {
    pub event_count: Arc<AtomicU64>,
    pub lost_word_count: Arc<AtomicU64>,

    pub batches_pulled: Arc<AtomicU64>,
    pub overflow_cycles: Arc<AtomicU64>,
    pub publish_drops: Arc<AtomicU64>,
    pub append_failures: Arc<AtomicU64>,
    pub store_flushes: Arc<AtomicU64>,

    pub last_batch_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for AcquisitionMetrics {
    fn default() -> Self {
        Self {
            event_count: Arc::new(AtomicU64::new(0)),
            lost_word_count: Arc::new(AtomicU64::new(0)),

            batches_pulled: Arc::new(AtomicU64::new(0)),
            overflow_cycles: Arc::new(AtomicU64::new(0)),
            publish_drops: Arc::new(AtomicU64::new(0)),
            append_failures: Arc::new(AtomicU64::new(0)),
            store_flushes: Arc::new(AtomicU64::new(0)),

            last_batch_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl AcquisitionMetrics {
    pub fn add_events(&self, n: u64) {
        self.event_count.fetch_add(n, Ordering::Release);
        *self.last_batch_time.write() = Some(Instant::now());
    }

    pub fn events(&self) -> u64 {
        self.event_count.load(Ordering::Acquire)
    }

    pub fn add_lost_words(&self, n: u64) {
        self.lost_word_count.fetch_add(n, Ordering::Release);
    }

    pub fn lost_words(&self) -> u64 {
        self.lost_word_count.load(Ordering::Acquire)
    }

    /// Called on session start; a run's counters always begin at zero.
    pub fn reset_run_counters(&self) {
        self.event_count.store(0, Ordering::Release);
        self.lost_word_count.store(0, Ordering::Release);
        self.batches_pulled.store(0, Ordering::Relaxed);
        self.overflow_cycles.store(0, Ordering::Relaxed);
        self.publish_drops.store(0, Ordering::Relaxed);
        self.append_failures.store(0, Ordering::Relaxed);
        self.store_flushes.store(0, Ordering::Relaxed);
        *self.last_batch_time.write() = None;
    }

    pub fn increment_batches(&self) {
        self.batches_pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_overflow_cycles(&self) {
        self.overflow_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_publish_drops(&self) {
        self.publish_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_append_failures(&self) {
        self.append_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_flushes(&self) {
        self.store_flushes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Converts polled event-count deltas into an events/sec figure, emitting a
/// new value roughly once per second.
#[derive(Debug)]
pub struct RateTracker {
    last_update: Instant,
    events: u64,
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            events: 0,
        }
    }

    pub fn tick(&mut self, new_events: u64) -> Option<f64> {
        self.events += new_events;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let rate = self.events as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.events = 0;
            Some(rate)
        } else {
            None
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}
