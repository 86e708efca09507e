use crate::publisher::EventPublisher;
use crate::splitter::split_events;
use qdaq_foundation::{
    AcquisitionConfig, SessionError, SessionState, StateManager, CHANNEL_COUNT, MAX_THRESHOLD,
};
use qdaq_hardware::SharedWordSource;
use qdaq_storage::EventStore;
use qdaq_telemetry::AcquisitionMetrics;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Consecutive failed appends tolerated before the run is aborted; disk-full
/// and permission problems do not clear on their own.
const MAX_CONSECUTIVE_APPEND_FAILURES: u32 = 8;

const JOIN_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

/// Totals for one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub lost_words: u64,
}

/// One digitizer readout session.
///
/// The session owns the lifecycle: `start()` opens a per-run store and spawns
/// the worker thread, `stop()` cancels it cooperatively and joins with a
/// bounded timeout. The word source and the publisher are shared
/// collaborators; the store handle and the worker exist only while a run is
/// active. The session object itself survives across runs and can be
/// reconfigured between them.
pub struct AcquisitionSession {
    config: AcquisitionConfig,
    source: SharedWordSource,
    publisher: EventPublisher,
    metrics: Arc<AcquisitionMetrics>,
    state: StateManager,
    worker: Option<WorkerHandle>,
}

struct WorkerHandle {
    handle: JoinHandle<Result<(), SessionError>>,
    running: Arc<AtomicBool>,
}

impl AcquisitionSession {
    pub fn new(
        source: SharedWordSource,
        publisher: EventPublisher,
        config: AcquisitionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            publisher,
            metrics: Arc::new(AcquisitionMetrics::default()),
            state: StateManager::new(),
            worker: None,
        })
    }

    /// Begins acquiring into a fresh store named after `output_name`.
    /// Non-blocking; a second `start()` while running is ignored.
    pub fn start(&mut self, output_name: &str) -> Result<(), SessionError> {
        match self.state.current() {
            SessionState::Running => {
                tracing::warn!("acquisition already running, start ignored");
                return Ok(());
            }
            SessionState::Stopping => {
                return Err(SessionError::Worker("session is still stopping".into()));
            }
            SessionState::Idle => {}
        }

        let path = self.store_path(output_name);
        let store = EventStore::create(&path, self.config.sample_count)?;
        self.metrics.reset_run_counters();

        let running = Arc::new(AtomicBool::new(true));
        let worker = AcquisitionWorker {
            source: Arc::clone(&self.source),
            publisher: self.publisher.clone(),
            store,
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
            running: Arc::clone(&running),
        };
        let handle = thread::Builder::new()
            .name("qdaq-acquisition".into())
            .spawn(move || worker.run())
            .map_err(|e| SessionError::Worker(format!("failed to spawn worker: {e}")))?;

        self.state.transition(SessionState::Running)?;
        self.worker = Some(WorkerHandle { handle, running });
        tracing::info!(output = output_name, path = %path.display(), "acquisition started");
        Ok(())
    }

    /// Cancels the worker and waits for it, bounded by `stop_timeout`.
    ///
    /// Returns the run totals on a clean stop; a worker that already died of
    /// a source or storage failure surfaces that failure here. Calling
    /// `stop()` with no run active is a no-op.
    pub fn stop(&mut self) -> Result<RunSummary, SessionError> {
        let Some(worker) = self.worker.take() else {
            tracing::info!("no measurement was running");
            return Ok(self.summary());
        };

        self.state.transition(SessionState::Stopping)?;
        worker.running.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + self.config.stop_timeout;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        let outcome = if worker.handle.is_finished() {
            match worker.handle.join() {
                Ok(result) => result,
                Err(_) => Err(SessionError::Worker("acquisition worker panicked".into())),
            }
        } else {
            // The worker flushes and closes the store on its own exit path,
            // whenever that happens; nothing more can be released here.
            tracing::warn!(
                timeout = ?self.config.stop_timeout,
                "worker did not exit within timeout, abandoning it"
            );
            Ok(())
        };

        self.state.transition(SessionState::Idle)?;
        let summary = self.summary();
        tracing::info!(
            events = summary.events,
            lost_words = summary.lost_words,
            "measurement stopped"
        );
        outcome.map(|()| summary)
    }

    /// Writes the trigger threshold through to the hardware.
    pub fn set_threshold(&mut self, threshold: u16) -> Result<(), SessionError> {
        if threshold > MAX_THRESHOLD {
            return Err(SessionError::Config(format!(
                "threshold {threshold} exceeds ADC range {MAX_THRESHOLD}"
            )));
        }
        self.source.lock().set_threshold(threshold)?;
        self.config.threshold = threshold;
        Ok(())
    }

    /// Selects the digitizer input channel.
    pub fn select_channel(&mut self, channel: u8) -> Result<(), SessionError> {
        if channel >= CHANNEL_COUNT {
            return Err(SessionError::Config(format!(
                "channel {channel} out of range 0..{CHANNEL_COUNT}"
            )));
        }
        self.source.lock().select_channel(channel)?;
        self.config.channel = channel;
        Ok(())
    }

    /// Changes the event geometry. Only allowed between runs: the open
    /// store's row width is fixed at `start()`.
    pub fn set_event_size(
        &mut self,
        sample_count: usize,
        sample_delay: usize,
    ) -> Result<(), SessionError> {
        if self.state.current() != SessionState::Idle {
            tracing::warn!("event size can only be changed while idle");
            return Err(SessionError::Worker(
                "event size can only be changed while idle".into(),
            ));
        }
        if sample_count == 0 {
            return Err(SessionError::Config("sample_count must be non-zero".into()));
        }
        self.source.lock().reconfigure(sample_count, sample_delay)?;
        self.config.sample_count = sample_count;
        self.config.sample_delay = sample_delay;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    pub fn event_count(&self) -> u64 {
        self.metrics.events()
    }

    pub fn lost_word_count(&self) -> u64 {
        self.metrics.lost_words()
    }

    pub fn metrics(&self) -> Arc<AcquisitionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Where a run with this output name lands on disk.
    pub fn store_path(&self, output_name: &str) -> PathBuf {
        self.config.data_dir.join(format!("{output_name}.arrow"))
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            events: self.metrics.events(),
            lost_words: self.metrics.lost_words(),
        }
    }
}

struct AcquisitionWorker {
    source: SharedWordSource,
    publisher: EventPublisher,
    store: EventStore,
    metrics: Arc<AcquisitionMetrics>,
    config: AcquisitionConfig,
    running: Arc<AtomicBool>,
}

impl AcquisitionWorker {
    fn run(mut self) -> Result<(), SessionError> {
        tracing::info!("acquisition worker started");
        let outcome = self.acquire_loop();

        // Unconditional on every exit path, clean or not.
        if let Err(e) = self.store.flush() {
            tracing::error!(error = %e, "final flush failed");
        }
        if let Err(e) = self.store.finish() {
            tracing::error!(error = %e, "store close failed");
        }

        match &outcome {
            Ok(()) => tracing::info!(events = self.metrics.events(), "acquisition worker stopped"),
            Err(e) => tracing::error!(error = %e, "acquisition worker terminated abnormally"),
        }
        outcome
    }

    fn acquire_loop(&mut self) -> Result<(), SessionError> {
        let mut appended_total: u64 = 0;
        let mut consecutive_append_failures: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            let block = self.source.lock().pull()?;
            self.metrics.increment_batches();

            if block.lost_words > 0 {
                self.recover_from_overflow(block.lost_words);
                continue;
            }

            let records = split_events(&block.words, self.config.sample_count);
            if records.is_empty() {
                if block.is_empty() {
                    thread::sleep(self.config.poll_interval);
                }
                continue;
            }

            if !self
                .publisher
                .publish(&records, self.config.threshold, self.config.channel)
            {
                self.metrics.increment_publish_drops();
            }

            match self.store.append(&records) {
                Ok(appended) => {
                    consecutive_append_failures = 0;
                    let appended = appended as u64;
                    self.metrics.add_events(appended);
                    if crossed_flush_boundary(
                        appended_total,
                        appended,
                        self.config.write_after_n_events,
                    ) {
                        self.flush_store(appended_total + appended);
                    }
                    appended_total += appended;
                }
                Err(e) => {
                    consecutive_append_failures += 1;
                    self.metrics.increment_append_failures();
                    tracing::error!(
                        error = %e,
                        failures = consecutive_append_failures,
                        "append failed, batch not persisted"
                    );
                    if consecutive_append_failures >= MAX_CONSECUTIVE_APPEND_FAILURES {
                        return Err(SessionError::Storage(e));
                    }
                }
            }
        }
        Ok(())
    }

    /// The pulled words may already be corrupt and the FIFO read is
    /// destructive, so the whole cycle is discarded before the receiver is
    /// reset and re-armed; the splitter's edge policy absorbs the partial
    /// frame the next cycle starts with.
    fn recover_from_overflow(&mut self, lost: u32) {
        tracing::error!(lost, "hardware buffer overflow, discarding cycle");
        self.metrics.add_lost_words(u64::from(lost));
        self.metrics.increment_overflow_cycles();

        let mut source = self.source.lock();
        if let Err(e) = source.reset() {
            tracing::error!(error = %e, "source reset failed after overflow");
        }
        if let Err(e) = source.reconfigure(self.config.sample_count, self.config.sample_delay) {
            tracing::error!(error = %e, "source reconfigure failed after overflow");
        }
    }

    fn flush_store(&mut self, events: u64) {
        match self.store.flush() {
            Ok(()) => {
                self.metrics.increment_store_flushes();
                tracing::info!(events, "periodic store flush");
            }
            Err(e) => tracing::error!(error = %e, "periodic flush failed"),
        }
    }
}

/// Whether appending `appended` records on top of `prev_total` crossed a
/// multiple of `every_n`. The modulo wraps on a crossing, which catches
/// batches that skip over the exact multiple; a batch of `every_n` or more
/// records has always crossed one.
fn crossed_flush_boundary(prev_total: u64, appended: u64, every_n: u64) -> bool {
    if every_n == 0 || appended == 0 {
        return false;
    }
    appended >= every_n || (prev_total + appended) % every_n < prev_total % every_n
}
