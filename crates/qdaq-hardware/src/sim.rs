//! Sources that stand in for the FPGA readout: a pulse generator for demos
//! and soak runs, and a scripted source for deterministic tests.

use crate::word::{RawWord, WordBlock, AMPLITUDE_MASK};
use crate::WordSource;
use parking_lot::Mutex;
use qdaq_foundation::SourceError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared observation handles into a simulated source.
///
/// Tests hand the source to a session behind a trait object and keep a probe
/// clone to assert on what the session did to it.
#[derive(Clone, Default)]
pub struct SourceProbe {
    pub pulls: Arc<AtomicU64>,
    pub resets: Arc<AtomicU64>,
    pub reconfigures: Arc<AtomicU64>,
    pub thresholds_set: Arc<AtomicU64>,
    pub channels_set: Arc<AtomicU64>,
    pub last_event_size: Arc<Mutex<Option<(usize, usize)>>>,
}

impl SourceProbe {
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn reconfigure_count(&self) -> u64 {
        self.reconfigures.load(Ordering::SeqCst)
    }
}

const BASELINE: u32 = 80;

/// Deterministic pulse generator.
///
/// Every pull yields a truncated fragment, a run of complete tagged events,
/// and a truncated tagged tail — the same shape a batch window cut out of the
/// continuous hardware stream has, so the splitter's edge handling is
/// exercised exactly as in production.
pub struct SimSource {
    sample_count: usize,
    sample_delay: usize,
    events_per_pull: usize,
    threshold: u16,
    rng: StdRng,
    queued_overflows: VecDeque<u32>,
    emit_interval: std::time::Duration,
    last_emit: Option<std::time::Instant>,
    probe: SourceProbe,
}

impl SimSource {
    pub fn new(sample_count: usize, sample_delay: usize) -> Self {
        Self {
            sample_count,
            sample_delay,
            events_per_pull: 8,
            threshold: 4000,
            rng: StdRng::seed_from_u64(0x51AB),
            queued_overflows: VecDeque::new(),
            emit_interval: std::time::Duration::from_millis(5),
            last_emit: None,
            probe: SourceProbe::default(),
        }
    }

    pub fn with_events_per_pull(mut self, events_per_pull: usize) -> Self {
        self.events_per_pull = events_per_pull;
        self
    }

    /// How long the simulated FIFO takes to fill up again after a pull.
    pub fn with_emit_interval(mut self, emit_interval: std::time::Duration) -> Self {
        self.emit_interval = emit_interval;
        self
    }

    /// Makes one upcoming pull report `lost` dropped words.
    pub fn queue_overflow(&mut self, lost: u32) {
        self.queued_overflows.push_back(lost);
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }

    fn noise(&mut self) -> u32 {
        BASELINE + self.rng.gen_range(0..8)
    }

    fn synth_event(&mut self) -> Vec<RawWord> {
        let peak = (self.threshold as u32 + self.rng.gen_range(16..1200)).min(AMPLITUDE_MASK);
        let peak_at = self.sample_delay.min(self.sample_count.saturating_sub(1));
        let mut words = Vec::with_capacity(self.sample_count);
        for i in 0..self.sample_count {
            let baseline = self.noise();
            let amplitude = if i < peak_at {
                baseline
            } else {
                // tail halves every 8 samples past the trigger point
                let decay = (((i - peak_at) / 8) as u32).min(31);
                baseline + (peak.saturating_sub(baseline) >> decay)
            };
            words.push(if i == 0 {
                RawWord::tagged(amplitude)
            } else {
                RawWord::untagged(amplitude)
            });
        }
        words
    }
}

impl WordSource for SimSource {
    fn pull(&mut self) -> Result<WordBlock, SourceError> {
        self.probe.pulls.fetch_add(1, Ordering::SeqCst);

        if let Some(lost) = self.queued_overflows.pop_front() {
            // The hardware still hands over whatever made it into the FIFO.
            let words = self.synth_event();
            return Ok(WordBlock {
                words,
                lost_words: lost,
            });
        }

        // the FIFO refills at the simulated trigger rate
        if let Some(last) = self.last_emit {
            if last.elapsed() < self.emit_interval {
                return Ok(WordBlock::default());
            }
        }
        self.last_emit = Some(std::time::Instant::now());

        let mut words = Vec::new();
        // tail of an event whose start fell outside this batch window
        for _ in 0..self.sample_count / 3 {
            let amplitude = self.noise();
            words.push(RawWord::untagged(amplitude));
        }
        for _ in 0..self.events_per_pull {
            words.extend(self.synth_event());
        }
        // start of an event the window cuts off
        let mut tail = self.synth_event();
        tail.truncate(self.sample_count / 4 + 1);
        words.extend(tail);

        Ok(WordBlock {
            words,
            lost_words: 0,
        })
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        tracing::debug!("simulated receiver reset");
        self.last_emit = None;
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reconfigure(&mut self, sample_count: usize, sample_delay: usize) -> Result<(), SourceError> {
        tracing::debug!(sample_count, sample_delay, "simulated receiver re-armed");
        self.sample_count = sample_count;
        self.sample_delay = sample_delay;
        self.probe.reconfigures.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_event_size.lock() = Some((sample_count, sample_delay));
        Ok(())
    }

    fn set_threshold(&mut self, threshold: u16) -> Result<(), SourceError> {
        self.threshold = threshold;
        self.probe.thresholds_set.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn select_channel(&mut self, _channel: u8) -> Result<(), SourceError> {
        self.probe.channels_set.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A source driven by a queue of canned pull results; once the script is
/// exhausted every further pull returns an empty block.
#[derive(Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<WordBlock, SourceError>>,
    probe: SourceProbe,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }

    pub fn push_block(&mut self, words: Vec<RawWord>) {
        self.script.push_back(Ok(WordBlock {
            words,
            lost_words: 0,
        }));
    }

    pub fn push_overflow(&mut self, lost_words: u32, words: Vec<RawWord>) {
        self.script.push_back(Ok(WordBlock { words, lost_words }));
    }

    pub fn push_error(&mut self, error: SourceError) {
        self.script.push_back(Err(error));
    }
}

impl WordSource for ScriptedSource {
    fn pull(&mut self) -> Result<WordBlock, SourceError> {
        self.probe.pulls.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or_else(|| Ok(WordBlock::default()))
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reconfigure(&mut self, sample_count: usize, sample_delay: usize) -> Result<(), SourceError> {
        self.probe.reconfigures.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_event_size.lock() = Some((sample_count, sample_delay));
        Ok(())
    }

    fn set_threshold(&mut self, _threshold: u16) -> Result<(), SourceError> {
        self.probe.thresholds_set.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn select_channel(&mut self, _channel: u8) -> Result<(), SourceError> {
        self.probe.channels_set.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_pull_frames_complete_events() {
        let mut src = SimSource::new(16, 4).with_events_per_pull(3);
        let block = src.pull().unwrap();
        assert_eq!(block.lost_words, 0);

        let starts: Vec<usize> = block
            .words
            .iter()
            .enumerate()
            .filter(|(_, w)| w.starts_event())
            .map(|(i, _)| i)
            .collect();
        // three complete events plus the truncated tail start
        assert_eq!(starts.len(), 4);
        assert_eq!(starts[1] - starts[0], 16);
        assert_eq!(starts[2] - starts[1], 16);
        // leading fragment carries no tag
        assert!(starts[0] > 0);
    }

    #[test]
    fn sim_amplitudes_stay_in_adc_range() {
        let mut src = SimSource::new(32, 8);
        let block = src.pull().unwrap();
        assert!(block.words.iter().all(|w| w.amplitude() <= AMPLITUDE_MASK));
    }

    #[test]
    fn queued_overflow_is_reported_once() {
        let mut src = SimSource::new(16, 4);
        src.queue_overflow(42);
        assert_eq!(src.pull().unwrap().lost_words, 42);
        assert_eq!(src.pull().unwrap().lost_words, 0);
    }

    #[test]
    fn scripted_source_replays_then_idles() {
        let mut src = ScriptedSource::new();
        src.push_block(vec![RawWord::tagged(5)]);
        src.push_error(SourceError::Disconnected);

        assert_eq!(src.pull().unwrap().words.len(), 1);
        assert!(matches!(src.pull(), Err(SourceError::Disconnected)));
        assert!(src.pull().unwrap().is_empty());
        assert_eq!(src.probe().pull_count(), 3);
    }
}
