use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Number of selectable digitizer input channels.
pub const CHANNEL_COUNT: u8 = 4;

/// Largest representable trigger threshold (14-bit ADC).
pub const MAX_THRESHOLD: u16 = (1 << 14) - 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Length of one event in ADC samples.
    pub sample_count: usize,
    /// ADC samples recorded before the detected peak.
    pub sample_delay: usize,
    /// Trigger threshold in ADC counts.
    pub threshold: u16,
    /// Selected digitizer channel.
    pub channel: u8,
    /// Flush the store whenever the event total crosses a multiple of this.
    pub write_after_n_events: u64,
    /// Worker sleep between pulls that returned no data.
    pub poll_interval: Duration,
    /// How long `stop()` waits for the worker before abandoning it.
    pub stop_timeout: Duration,
    /// Directory the per-run store files are created in.
    pub data_dir: PathBuf,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_count: 200,
            sample_delay: 50,
            threshold: 4000,
            channel: 0,
            write_after_n_events: 50_000,
            poll_interval: Duration::from_millis(2),
            stop_timeout: Duration::from_secs(1),
            data_dir: PathBuf::from("."),
        }
    }
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.sample_count == 0 {
            return Err(SessionError::Config("sample_count must be non-zero".into()));
        }
        if self.write_after_n_events == 0 {
            return Err(SessionError::Config(
                "write_after_n_events must be non-zero".into(),
            ));
        }
        if self.channel >= CHANNEL_COUNT {
            return Err(SessionError::Config(format!(
                "channel {} out of range 0..{}",
                self.channel, CHANNEL_COUNT
            )));
        }
        if self.threshold > MAX_THRESHOLD {
            return Err(SessionError::Config(format!(
                "threshold {} exceeds ADC range {}",
                self.threshold, MAX_THRESHOLD
            )));
        }
        if self.stop_timeout.is_zero() {
            return Err(SessionError::Config("stop_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AcquisitionConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_sample_count_is_rejected() {
        let cfg = AcquisitionConfig {
            sample_count: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let cfg = AcquisitionConfig {
            channel: CHANNEL_COUNT,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn threshold_above_adc_range_is_rejected() {
        let cfg = AcquisitionConfig {
            threshold: MAX_THRESHOLD + 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
