//! Runs a short acquisition against the simulated source and prints live
//! rates, the way the control layer drives a real session.
//!
//! ```bash
//! cargo run -p qdaq-acquisition --example simulated_run
//! ```

use anyhow::Result;
use qdaq_acquisition::{AcquisitionSession, EventPublisher};
use qdaq_foundation::AcquisitionConfig;
use qdaq_hardware::{shared, SimSource};
use qdaq_telemetry::RateTracker;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AcquisitionConfig {
        sample_count: 200,
        sample_delay: 50,
        write_after_n_events: 1000,
        data_dir: std::env::temp_dir(),
        ..Default::default()
    };

    let source = shared(SimSource::new(config.sample_count, config.sample_delay));
    let publisher = EventPublisher::new("mca0", 64);

    // a stand-in for the online monitor
    let mut rx = publisher.subscribe();
    let monitor = std::thread::spawn(move || {
        use tokio::sync::broadcast::error::RecvError;
        let mut batches = 0u64;
        loop {
            match rx.blocking_recv() {
                Ok(batch) => {
                    batches += 1;
                    if batches % 100 == 0 {
                        let (rows, width) = batch.descriptor.shape;
                        tracing::info!(batches, rows, width, "monitor keeping up");
                    }
                }
                // a slow monitor only loses batches, it never stops the run
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "monitor fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        batches
    });

    let mut session = AcquisitionSession::new(source, publisher, config)?;
    session.start("simulated_run")?;

    let mut rate = RateTracker::new();
    let mut last_count = 0u64;
    for _ in 0..20 {
        std::thread::sleep(Duration::from_millis(100));
        let count = session.event_count();
        if let Some(events_per_sec) = rate.tick(count - last_count) {
            tracing::info!(events = count, rate = events_per_sec as u64, "acquiring");
        }
        last_count = count;
    }

    let summary = session.stop()?;
    drop(session);
    let delivered = monitor.join().expect("monitor thread");
    tracing::info!(
        events = summary.events,
        lost_words = summary.lost_words,
        delivered_batches = delivered,
        "run complete"
    );
    Ok(())
}
