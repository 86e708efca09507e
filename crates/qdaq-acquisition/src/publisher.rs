use bytes::Bytes;
use qdaq_foundation::EventRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Element type of the published payload, numpy-style.
pub const PAYLOAD_DTYPE: &str = "uint32";

/// Describes one published batch: who produced it, how the payload bytes are
/// laid out, and the trigger settings it was taken under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub source_name: String,
    pub dtype: String,
    pub shape: (usize, usize),
    pub threshold: u16,
    pub channel: u8,
}

/// A batch descriptor plus its row-major little-endian payload. Cloning is
/// cheap, so every subscriber gets its own handle to the same bytes.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub descriptor: BatchDescriptor,
    pub payload: Bytes,
}

impl EventBatch {
    /// Decodes the payload back into records, row by row.
    pub fn records(&self) -> Vec<EventRecord> {
        let (rows, width) = self.descriptor.shape;
        let mut out = Vec::with_capacity(rows);
        let mut cells = self
            .payload
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        for _ in 0..rows {
            out.push(EventRecord::new(cells.by_ref().take(width).collect()));
        }
        out
    }
}

/// Best-effort fan-out to live subscribers (the online monitor).
///
/// Publishing never blocks the acquisition loop: with no subscriber attached
/// the batch is dropped on the floor, and a subscriber that falls behind the
/// channel capacity loses the oldest batches, not the newest. Batches that do
/// arrive, arrive in publish order.
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<EventBatch>,
    source_name: String,
}

impl EventPublisher {
    pub fn new(source_name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            source_name: source_name.into(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventBatch> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Hands the batch to the subscriber channel. Returns whether anyone
    /// received it; `false` is not an error.
    pub fn publish(&self, records: &[EventRecord], threshold: u16, channel: u8) -> bool {
        let Some(first) = records.first() else {
            return false;
        };
        let width = first.len();
        let mut payload = Vec::with_capacity(records.len() * width * 4);
        for record in records {
            for &sample in record.samples() {
                payload.extend_from_slice(&sample.to_le_bytes());
            }
        }

        let batch = EventBatch {
            descriptor: BatchDescriptor {
                source_name: self.source_name.clone(),
                dtype: PAYLOAD_DTYPE.to_string(),
                shape: (records.len(), width),
                threshold,
                channel,
            },
            payload: Bytes::from(payload),
        };

        match self.tx.send(batch) {
            Ok(receivers) => {
                tracing::trace!(receivers, rows = records.len(), "published event batch");
                true
            }
            Err(_) => {
                tracing::trace!(rows = records.len(), "no subscriber attached, batch dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(samples: &[u32]) -> EventRecord {
        EventRecord::new(samples.to_vec())
    }

    #[test]
    fn publish_without_subscriber_drops_silently() {
        let publisher = EventPublisher::new("mca0", 8);
        assert!(!publisher.publish(&[record(&[1, 2])], 4000, 0));
    }

    #[test]
    fn subscriber_receives_descriptor_and_payload() {
        let publisher = EventPublisher::new("mca0", 8);
        let mut rx = publisher.subscribe();

        assert!(publisher.publish(&[record(&[7, 9]), record(&[11, 13])], 4000, 2));

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.descriptor.source_name, "mca0");
        assert_eq!(batch.descriptor.dtype, PAYLOAD_DTYPE);
        assert_eq!(batch.descriptor.shape, (2, 2));
        assert_eq!(batch.descriptor.threshold, 4000);
        assert_eq!(batch.descriptor.channel, 2);
        assert_eq!(batch.payload.len(), 16);
        assert_eq!(batch.records(), vec![record(&[7, 9]), record(&[11, 13])]);
    }

    #[test]
    fn delivery_order_matches_publish_order() {
        let publisher = EventPublisher::new("mca0", 8);
        let mut rx = publisher.subscribe();

        for i in 0..4u32 {
            publisher.publish(&[record(&[i, i + 1])], 0, 0);
        }
        for i in 0..4u32 {
            let batch = rx.try_recv().unwrap();
            assert_eq!(batch.records()[0].samples()[0], i);
        }
    }

    #[test]
    fn lagging_subscriber_loses_oldest_batches() {
        let publisher = EventPublisher::new("mca0", 2);
        let mut rx = publisher.subscribe();

        for i in 0..5u32 {
            publisher.publish(&[record(&[i])], 0, 0);
        }
        // capacity 2: the three oldest batches are gone
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
    }

    #[test]
    fn empty_batches_are_not_published() {
        let publisher = EventPublisher::new("mca0", 8);
        let mut rx = publisher.subscribe();
        assert!(!publisher.publish(&[], 0, 0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn descriptor_serializes_for_the_wire() {
        let descriptor = BatchDescriptor {
            source_name: "mca0".into(),
            dtype: PAYLOAD_DTYPE.into(),
            shape: (3, 200),
            threshold: 4000,
            channel: 1,
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: BatchDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }
}
