//! The acquisition core: reconstructs fixed-length pulse events out of the
//! tagged word stream and fans each batch out to a lossy live channel and a
//! durable on-disk table, under a start/stop session lifecycle.

pub mod publisher;
pub mod session;
pub mod splitter;

pub use publisher::{BatchDescriptor, EventBatch, EventPublisher};
pub use session::{AcquisitionSession, RunSummary};
pub use splitter::split_events;
