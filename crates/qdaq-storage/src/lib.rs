//! Durable sink for reconstructed events: one growable compressed table per
//! acquisition run.

pub mod event_store;

pub use event_store::{read_all, EventStore, TABLE_NAME};
