//! Round-trip coverage for the on-disk event table.

use qdaq_foundation::EventRecord;
use qdaq_storage::{read_all, EventStore};
use tempfile::tempdir;

fn ramp(start: u32, width: usize) -> EventRecord {
    EventRecord::new((0..width as u32).map(|i| start + i).collect())
}

#[test]
fn appended_batches_concatenate_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.arrow");

    let mut store = EventStore::create(&path, 4).unwrap();
    let first: Vec<EventRecord> = (0..3).map(|i| ramp(i * 100, 4)).collect();
    let second: Vec<EventRecord> = (3..8).map(|i| ramp(i * 100, 4)).collect();

    assert_eq!(store.append(&first).unwrap(), 3);
    store.flush().unwrap();
    assert_eq!(store.append(&second).unwrap(), 5);
    assert_eq!(store.rows_written(), 8);
    store.finish().unwrap();

    let rows = read_all(&path).unwrap();
    assert_eq!(rows.len(), 8);
    let expected: Vec<EventRecord> = first.into_iter().chain(second).collect();
    assert_eq!(rows, expected);
}

#[test]
fn flush_between_appends_does_not_corrupt_the_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.arrow");

    let mut store = EventStore::create(&path, 2).unwrap();
    for i in 0..10u32 {
        store.append(&[ramp(i, 2)]).unwrap();
        store.flush().unwrap();
    }
    store.finish().unwrap();

    assert_eq!(read_all(&path).unwrap().len(), 10);
}

#[test]
fn finish_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.arrow");

    let mut store = EventStore::create(&path, 2).unwrap();
    store.append(&[ramp(0, 2)]).unwrap();
    store.finish().unwrap();
    store.finish().unwrap();

    assert_eq!(read_all(&path).unwrap().len(), 1);
}

#[test]
fn amplitude_values_survive_the_full_adc_range() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.arrow");

    let extremes = EventRecord::new(vec![0, 1, 0x3FFE, 0x3FFF]);
    let mut store = EventStore::create(&path, 4).unwrap();
    store.append(std::slice::from_ref(&extremes)).unwrap();
    store.finish().unwrap();

    assert_eq!(read_all(&path).unwrap(), vec![extremes]);
}
