use qdaq_foundation::EventRecord;
use qdaq_hardware::RawWord;

/// Splits one pulled batch of tagged words into complete event records.
///
/// Words carrying the new-event tag mark frame starts. The amplitude mask is
/// applied to every word, the masked sequence is partitioned at the tagged
/// positions, and candidates that cannot be complete are discarded:
///
/// * with two or more tagged positions, the first and last candidates are
///   dropped unconditionally — a frame touching either edge of the batch
///   window may have been truncated by it;
/// * with at most one tagged position the entire sequence is a single
///   candidate, untrimmed;
/// * only candidates of exactly `sample_count` samples survive, in input
///   order. Any other length means a partial or corrupted capture, which is
///   dropped silently.
pub fn split_events(words: &[RawWord], sample_count: usize) -> Vec<EventRecord> {
    if sample_count == 0 {
        return Vec::new();
    }

    let boundaries: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, w)| w.starts_event())
        .map(|(i, _)| i)
        .collect();
    let amplitudes: Vec<u32> = words.iter().map(|w| w.amplitude()).collect();

    let mut candidates: Vec<&[u32]> = Vec::with_capacity(boundaries.len() + 1);
    if boundaries.len() <= 1 {
        candidates.push(&amplitudes[..]);
    } else {
        if boundaries[0] > 0 {
            candidates.push(&amplitudes[..boundaries[0]]);
        }
        for pair in boundaries.windows(2) {
            candidates.push(&amplitudes[pair[0]..pair[1]]);
        }
        candidates.push(&amplitudes[boundaries[boundaries.len() - 1]..]);

        // edge frames may be cut by the batch window
        candidates.remove(0);
        candidates.pop();
    }

    let total = candidates.len();
    let records: Vec<EventRecord> = candidates
        .into_iter()
        .filter(|c| c.len() == sample_count)
        .map(|c| EventRecord::new(c.to_vec()))
        .collect();
    if records.len() < total {
        tracing::trace!(
            dropped = total - records.len(),
            kept = records.len(),
            "discarded off-size candidate frames"
        );
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdaq_hardware::{NEW_EVENT_FLAG, RawWord};

    fn words(raw: &[u32]) -> Vec<RawWord> {
        raw.iter().map(|&w| RawWord(w)).collect()
    }

    fn record(samples: &[u32]) -> EventRecord {
        EventRecord::new(samples.to_vec())
    }

    #[test]
    fn interior_frames_survive_edge_trimming() {
        // tags at 0, 2, 4 -> candidates of lengths 2, 2, 1; only the
        // interior one is kept
        let input = words(&[0x1000_0005, 0x0000_0007, 0x1000_0009, 0x0000_000B, 0x1000_0003]);
        let out = split_events(&input, 2);
        assert_eq!(out, vec![record(&[9, 11])]);
    }

    #[test]
    fn first_and_last_candidates_are_dropped_even_when_complete() {
        // every candidate has the right length; the edge ones still go
        let mut input = Vec::new();
        for start in [100u32, 200, 300, 400] {
            input.push(RawWord::tagged(start));
            input.push(RawWord::untagged(start + 1));
        }
        let out = split_events(&input, 2);
        assert_eq!(out, vec![record(&[200, 201]), record(&[300, 301])]);
    }

    #[test]
    fn untagged_leading_fragment_counts_as_the_first_candidate() {
        // the fragment before the first tag is the truncated tail of an
        // earlier frame; dropping it must not cost the first tagged frame
        let input = words(&[
            0x0000_0063, // tail fragment
            0x1000_000A,
            0x0000_000B,
            0x1000_0014,
            0x0000_0015,
            0x1000_001E,
        ]);
        let out = split_events(&input, 2);
        assert_eq!(out, vec![record(&[10, 11]), record(&[20, 21])]);
    }

    #[test]
    fn single_boundary_keeps_the_whole_sequence() {
        let input = words(&[0x1000_0001, 0x0000_0002, 0x0000_0003]);
        assert_eq!(split_events(&input, 3), vec![record(&[1, 2, 3])]);
        // and the length filter still applies
        assert!(split_events(&input, 2).is_empty());
    }

    #[test]
    fn no_boundary_keeps_the_whole_sequence() {
        let input = words(&[0x0000_0004, 0x0000_0005]);
        assert_eq!(split_events(&input, 2), vec![record(&[4, 5])]);
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(split_events(&[], 2).is_empty());
    }

    #[test]
    fn zero_sample_count_yields_no_records() {
        let input = words(&[0x1000_0001]);
        assert!(split_events(&input, 0).is_empty());
    }

    #[test]
    fn flag_bits_are_masked_out_of_amplitudes() {
        let input = words(&[
            NEW_EVENT_FLAG | 0x3FFF,
            0x0000_0001,
            NEW_EVENT_FLAG | 0x0002,
            0x0000_0003,
            NEW_EVENT_FLAG | 0x0004,
        ]);
        let out = split_events(&input, 2);
        assert_eq!(out, vec![record(&[2, 3])]);
    }

    #[test]
    fn off_size_interior_frames_are_dropped_silently() {
        // interior candidates of lengths 2 and 3; only the first survives
        let input = words(&[
            0x1000_0001,
            0x1000_0002,
            0x0000_0003,
            0x1000_0004,
            0x0000_0005,
            0x0000_0006,
            0x1000_0007,
        ]);
        let out = split_events(&input, 2);
        assert_eq!(out, vec![record(&[2, 3])]);
    }

    #[test]
    fn split_is_pure() {
        let input = words(&[0x1000_0005, 0x0000_0007, 0x1000_0009, 0x0000_000B, 0x1000_0003]);
        assert_eq!(split_events(&input, 2), split_events(&input, 2));
    }

    #[test]
    fn output_preserves_input_order() {
        let mut input = Vec::new();
        for start in 0..6u32 {
            input.push(RawWord::tagged(start * 10));
            input.push(RawWord::untagged(start * 10 + 1));
        }
        let out = split_events(&input, 2);
        let starts: Vec<u32> = out.iter().map(|r| r.samples()[0]).collect();
        assert_eq!(starts, vec![10, 20, 30, 40]);
    }
}
