//! Fixed-size batch accumulation
//!
//! A batch is due when it holds `batch_size` records, or when the running count
//! reaches the total the source announced up front. With a consistent source that is
//! the same as `processed == batch_size * batch_number || processed == expected`, and it
//! also covers the short final batch that does not land on a `batch_size` boundary.
//!
//! [`Batch::is_final`] is set on the batch that ends the run. With an announced total
//! that is the batch reaching it; a source that overshoots its own count is warned about
//! and the flag stays on that batch. Without a total, a full batch is held back until
//! the next record shows it is not the last, or [`Batcher::finish`] releases it as final.

use crate::types::{Batch, Record};

/// Accumulates records into [`Batch`]es
#[derive(Debug)]
pub struct Batcher {
    batch_size: usize,
    expected: Option<u64>,
    current: Vec<Record>,
    held: Option<Batch>,
    next_number: u64,
    processed: u64,
}

impl Batcher {
    /// Create a batcher.
    ///
    /// `expected` is the total the source reported before streaming, if it knows one.
    /// A `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize, expected: Option<u64>) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            expected,
            current: Vec::with_capacity(batch_size),
            held: None,
            next_number: 1,
            processed: 0,
        }
    }

    /// Append a record, returning the completed batch if this record made one due
    pub fn offer(&mut self, record: Record) -> Option<Batch> {
        // a held batch is not the last one: another record arrived
        let released = self.held.take();
        self.processed += 1;
        self.current.push(record);

        let Some(expected) = self.expected else {
            if self.current.len() >= self.batch_size {
                self.held = Some(self.take(false));
            }
            return released;
        };

        if self.processed == expected + 1 {
            tracing::warn!(expected, "source yielded more records than its announced total");
        }
        self.flush_if_due(self.processed, self.expected)
    }

    /// Emit the in-progress batch if the due rule holds for the given counts
    pub fn flush_if_due(&mut self, total_so_far: u64, total_expected: Option<u64>) -> Option<Batch> {
        let full = self.current.len() >= self.batch_size;
        let reached_expected = total_expected == Some(total_so_far);
        if self.current.is_empty() || !(full || reached_expected) {
            return None;
        }
        Some(self.take(reached_expected))
    }

    /// Source exhausted: emit whatever is left, if anything, as the final batch
    pub fn finish(&mut self) -> Option<Batch> {
        if let Some(mut batch) = self.held.take() {
            batch.is_final = true;
            return Some(batch);
        }
        if self.current.is_empty() {
            return None;
        }
        if let Some(expected) = self.expected
            && self.processed < expected
        {
            tracing::warn!(
                expected,
                processed = self.processed,
                "source ended before its announced total"
            );
        }
        Some(self.take(true))
    }

    /// Records offered so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Batches completed so far, including one held back
    pub fn batches_emitted(&self) -> u64 {
        self.next_number - 1
    }

    /// Records waiting in the in-progress batch
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    fn take(&mut self, is_final: bool) -> Batch {
        let records = std::mem::replace(&mut self.current, Vec::with_capacity(self.batch_size));
        let batch = Batch {
            number: self.next_number,
            records,
            is_final,
        };
        self.next_number += 1;
        tracing::debug!(
            batch = batch.number,
            records = batch.len(),
            processed = self.processed,
            "batch due"
        );
        batch
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::new().with("seq", i as u64)).collect()
    }

    fn run(batch_size: usize, expected: Option<u64>, input: Vec<Record>) -> Vec<Batch> {
        let mut batcher = Batcher::new(batch_size, expected);
        let mut out: Vec<Batch> = input.into_iter().filter_map(|r| batcher.offer(r)).collect();
        out.extend(batcher.finish());
        out
    }

    #[test]
    fn splits_1250_records_into_500_500_250() {
        let batches = run(500, Some(1250), records(1250));

        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![500, 500, 250]);
        let numbers: Vec<_> = batches.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let finals: Vec<_> = batches.iter().map(|b| b.is_final).collect();
        assert_eq!(finals, vec![false, false, true]);
    }

    #[test]
    fn final_short_batch_is_due_on_expected_total_without_finish() {
        let mut batcher = Batcher::new(500, Some(1250));
        let mut emitted = Vec::new();
        for r in records(1250) {
            emitted.extend(batcher.offer(r));
        }
        assert_eq!(emitted.len(), 3, "the 1250th record completes batch 3");
        assert!(batcher.finish().is_none(), "nothing left to flush");
    }

    #[test]
    fn unknown_total_flushes_remainder_on_finish() {
        let batches = run(3, None, records(7));
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let finals: Vec<_> = batches.iter().map(|b| b.is_final).collect();
        assert_eq!(finals, vec![false, false, true]);
    }

    #[test]
    fn exact_multiple_produces_no_trailing_empty_batch() {
        let batches = run(5, None, records(10));
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 5));
    }

    #[test]
    fn unknown_total_on_a_boundary_marks_the_last_full_batch_final() {
        let mut batcher = Batcher::new(5, None);
        let from_offer: Vec<Batch> = records(10)
            .into_iter()
            .filter_map(|r| batcher.offer(r))
            .collect();
        assert_eq!(from_offer.len(), 1);
        assert!(!from_offer[0].is_final);

        let last = batcher.finish().unwrap();
        assert_eq!((last.number, last.len()), (2, 5));
        assert!(last.is_final);
        assert!(batcher.finish().is_none());
    }

    #[test]
    fn empty_input_produces_no_batches() {
        assert!(run(500, Some(0), Vec::new()).is_empty());
        assert!(run(500, None, Vec::new()).is_empty());
    }

    #[test]
    fn batches_reassemble_the_input_in_order() {
        for n in [0usize, 1, 2, 9, 10, 11, 99, 100, 101] {
            for batch_size in [1usize, 3, 10, 100] {
                for expected in [None, Some(n as u64)] {
                    let input = records(n);
                    let batches = run(batch_size, expected, input.clone());

                    let rejoined: Vec<Record> =
                        batches.iter().flat_map(|b| b.records.clone()).collect();
                    assert_eq!(rejoined, input, "n={n} size={batch_size}");

                    if let Some((last, rest)) = batches.split_last() {
                        assert!(rest.iter().all(|b| b.len() == batch_size && !b.is_final));
                        assert!((1..=batch_size).contains(&last.len()));
                        assert!(last.is_final, "n={n} size={batch_size}");
                    }
                }
            }
        }
    }

    #[test]
    fn overshooting_source_never_exceeds_batch_size() {
        // announced 4, yields 9
        let batches = run(3, Some(4), records(9));
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 1, 3, 2]);
        assert!(batches.iter().all(|b| b.len() <= 3));
        // the batch reaching the announced total carries the flag
        assert!(batches[1].is_final);
    }

    #[test]
    fn undershooting_source_still_flushes_on_finish() {
        let batches = run(3, Some(10), records(5));
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 2]);
    }

    #[test]
    fn counters_track_progress() {
        let mut batcher = Batcher::new(2, None);
        batcher.offer(Record::new());
        assert_eq!(batcher.pending(), 1);
        batcher.offer(Record::new());
        assert_eq!(batcher.pending(), 0);
        assert_eq!(batcher.batches_emitted(), 1);
        assert_eq!(batcher.processed(), 2);
    }

    #[test]
    fn flush_if_due_ignores_empty_batch() {
        let mut batcher = Batcher::new(10, Some(0));
        assert!(batcher.flush_if_due(0, Some(0)).is_none());
    }
}
