//! # Receiver Reassembly
//!
//! Ordered, duplicate-free delivery of the byte stream. Segments arriving at
//! the expected sequence are released immediately together with any directly
//! following buffered segments; segments arriving ahead are parked in the
//! reorder buffer; anything overlapping an already-delivered byte range is a
//! duplicate. Delivered ranges are tracked as an interval set over extended
//! 64-bit stream positions, so memory scales with fragmentation rather than
//! with stream length.

use bytes::Bytes;
use std::collections::BTreeMap;

// ─── Interval Set ───────────────────────────────────────────────────────────

/// Set of half-open `[start, end)` byte ranges, kept merged and disjoint.
#[derive(Debug, Default)]
pub struct IntervalSet {
    /// start → end, non-overlapping; adjacent ranges are coalesced.
    spans: BTreeMap<u64, u64>,
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet::default()
    }

    /// Whether `[start, end)` intersects any stored range.
    pub fn intersects(&self, start: u64, end: u64) -> bool {
        if start >= end {
            return false;
        }
        // The only candidate is the last range beginning at or before `end`.
        self.spans
            .range(..end)
            .next_back()
            .is_some_and(|(_, &span_end)| span_end > start)
    }

    /// Insert `[start, end)`, merging with overlapping or adjacent ranges.
    pub fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut new_start = start;
        let mut new_end = end;

        // Absorb every range that overlaps or touches the new one.
        let absorbed: Vec<u64> = self
            .spans
            .range(..=end)
            .rev()
            .take_while(|(_, &span_end)| span_end >= start)
            .map(|(&span_start, _)| span_start)
            .collect();
        for span_start in absorbed {
            let span_end = self.spans.remove(&span_start).unwrap_or(span_start);
            new_start = new_start.min(span_start);
            new_end = new_end.max(span_end);
        }

        self.spans.insert(new_start, new_end);
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Number of disjoint ranges currently stored.
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }
}

// ─── Admission ──────────────────────────────────────────────────────────────

/// How one DATA segment was classified.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Overlaps an already-delivered or buffered byte range; nothing written.
    Duplicate,
    /// In order: the segment's payload plus any buffered segments it
    /// unblocked, in stream order. `expected` has advanced past them all.
    InOrder { payloads: Vec<Bytes> },
    /// Ahead of the expected sequence; parked in the reorder buffer.
    Buffered,
}

// ─── Reassembly ─────────────────────────────────────────────────────────────

/// Receiver-side ordered delivery state.
#[derive(Debug)]
pub struct Reassembly {
    expected: u64,
    reorder: BTreeMap<u64, Bytes>,
    delivered: IntervalSet,
}

impl Reassembly {
    /// Start expecting the first data byte at `expected` (ISN + 1).
    pub fn new(expected: u64) -> Self {
        Reassembly {
            expected,
            reorder: BTreeMap::new(),
            delivered: IntervalSet::new(),
        }
    }

    /// Next in-order extended sequence expected.
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Number of segments parked ahead of the expected sequence.
    pub fn buffered(&self) -> usize {
        self.reorder.len()
    }

    /// Classify and admit one DATA segment at extended position `seq`.
    pub fn admit(&mut self, seq: u64, payload: Bytes) -> Admission {
        let len = payload.len() as u64;
        if self.delivered.intersects(seq, seq + len) {
            return Admission::Duplicate;
        }
        self.delivered.insert(seq, seq + len);

        if seq == self.expected {
            let mut payloads = vec![payload];
            self.expected += len;
            // Drain every directly following buffered segment.
            while let Some(chunk) = self.reorder.remove(&self.expected) {
                self.expected += chunk.len() as u64;
                payloads.push(chunk);
            }
            Admission::InOrder { payloads }
        } else if seq > self.expected {
            self.reorder.insert(seq, payload);
            Admission::Buffered
        } else {
            // Below `expected` yet not overlapping a delivered range cannot
            // happen: everything below `expected` has been delivered.
            Admission::Duplicate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize, fill: u8) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    // ─── Interval set ───────────────────────────────────────────────────

    #[test]
    fn empty_set_intersects_nothing() {
        let set = IntervalSet::new();
        assert!(!set.intersects(0, 100));
        assert!(set.is_empty());
    }

    #[test]
    fn intersection_detects_partial_overlap() {
        let mut set = IntervalSet::new();
        set.insert(100, 200);
        assert!(set.intersects(150, 250));
        assert!(set.intersects(50, 101));
        assert!(set.intersects(100, 200));
        assert!(!set.intersects(200, 300));
        assert!(!set.intersects(0, 100));
    }

    #[test]
    fn adjacent_ranges_coalesce() {
        let mut set = IntervalSet::new();
        set.insert(0, 100);
        set.insert(100, 200);
        assert_eq!(set.span_count(), 1);
        assert!(set.intersects(0, 200));
    }

    #[test]
    fn insert_bridges_gap_between_ranges() {
        let mut set = IntervalSet::new();
        set.insert(0, 100);
        set.insert(200, 300);
        assert_eq!(set.span_count(), 2);
        set.insert(100, 200);
        assert_eq!(set.span_count(), 1);
    }

    #[test]
    fn disjoint_ranges_stay_disjoint() {
        let mut set = IntervalSet::new();
        set.insert(0, 10);
        set.insert(1000, 1010);
        assert_eq!(set.span_count(), 2);
        assert!(!set.intersects(500, 600));
    }

    #[test]
    fn empty_range_is_ignored() {
        let mut set = IntervalSet::new();
        set.insert(5, 5);
        assert!(set.is_empty());
        assert!(!set.intersects(5, 5));
    }

    // ─── Admission ──────────────────────────────────────────────────────

    #[test]
    fn in_order_segment_delivers_immediately() {
        let mut rx = Reassembly::new(1001);
        match rx.admit(1001, payload(1000, b'a')) {
            Admission::InOrder { payloads } => {
                assert_eq!(payloads.len(), 1);
                assert_eq!(payloads[0].len(), 1000);
            }
            other => panic!("expected InOrder, got {other:?}"),
        }
        assert_eq!(rx.expected(), 2001);
    }

    #[test]
    fn future_segment_is_buffered_until_gap_fills() {
        let mut rx = Reassembly::new(1001);
        assert_eq!(rx.admit(2001, payload(1000, b'b')), Admission::Buffered);
        assert_eq!(rx.buffered(), 1);
        assert_eq!(rx.expected(), 1001);

        match rx.admit(1001, payload(1000, b'a')) {
            Admission::InOrder { payloads } => {
                assert_eq!(payloads.len(), 2);
                assert_eq!(payloads[0][0], b'a');
                assert_eq!(payloads[1][0], b'b');
            }
            other => panic!("expected InOrder drain, got {other:?}"),
        }
        assert_eq!(rx.expected(), 3001);
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn drain_releases_a_whole_run() {
        let mut rx = Reassembly::new(0);
        rx.admit(100, payload(100, b'b'));
        rx.admit(200, payload(100, b'c'));
        rx.admit(300, payload(50, b'd'));
        assert_eq!(rx.buffered(), 3);

        match rx.admit(0, payload(100, b'a')) {
            Admission::InOrder { payloads } => assert_eq!(payloads.len(), 4),
            other => panic!("expected InOrder, got {other:?}"),
        }
        assert_eq!(rx.expected(), 350);
    }

    #[test]
    fn delivered_segment_is_a_duplicate_forever() {
        let mut rx = Reassembly::new(1001);
        rx.admit(1001, payload(1000, b'a'));
        assert_eq!(rx.admit(1001, payload(1000, b'a')), Admission::Duplicate);
        assert_eq!(rx.expected(), 2001);
    }

    #[test]
    fn buffered_segment_is_also_a_duplicate() {
        let mut rx = Reassembly::new(1001);
        rx.admit(3001, payload(500, b'c'));
        assert_eq!(rx.admit(3001, payload(500, b'c')), Admission::Duplicate);
        assert_eq!(rx.buffered(), 1);
    }

    #[test]
    fn partial_overlap_counts_as_duplicate() {
        let mut rx = Reassembly::new(0);
        rx.admit(0, payload(1000, b'a'));
        // Retransmission covering old bytes plus new ones is still rejected.
        assert_eq!(rx.admit(500, payload(1000, b'x')), Admission::Duplicate);
        assert_eq!(rx.expected(), 1000);
    }

    #[test]
    fn interleaved_gaps_drain_in_stages() {
        let mut rx = Reassembly::new(0);
        rx.admit(200, payload(100, b'c'));
        match rx.admit(0, payload(100, b'a')) {
            Admission::InOrder { payloads } => assert_eq!(payloads.len(), 1),
            other => panic!("{other:?}"),
        }
        assert_eq!(rx.expected(), 100);
        match rx.admit(100, payload(100, b'b')) {
            Admission::InOrder { payloads } => assert_eq!(payloads.len(), 2),
            other => panic!("{other:?}"),
        }
        assert_eq!(rx.expected(), 300);
    }
}
