//! # Sender Sliding Window
//!
//! Ordered map of in-flight segments keyed by extended (64-bit) stream
//! position, with unacked-byte accounting and cumulative removal. A SYN or
//! FIN occupies one sequence number but contributes nothing to the byte
//! count; the `max_win` bound therefore constrains payload bytes only.
//!
//! Also houses the duplicate-ACK tracker: consecutive ACKs equal to `base`
//! are counted, the third triggers exactly one fast retransmit, and any
//! advancing ACK clears the count.

use bytes::Bytes;
use quanta::Instant;
use std::collections::BTreeMap;

use crate::wire::SegmentKind;

// ─── In-flight entry ────────────────────────────────────────────────────────

/// One unacknowledged segment held for possible retransmission.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub kind: SegmentKind,
    /// Encoded wire bytes as first transmitted (never the corrupted copy).
    pub wire: Bytes,
    pub payload_len: usize,
    /// Last transmission time, refreshed on every retransmit.
    pub sent_at: Instant,
}

impl InFlight {
    /// First sequence number after this segment: `seq + payload_len` for
    /// DATA, `seq + 1` for SYN/FIN.
    pub fn end_seq(&self, seq: u64) -> u64 {
        match self.kind {
            SegmentKind::Data => seq + self.payload_len as u64,
            _ => seq + 1,
        }
    }
}

// ─── Window ─────────────────────────────────────────────────────────────────

/// Sliding window of sent-but-unacked segments.
#[derive(Debug, Default)]
pub struct SendWindow {
    entries: BTreeMap<u64, InFlight>,
    unacked_bytes: usize,
}

impl SendWindow {
    pub fn new() -> Self {
        SendWindow::default()
    }

    pub fn insert(&mut self, seq: u64, entry: InFlight) {
        self.unacked_bytes += entry.payload_len;
        self.entries.insert(seq, entry);
    }

    /// Remove every entry whose end sequence is ≤ `ack` (cumulative
    /// semantics) and return how many bytes were acknowledged.
    pub fn ack_through(&mut self, ack: u64) -> usize {
        let acked: Vec<u64> = self
            .entries
            .iter()
            .filter(|(&seq, entry)| entry.end_seq(seq) <= ack)
            .map(|(&seq, _)| seq)
            .collect();

        let mut bytes = 0;
        for seq in acked {
            if let Some(entry) = self.entries.remove(&seq) {
                bytes += entry.payload_len;
            }
        }
        self.unacked_bytes -= bytes;
        bytes
    }

    /// Oldest (smallest-sequence) unacked entry — the retransmission target.
    pub fn oldest(&self) -> Option<u64> {
        self.entries.keys().next().copied()
    }

    pub fn get(&self, seq: u64) -> Option<&InFlight> {
        self.entries.get(&seq)
    }

    pub fn get_mut(&mut self, seq: u64) -> Option<&mut InFlight> {
        self.entries.get_mut(&seq)
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.contains_key(&seq)
    }

    pub fn unacked_bytes(&self) -> usize {
        self.unacked_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.unacked_bytes = 0;
    }
}

// ─── Duplicate-ACK tracking ─────────────────────────────────────────────────

/// Counts consecutive duplicate ACKs at the current window base.
#[derive(Debug, Default)]
pub struct DupAckTracker {
    ack: Option<u64>,
    count: u32,
}

impl DupAckTracker {
    pub fn new() -> Self {
        DupAckTracker::default()
    }

    /// Record a duplicate ACK and return how many consecutive duplicates of
    /// this value have now been seen. Fast retransmit fires when this
    /// returns exactly 3.
    pub fn record(&mut self, ack: u64) -> u32 {
        if self.ack == Some(ack) {
            self.count += 1;
        } else {
            self.ack = Some(ack);
            self.count = 1;
        }
        self.count
    }

    /// Clear on any advancing ACK.
    pub fn reset(&mut self) {
        self.ack = None;
        self.count = 0;
    }
}
