//! # Transfer Statistics
//!
//! Named counters for both endpoints. Each side appends its counters to its
//! log file in a fixed order with fixed labels; the structs also serialize
//! to JSON for machine consumption.

use serde::Serialize;

// ─── Sender Stats ───────────────────────────────────────────────────────────

/// Sender-side counters.
///
/// `original_*` count each DATA byte/segment exactly once, at its first
/// transmission attempt (a PLC drop of that attempt still counts); `total_*`
/// include every attempt, retransmissions included. Control segments count
/// toward `total_segments_sent` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    pub original_data_sent: u64,
    pub total_data_sent: u64,
    pub original_segments_sent: u64,
    pub total_segments_sent: u64,
    pub timeout_retransmissions: u64,
    pub fast_retransmissions: u64,
    pub duplicate_acks_received: u64,
    pub corrupted_acks_discarded: u64,
    pub plc_forward_segments_dropped: u64,
    pub plc_forward_segments_corrupted: u64,
    pub plc_reverse_segments_dropped: u64,
    pub plc_reverse_segments_corrupted: u64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retransmitted fraction of all transmission attempts.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.total_segments_sent == 0 {
            0.0
        } else {
            let retrans = self.timeout_retransmissions + self.fast_retransmissions;
            retrans as f64 / self.total_segments_sent as f64
        }
    }

    /// Fixed-order labeled summary appended to `sender_log.txt`.
    pub fn summary(&self) -> String {
        format!(
            "Original data sent:            {:5}\n\
             Total data sent:               {:5}\n\
             Original segments sent:        {:5}\n\
             Total segments sent:           {:5}\n\
             Timeout retransmissions:       {:5}\n\
             Fast retransmissions:          {:5}\n\
             Duplicate acks received:       {:5}\n\
             Corrupted acks discarded:      {:5}\n\
             PLC forward segments dropped:  {:5}\n\
             PLC forward segments corrupted: {:5}\n\
             PLC reverse segments dropped:  {:5}\n\
             PLC reverse segments corrupted: {:5}\n",
            self.original_data_sent,
            self.total_data_sent,
            self.original_segments_sent,
            self.total_segments_sent,
            self.timeout_retransmissions,
            self.fast_retransmissions,
            self.duplicate_acks_received,
            self.corrupted_acks_discarded,
            self.plc_forward_segments_dropped,
            self.plc_forward_segments_corrupted,
            self.plc_reverse_segments_dropped,
            self.plc_reverse_segments_corrupted,
        )
    }
}

// ─── Receiver Stats ─────────────────────────────────────────────────────────

/// Receiver-side counters.
///
/// `original_*` count unique in-order bytes/segments written to the output
/// file, reorder-buffer drains included; `total_*` count every accepted DATA
/// segment (in-order or buffered ahead), duplicates excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    pub original_data_received: u64,
    pub total_data_received: u64,
    pub original_segments_received: u64,
    pub total_segments_received: u64,
    pub corrupted_segments_discarded: u64,
    pub duplicate_segments_received: u64,
    pub total_acks_sent: u64,
    pub duplicate_acks_sent: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique delivered fraction of all accepted data bytes.
    pub fn goodput_ratio(&self) -> f64 {
        if self.total_data_received == 0 {
            0.0
        } else {
            self.original_data_received as f64 / self.total_data_received as f64
        }
    }

    /// Fixed-order labeled summary appended to `receiver_log.txt`.
    pub fn summary(&self) -> String {
        format!(
            "Original data received:         {:5}\n\
             Total data received:           {:5}\n\
             Original segments received:    {:5}\n\
             Total segments received:       {:5}\n\
             Corrupted segments discarded:  {:5}\n\
             Duplicate segments received:   {:5}\n\
             Total acks sent:              {:5}\n\
             Duplicate acks sent:          {:5}\n",
            self.original_data_received,
            self.total_data_received,
            self.original_segments_received,
            self.total_segments_received,
            self.corrupted_segments_discarded,
            self.duplicate_segments_received,
            self.total_acks_sent,
            self.duplicate_acks_sent,
        )
    }
}
