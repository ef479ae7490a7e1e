//! # Protocol Event Journal
//!
//! Both endpoints append one line per segment sent or received, then the
//! counter summary, to `sender_log.txt` / `receiver_log.txt`. Six
//! fixed-width columns: direction, status, milliseconds since the side's
//! clock started (two decimals), segment type, wire sequence number, payload
//! length. The clock starts when the connection comes up; events before that
//! are counted but not journalled.

use quanta::Instant;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::wire::SegmentKind;

// ─── Event fields ───────────────────────────────────────────────────────────

/// Which way the segment travelled, from this endpoint's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "snd",
            Direction::Recv => "rcv",
        }
    }
}

/// Fate of the segment: delivered intact, dropped by the PLC, or carrying a
/// corrupted/failed checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Dropped,
    Corrupted,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Dropped => "drp",
            Status::Corrupted => "cor",
        }
    }
}

// ─── Journal ────────────────────────────────────────────────────────────────

/// Append-only event log with a start-gated clock.
#[derive(Debug, Default)]
pub struct Journal {
    origin: Option<Instant>,
    lines: Vec<String>,
}

impl Journal {
    pub fn new() -> Self {
        Journal::default()
    }

    /// Start the clock. Events recorded before this call are discarded.
    pub fn start(&mut self) {
        self.origin = Some(Instant::now());
    }

    pub fn is_started(&self) -> bool {
        self.origin.is_some()
    }

    /// Record one event line.
    pub fn record(
        &mut self,
        direction: Direction,
        status: Status,
        kind: SegmentKind,
        seq: u16,
        payload_len: usize,
    ) {
        let Some(origin) = self.origin else {
            return;
        };
        let elapsed_ms = origin.elapsed().as_secs_f64() * 1000.0;
        self.lines.push(format!(
            "{}  {:<3}  {:7.2}  {:<4}  {:5}  {:5}\n",
            direction.as_str(),
            status.as_str(),
            elapsed_ms,
            kind.name(),
            seq,
            payload_len,
        ));
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Write all event lines followed by the counter summary.
    pub fn write_to(&self, path: &Path, summary: &str) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        for line in &self.lines {
            file.write_all(line.as_bytes())?;
        }
        file.write_all(summary.as_bytes())?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_before_start_are_discarded() {
        let mut journal = Journal::new();
        journal.record(Direction::Recv, Status::Corrupted, SegmentKind::Syn, 9, 0);
        assert!(journal.is_empty());

        journal.start();
        journal.record(Direction::Recv, Status::Ok, SegmentKind::Syn, 9, 0);
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn line_has_six_fixed_width_columns() {
        let mut journal = Journal::new();
        journal.start();
        journal.record(Direction::Send, Status::Ok, SegmentKind::Data, 1000, 1000);

        let line = &journal.lines[0];
        assert!(line.starts_with("snd  ok   "), "got {line:?}");
        assert!(line.ends_with("DATA   1000   1000\n"), "got {line:?}");
        let cols: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(cols.len(), 6);
        assert_eq!(cols[0], "snd");
        assert_eq!(cols[1], "ok");
        assert!(cols[2].contains('.'), "elapsed must have decimals: {line:?}");
        assert_eq!(cols[3], "DATA");
        assert_eq!(cols[4], "1000");
        assert_eq!(cols[5], "1000");
    }

    #[test]
    fn status_and_direction_names() {
        assert_eq!(Direction::Send.as_str(), "snd");
        assert_eq!(Direction::Recv.as_str(), "rcv");
        assert_eq!(Status::Ok.as_str(), "ok");
        assert_eq!(Status::Dropped.as_str(), "drp");
        assert_eq!(Status::Corrupted.as_str(), "cor");
    }

    #[test]
    fn write_appends_summary_after_events() {
        let mut journal = Journal::new();
        journal.start();
        journal.record(Direction::Send, Status::Ok, SegmentKind::Ack, 5, 0);

        let path = std::env::temp_dir().join(format!("urp-journal-{}.txt", std::process::id()));
        journal.write_to(&path, "Total acks sent:              1\n").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("snd  ok "));
        assert_eq!(lines.next().unwrap(), "Total acks sent:              1");
        assert!(lines.next().is_none());
    }
}
