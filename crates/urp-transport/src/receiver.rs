//! # Receiver Engine
//!
//! Accepts one connection, reassembles the byte stream into the output file,
//! and acknowledges every DATA segment with the cumulative next-expected
//! sequence — one ACK per segment, never delayed or coalesced, because the
//! sender's fast-retransmit trigger counts on it.
//!
//! ```text
//!   CLOSED ──SYN/ACK──▶ ESTABLISHED ──FIN/ACK──▶ TIME_WAIT ──2 s linger──▶ CLOSED
//! ```
//!
//! A single loop polls the socket with a 100 ms timeout. Corrupted segments
//! are discarded and counted; a retransmitted SYN re-elicits the handshake
//! ACK; a FIN is only honoured after the handshake. During TIME_WAIT a
//! retransmitted FIN re-elicits its ACK and restarts the linger clock. The
//! output file is flushed after every write so partial deliveries survive
//! abrupt termination.

use anyhow::{bail, Context as _, Result};
use quanta::Instant;
use std::fs::File;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::journal::{Direction, Journal, Status};
use crate::reassembly::{Admission, Reassembly};
use crate::stats::ReceiverStats;
use crate::wire::{unwrap_seq, Segment, SegmentKind};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Receive poll timeout.
const RECV_POLL: Duration = Duration::from_millis(100);
/// TIME_WAIT linger, restarted by every retransmitted FIN.
const LINGER: Duration = Duration::from_secs(2);
/// Default event log location.
pub const DEFAULT_LOG_PATH: &str = "receiver_log.txt";

// ─── Configuration ──────────────────────────────────────────────────────────

/// Receiver parameters, straight from the CLI.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local UDP port to bind.
    pub local_port: u16,
    /// Sender's UDP port on localhost.
    pub peer_port: u16,
    /// Output file (created truncating).
    pub output: PathBuf,
    /// Window bound in bytes; accepted for CLI symmetry with the sender.
    pub max_win: usize,
    /// Where to write the event log.
    pub log_path: PathBuf,
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_win == 0 || self.max_win >= 32768 {
            bail!("max_win must be in 1..32768, got {}", self.max_win);
        }
        Ok(())
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Closed,
    Established,
    TimeWait,
}

// ─── Receiver ───────────────────────────────────────────────────────────────

/// The receiver engine. Construct with [`Receiver::new`], then
/// [`Receiver::run`] accepts one connection and returns the final counters.
pub struct Receiver {
    cfg: ReceiverConfig,
    socket: UdpSocket,
    peer: SocketAddr,
    output: File,
    journal: Journal,
    stats: ReceiverStats,
    state: ReceiverState,
}

impl Receiver {
    /// Bind the local socket and create the (truncated) output file.
    pub fn new(cfg: ReceiverConfig) -> Result<Self> {
        cfg.validate()?;

        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, cfg.local_port))
            .with_context(|| format!("cannot bind UDP port {}", cfg.local_port))?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        let peer = SocketAddr::from((Ipv4Addr::LOCALHOST, cfg.peer_port));

        let output = File::create(&cfg.output)
            .with_context(|| format!("cannot create {}", cfg.output.display()))?;

        Ok(Receiver {
            socket,
            peer,
            output,
            journal: Journal::new(),
            stats: ReceiverStats::new(),
            state: ReceiverState::Closed,
            cfg,
        })
    }

    /// Accept one connection and receive until teardown completes. The event
    /// log is written on every exit path.
    pub fn run(mut self) -> Result<ReceiverStats> {
        info!(
            port = self.cfg.local_port,
            output = %self.cfg.output.display(),
            max_win = self.cfg.max_win,
            "receiver ready"
        );
        let outcome = self.drive();
        self.state = ReceiverState::Closed;

        let written = self
            .journal
            .write_to(&self.cfg.log_path, &self.stats.summary());
        outcome?;
        written.context("failed to write receiver log")?;
        Ok(self.stats)
    }

    fn drive(&mut self) -> Result<()> {
        let (isn, mut reassembly) = self.accept()?;
        self.exchange(isn, &mut reassembly)
    }

    /// CLOSED: loop until a valid SYN arrives. Corrupted segments are counted
    /// (not journalled — the clock only starts with the connection); a FIN is
    /// never accepted before the handshake.
    fn accept(&mut self) -> Result<(u16, Reassembly)> {
        let mut buf = [0u8; 2048];
        loop {
            let n = match self.socket.recv_from(&mut buf) {
                Ok((n, _addr)) => n,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(e).context("socket error while awaiting SYN"),
            };

            let Some((segment, valid)) = Segment::decode(&buf[..n]) else {
                continue;
            };
            if !valid {
                self.stats.corrupted_segments_discarded += 1;
                self.journal
                    .record(Direction::Recv, Status::Corrupted, segment.kind, segment.seq, 0);
                continue;
            }
            if segment.kind != SegmentKind::Syn {
                continue;
            }

            let isn = segment.seq;
            let expected = u64::from(isn) + 1;
            self.state = ReceiverState::Established;
            self.journal.start();
            self.journal
                .record(Direction::Recv, Status::Ok, SegmentKind::Syn, isn, 0);
            info!(isn, "connection accepted");
            self.send_ack(expected as u16);
            return Ok((isn, Reassembly::new(expected)));
        }
    }

    /// ESTABLISHED: deliver DATA, re-ACK retransmitted SYNs, honour FIN.
    fn exchange(&mut self, isn: u16, reassembly: &mut Reassembly) -> Result<()> {
        let mut buf = [0u8; 2048];
        loop {
            let n = match self.socket.recv_from(&mut buf) {
                Ok((n, _addr)) => n,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(e).context("socket error while established"),
            };

            let Some((segment, valid)) = Segment::decode(&buf[..n]) else {
                continue;
            };
            if !valid {
                self.stats.corrupted_segments_discarded += 1;
                let logged_len = match segment.kind {
                    SegmentKind::Data => segment.payload.len(),
                    _ => 0,
                };
                self.journal.record(
                    Direction::Recv,
                    Status::Corrupted,
                    segment.kind,
                    segment.seq,
                    logged_len,
                );
                continue;
            }

            match segment.kind {
                SegmentKind::Syn if segment.seq == isn => {
                    // The handshake ACK was lost; answer the retransmission.
                    let expected = reassembly.expected() as u16;
                    self.send_ack(expected);
                }
                SegmentKind::Data => {
                    self.journal.record(
                        Direction::Recv,
                        Status::Ok,
                        SegmentKind::Data,
                        segment.seq,
                        segment.payload.len(),
                    );
                    self.deliver(reassembly, segment)?;
                }
                SegmentKind::Fin => {
                    self.journal
                        .record(Direction::Recv, Status::Ok, SegmentKind::Fin, segment.seq, 0);
                    let fin_ack = segment.seq.wrapping_add(1);
                    self.send_ack(fin_ack);
                    self.linger(segment.seq, fin_ack);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    /// Classify one DATA segment and write whatever became deliverable.
    /// Every path answers with the cumulative `expected_seq` ACK.
    fn deliver(&mut self, reassembly: &mut Reassembly, segment: Segment) -> Result<()> {
        let len = segment.payload.len() as u64;
        let seq = unwrap_seq(segment.seq, reassembly.expected());

        match reassembly.admit(seq, segment.payload) {
            Admission::Duplicate => {
                self.stats.duplicate_segments_received += 1;
                self.send_ack(reassembly.expected() as u16);
                self.stats.duplicate_acks_sent += 1;
            }
            Admission::InOrder { payloads } => {
                for payload in &payloads {
                    self.output
                        .write_all(payload)
                        .context("write to output file failed")?;
                    self.output.flush()?;
                    self.stats.original_data_received += payload.len() as u64;
                    self.stats.original_segments_received += 1;
                }
                self.stats.total_data_received += len;
                self.stats.total_segments_received += 1;
                self.send_ack(reassembly.expected() as u16);
            }
            Admission::Buffered => {
                debug!(seq = segment.seq, buffered = reassembly.buffered(), "out-of-order segment");
                self.stats.total_data_received += len;
                self.stats.total_segments_received += 1;
                self.send_ack(reassembly.expected() as u16);
                self.stats.duplicate_acks_sent += 1;
            }
        }
        Ok(())
    }

    /// TIME_WAIT: hold state for the linger period so a retransmitted FIN can
    /// be re-acknowledged; each one restarts the clock. No data is written.
    fn linger(&mut self, fin_seq: u16, fin_ack: u16) {
        self.state = ReceiverState::TimeWait;
        info!("entering TIME_WAIT");

        let mut buf = [0u8; 2048];
        let mut armed = Instant::now();
        while armed.elapsed() < LINGER {
            let n = match self.socket.recv_from(&mut buf) {
                Ok((n, _addr)) => n,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "socket error in TIME_WAIT");
                    break;
                }
            };
            let Some((segment, valid)) = Segment::decode(&buf[..n]) else {
                continue;
            };
            if !valid {
                self.stats.corrupted_segments_discarded += 1;
                self.journal
                    .record(Direction::Recv, Status::Corrupted, segment.kind, segment.seq, 0);
                continue;
            }
            if segment.kind == SegmentKind::Fin && segment.seq == fin_seq {
                debug!("re-acknowledging retransmitted FIN");
                self.send_ack(fin_ack);
                armed = Instant::now();
            }
        }

        self.state = ReceiverState::Closed;
        info!("connection closed");
    }

    /// Emit one cumulative ACK. Send failures are logged and tolerated — the
    /// sender's timer covers the loss.
    fn send_ack(&mut self, ack: u16) {
        let raw = Segment::ack(ack).encode();
        match self.socket.send_to(&raw, self.peer) {
            Ok(_) => {
                self.journal
                    .record(Direction::Send, Status::Ok, SegmentKind::Ack, ack, 0);
                self.stats.total_acks_sent += 1;
            }
            Err(e) => warn!(error = %e, "ACK send failed"),
        }
    }
}
