//! # Sender Engine
//!
//! Drives one file transfer end to end:
//!
//! ```text
//!   CLOSED ──SYN──▶ SYN_SENT ──ACK(isn+1)──▶ ESTABLISHED ──FIN──▶ FIN_SENT ──ACK(fin+1)──▶ CLOSED
//! ```
//!
//! Three concurrent activities share one mutex-guarded state block: the
//! file-paced send loop (sole mutator of `next_seq` and `file_pos`), a
//! receive loop polling the socket every 100 ms, and a single retransmission
//! timer. The timer always targets the oldest unacked segment — it never
//! multiplexes per segment — and is rearmed against the new oldest entry
//! whenever the window base advances. The third consecutive duplicate ACK at
//! the base triggers exactly one fast retransmit without touching the timer.
//!
//! Every outbound segment passes through the forward PLC shim and every
//! inbound one through the reverse shim; both directions are journalled and
//! counted. On return to CLOSED the receive loop exits at its next poll and
//! the timer at its next wake; the event log plus counter summary is written
//! on every exit path.

use anyhow::{bail, Context as _, Result};
use bytes::Bytes;
use quanta::Instant;
use rand::Rng;
use rand::RngExt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::journal::{Direction, Journal, Status};
use crate::plc::{Outcome, Plc, PlcConfig};
use crate::stats::SenderStats;
use crate::window::{DupAckTracker, InFlight, SendWindow};
use crate::wire::{unwrap_seq, Segment, SegmentKind, MSS};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Receive poll timeout, so the loop can observe CLOSED.
const RECV_POLL: Duration = Duration::from_millis(100);
/// Yield interval while the window is full or a state change is pending.
const YIELD: Duration = Duration::from_millis(10);
/// Outer deadline for connection establishment and teardown.
const SETUP_TIMEOUT: Duration = Duration::from_secs(30);
/// Default event log location.
pub const DEFAULT_LOG_PATH: &str = "sender_log.txt";

// ─── Configuration ──────────────────────────────────────────────────────────

/// Sender parameters, straight from the CLI.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Local UDP port to bind.
    pub local_port: u16,
    /// Receiver's UDP port on localhost.
    pub peer_port: u16,
    /// File to transfer.
    pub filename: PathBuf,
    /// Window bound in payload bytes.
    pub max_win: usize,
    /// Retransmission timeout.
    pub rto: Duration,
    /// Channel fault probabilities.
    pub plc: PlcConfig,
    /// Where to write the event log.
    pub log_path: PathBuf,
}

impl SenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_win == 0 || self.max_win >= 32768 {
            // Half the 16-bit sequence space bounds unambiguous ACK unwrapping.
            bail!("max_win must be in 1..32768, got {}", self.max_win);
        }
        if self.rto.is_zero() {
            bail!("rto must be positive");
        }
        if !self.plc.is_valid() {
            bail!("PLC probabilities must lie in [0, 1]");
        }
        Ok(())
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Closed,
    SynSent,
    Established,
    FinSent,
}

/// Everything the three activities share, behind one mutex. The lock also
/// guards the timer-running flag and oldest-unacked pointer, so timer arms
/// and disarms are atomic with respect to ACK processing.
struct Shared {
    state: SenderState,
    isn: u16,
    /// Smallest extended sequence sent but not cumulatively acked.
    base: u64,
    /// Next extended sequence to assign.
    next_seq: u64,
    /// Read cursor into the source file.
    file_pos: u64,
    window: SendWindow,
    dup_acks: DupAckTracker,
    oldest_unacked: Option<u64>,
    timer_running: bool,
    timer_generation: u64,
    plc: Plc,
    journal: Journal,
    stats: SenderStats,
    /// First fatal transport error, if any.
    fault: Option<String>,
}

/// Immutable engine context shared with the receive and timer threads.
struct Ctx {
    socket: UdpSocket,
    peer: SocketAddr,
    rto: Duration,
    shared: Mutex<Shared>,
}

impl Ctx {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─── Sender ─────────────────────────────────────────────────────────────────

/// The sender engine. Construct with [`Sender::new`], then [`Sender::run`]
/// performs the whole transfer and returns the final counters.
pub struct Sender {
    cfg: SenderConfig,
    ctx: Arc<Ctx>,
    file: File,
    file_size: u64,
}

impl Sender {
    /// Bind the local socket and open the source file.
    pub fn new(cfg: SenderConfig) -> Result<Self> {
        let plc = Plc::new(cfg.plc);
        Self::with_plc(cfg, plc)
    }

    /// Like [`Sender::new`] but with a caller-built PLC shim (seeded or
    /// scripted) that supersedes `cfg.plc`, for reproducible fault schedules.
    pub fn with_plc(cfg: SenderConfig, plc: Plc) -> Result<Self> {
        cfg.validate()?;

        let mut file = File::open(&cfg.filename)
            .with_context(|| format!("cannot open {}", cfg.filename.display()))?;
        let file_size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, cfg.local_port))
            .with_context(|| format!("cannot bind UDP port {}", cfg.local_port))?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        let peer = SocketAddr::from((Ipv4Addr::LOCALHOST, cfg.peer_port));

        let shared = Shared {
            state: SenderState::Closed,
            isn: 0,
            base: 0,
            next_seq: 0,
            file_pos: 0,
            window: SendWindow::new(),
            dup_acks: DupAckTracker::new(),
            oldest_unacked: None,
            timer_running: false,
            timer_generation: 0,
            plc,
            journal: Journal::new(),
            stats: SenderStats::new(),
            fault: None,
        };

        Ok(Sender {
            ctx: Arc::new(Ctx {
                socket,
                peer,
                rto: cfg.rto,
                shared: Mutex::new(shared),
            }),
            cfg,
            file,
            file_size,
        })
    }

    /// Transfer the file. Blocks until the connection closes, a fatal error
    /// occurs, or the 30-second setup/teardown deadline expires. The event
    /// log is written on every exit path.
    pub fn run(mut self) -> Result<SenderStats> {
        // Connection setup: random ISN, SYN into the window, timer on.
        let isn: u16 = rand::rng().random();
        {
            let mut s = self.ctx.shared();
            s.isn = isn;
            s.base = u64::from(isn);
            s.next_seq = u64::from(isn);
            s.state = SenderState::SynSent;
            s.journal.start();

            let seq = s.next_seq;
            s.window.insert(
                seq,
                InFlight {
                    kind: SegmentKind::Syn,
                    wire: Segment::syn(isn).encode(),
                    payload_len: 0,
                    sent_at: Instant::now(),
                },
            );
            s.next_seq = seq + 1;
            transmit(&self.ctx, &mut s, seq, false);
            start_timer(&self.ctx, &mut s);
        }
        info!(isn, file_size = self.file_size, "connection initiated");

        let recv_ctx = Arc::clone(&self.ctx);
        let recv_handle = thread::Builder::new()
            .name("urp-snd-recv".into())
            .spawn(move || recv_loop(recv_ctx))
            .expect("failed to spawn receive thread");

        let outcome = self.drive();

        // Common teardown: force CLOSED so both helper threads exit, join the
        // receiver, then persist the journal whatever happened.
        {
            let mut s = self.ctx.shared();
            s.state = SenderState::Closed;
            stop_timer(&mut s);
        }
        let _ = recv_handle.join();

        let (written, stats, fault) = {
            let s = self.ctx.shared();
            (
                s.journal.write_to(&self.cfg.log_path, &s.stats.summary()),
                s.stats.clone(),
                s.fault.clone(),
            )
        };
        outcome?;
        if let Some(fault) = fault {
            bail!("transport error: {fault}");
        }
        written.context("failed to write sender log")?;
        Ok(stats)
    }

    /// Handshake wait, data pump, teardown wait.
    fn drive(&mut self) -> Result<()> {
        if !self.wait_for(SETUP_TIMEOUT, |s| s.state != SenderState::SynSent) {
            bail!("connection establishment timed out");
        }
        if self.ctx.shared().state != SenderState::Established {
            // The receive loop hit a fatal socket error during the handshake.
            return Ok(());
        }

        self.pump()?;

        if !self.wait_for(SETUP_TIMEOUT, |s| s.state == SenderState::Closed) {
            bail!("teardown timed out");
        }
        Ok(())
    }

    /// File-paced send loop. Sends while the window has byte room, then
    /// yields; once the file is exhausted and the window drains, sends FIN.
    fn pump(&mut self) -> Result<()> {
        let mut chunk = vec![0u8; MSS];
        loop {
            let mut s = self.ctx.shared();
            match s.state {
                SenderState::Established => {}
                _ => return Ok(()),
            }

            if s.file_pos >= self.file_size && s.window.is_empty() {
                let seq = s.next_seq;
                s.window.insert(
                    seq,
                    InFlight {
                        kind: SegmentKind::Fin,
                        wire: Segment::fin(seq as u16).encode(),
                        payload_len: 0,
                        sent_at: Instant::now(),
                    },
                );
                s.state = SenderState::FinSent;
                transmit(&self.ctx, &mut s, seq, false);
                s.next_seq = seq + 1;
                start_timer(&self.ctx, &mut s);
                debug!(seq, "FIN sent");
                return Ok(());
            }

            let available = self.cfg.max_win.saturating_sub(s.window.unacked_bytes());
            if available > 0 && s.file_pos < self.file_size {
                let n = MSS
                    .min(available)
                    .min((self.file_size - s.file_pos) as usize);
                self.file.seek(SeekFrom::Start(s.file_pos))?;
                self.file.read_exact(&mut chunk[..n])?;

                let seq = s.next_seq;
                s.window.insert(
                    seq,
                    InFlight {
                        kind: SegmentKind::Data,
                        wire: Segment::data(seq as u16, Bytes::copy_from_slice(&chunk[..n]))
                            .encode(),
                        payload_len: n,
                        sent_at: Instant::now(),
                    },
                );
                transmit(&self.ctx, &mut s, seq, false);
                s.next_seq = seq + n as u64;
                s.file_pos += n as u64;
                if !s.timer_running {
                    start_timer(&self.ctx, &mut s);
                }
            } else {
                drop(s);
                thread::sleep(YIELD);
            }
        }
    }

    fn wait_for(&self, timeout: Duration, pred: impl Fn(&Shared) -> bool) -> bool {
        let started = Instant::now();
        loop {
            if pred(&self.ctx.shared()) {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            thread::sleep(YIELD);
        }
    }
}

// ─── Transmission ───────────────────────────────────────────────────────────

/// Push one windowed segment through the forward PLC and onto the wire,
/// bumping counters and the journal. First transmissions count toward the
/// `original_*` statistics; retransmissions only toward `total_*`.
fn transmit(ctx: &Ctx, s: &mut Shared, seq: u64, retransmit: bool) {
    let Some(entry) = s.window.get(seq) else {
        return;
    };
    let kind = entry.kind;
    let wire = entry.wire.clone();
    let payload_len = entry.payload_len;

    if kind == SegmentKind::Data {
        if !retransmit {
            s.stats.original_data_sent += payload_len as u64;
            s.stats.original_segments_sent += 1;
        }
        s.stats.total_data_sent += payload_len as u64;
    }
    s.stats.total_segments_sent += 1;

    let wire_seq = seq as u16;
    match s.plc.forward(&wire) {
        Outcome::Drop => {
            s.stats.plc_forward_segments_dropped += 1;
            s.journal
                .record(Direction::Send, Status::Dropped, kind, wire_seq, payload_len);
        }
        Outcome::Corrupt(bad) => {
            s.stats.plc_forward_segments_corrupted += 1;
            s.journal
                .record(Direction::Send, Status::Corrupted, kind, wire_seq, payload_len);
            if let Err(e) = ctx.socket.send_to(&bad, ctx.peer) {
                warn!(error = %e, "send failed");
            }
        }
        Outcome::Pass(bytes) => {
            s.journal
                .record(Direction::Send, Status::Ok, kind, wire_seq, payload_len);
            if let Err(e) = ctx.socket.send_to(&bytes, ctx.peer) {
                warn!(error = %e, "send failed");
            }
        }
    }

    if let Some(entry) = s.window.get_mut(seq) {
        entry.sent_at = Instant::now();
    }
}

// ─── Timer ──────────────────────────────────────────────────────────────────

/// Arm the retransmission timer against the oldest unacked segment. Arming
/// is idempotent; a fresh thread starts only when none is live. Generation
/// numbers ensure a stale thread from an earlier arm can never fire again.
fn start_timer(ctx: &Arc<Ctx>, s: &mut Shared) {
    s.oldest_unacked = s.window.oldest();
    if s.timer_running {
        return;
    }
    s.timer_running = true;
    s.timer_generation += 1;
    let generation = s.timer_generation;

    let ctx = Arc::clone(ctx);
    thread::Builder::new()
        .name("urp-snd-timer".into())
        .spawn(move || timer_loop(ctx, generation))
        .expect("failed to spawn timer thread");
}

fn stop_timer(s: &mut Shared) {
    s.timer_running = false;
    s.oldest_unacked = None;
}

/// Sleep `rto`, then retransmit the oldest unacked segment if the timer is
/// still armed. A single thread services all expiries of one arm.
fn timer_loop(ctx: Arc<Ctx>, generation: u64) {
    loop {
        thread::sleep(ctx.rto);
        let mut s = ctx.shared();
        if !s.timer_running || s.timer_generation != generation {
            return;
        }
        let target = s.oldest_unacked.filter(|seq| s.window.contains(*seq));
        if let Some(seq) = target {
            if let Some(entry) = s.window.get(seq) {
                debug!(
                    seq,
                    since_last_ms = entry.sent_at.elapsed().as_millis() as u64,
                    "retransmission timeout"
                );
            }
            transmit(&ctx, &mut s, seq, true);
            s.stats.timeout_retransmissions += 1;
        }
    }
}

// ─── Receive Path ───────────────────────────────────────────────────────────

/// Poll the socket until the connection closes; every datagram passes the
/// reverse PLC before parsing.
fn recv_loop(ctx: Arc<Ctx>) {
    let mut buf = [0u8; 2048];
    loop {
        if ctx.shared().state == SenderState::Closed {
            return;
        }
        match ctx.socket.recv_from(&mut buf) {
            Ok((n, _addr)) => handle_datagram(&ctx, &buf[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Poll timeout — re-check state.
            }
            Err(e) => {
                warn!(error = %e, "receive loop socket error");
                let mut s = ctx.shared();
                s.fault = Some(e.to_string());
                s.state = SenderState::Closed;
                stop_timer(&mut s);
                return;
            }
        }
    }
}

fn handle_datagram(ctx: &Arc<Ctx>, raw: &[u8]) {
    let mut s = ctx.shared();

    let (data, status) = match s.plc.reverse(raw) {
        Outcome::Drop => {
            s.stats.plc_reverse_segments_dropped += 1;
            return;
        }
        Outcome::Corrupt(bad) => {
            s.stats.plc_reverse_segments_corrupted += 1;
            (bad, Status::Corrupted)
        }
        Outcome::Pass(bytes) => (bytes, Status::Ok),
    };

    let Some((segment, valid)) = Segment::decode(&data) else {
        return; // malformed — dropped silently
    };
    if !valid {
        s.stats.corrupted_acks_discarded += 1;
        s.journal
            .record(Direction::Recv, Status::Corrupted, segment.kind, segment.seq, 0);
        return;
    }
    s.journal
        .record(Direction::Recv, status, segment.kind, segment.seq, 0);
    if segment.kind != SegmentKind::Ack {
        return;
    }

    match s.state {
        SenderState::SynSent => {
            if segment.seq == s.isn.wrapping_add(1) {
                let next = u64::from(s.isn) + 1;
                s.window.clear();
                s.base = next;
                s.next_seq = next;
                s.dup_acks.reset();
                stop_timer(&mut s);
                s.state = SenderState::Established;
                info!("connection established");
            }
        }
        SenderState::Established => {
            let ack = unwrap_seq(segment.seq, s.base);
            handle_ack(ctx, &mut s, ack);
        }
        SenderState::FinSent => {
            if unwrap_seq(segment.seq, s.next_seq) == s.next_seq {
                stop_timer(&mut s);
                s.state = SenderState::Closed;
                info!("connection closed");
            }
        }
        SenderState::Closed => {}
    }
}

/// Cumulative ACK processing: stale ACKs are ignored, duplicates of the base
/// are counted (third triggers fast retransmit), advancing ACKs slide the
/// window and rearm the timer against the new oldest entry.
fn handle_ack(ctx: &Arc<Ctx>, s: &mut Shared, ack: u64) {
    if ack < s.base {
        return;
    }
    if ack == s.base {
        s.stats.duplicate_acks_received += 1;
        if s.dup_acks.record(ack) == 3 && s.window.contains(s.base) {
            debug!(seq = s.base, "fast retransmit");
            let base = s.base;
            transmit(ctx, s, base, true);
            s.stats.fast_retransmissions += 1;
        }
        return;
    }

    s.window.ack_through(ack);
    s.base = ack;
    s.dup_acks.reset();
    if s.window.is_empty() {
        stop_timer(s);
    } else {
        s.oldest_unacked = s.window.oldest();
        if !s.timer_running {
            start_timer(ctx, s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SenderConfig {
        SenderConfig {
            local_port: 0,
            peer_port: 1,
            filename: PathBuf::from("/nonexistent"),
            max_win: 1000,
            rto: Duration::from_millis(100),
            plc: PlcConfig::clean(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }

    #[test]
    fn validate_rejects_oversized_window() {
        let cfg = SenderConfig {
            max_win: 32768,
            ..config()
        };
        assert!(cfg.validate().is_err());
        let cfg = SenderConfig {
            max_win: 0,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_rto() {
        let cfg = SenderConfig {
            rto: Duration::ZERO,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_probability() {
        let cfg = SenderConfig {
            plc: PlcConfig {
                forward_loss: 1.2,
                ..PlcConfig::clean()
            },
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn new_fails_on_missing_file() {
        assert!(Sender::new(config()).is_err());
    }
}
