//! End-to-end transfers over real loopback UDP sockets.
//!
//! Each test uses its own port pair and temp files so the suite can run in
//! parallel. Channel faults are made deterministic either by seeding the PLC
//! or by scripting exact drop indices, so the recovery paths under test
//! (timeout retransmission, fast retransmit, TIME_WAIT re-ACK) fire every
//! run instead of probabilistically.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use urp_transport::plc::{Plc, PlcConfig};
use urp_transport::receiver::{Receiver, ReceiverConfig};
use urp_transport::sender::{Sender, SenderConfig};
use urp_transport::stats::{ReceiverStats, SenderStats};

// ─── Harness ────────────────────────────────────────────────────────────────

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("urp-{}-{}", std::process::id(), tag))
}

/// Deterministic, non-repeating filler.
fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| {
            let word = (i as u32).wrapping_mul(2654435761);
            (word >> 24) as u8 ^ (i >> 8) as u8
        })
        .collect()
}

struct Transfer {
    sender: SenderStats,
    receiver: ReceiverStats,
    output: Vec<u8>,
}

fn run_transfer(
    tag: &str,
    ports: (u16, u16),
    input: &[u8],
    max_win: usize,
    rto: Duration,
    plc: Plc,
) -> Transfer {
    let (sender_port, receiver_port) = ports;
    let input_path = temp_path(&format!("{tag}-input.bin"));
    let output_path = temp_path(&format!("{tag}-output.bin"));
    std::fs::write(&input_path, input).unwrap();

    // Bind the receiver before the sender's SYN can fly.
    let receiver = Receiver::new(ReceiverConfig {
        local_port: receiver_port,
        peer_port: sender_port,
        output: output_path.clone(),
        max_win,
        log_path: temp_path(&format!("{tag}-receiver-log.txt")),
    })
    .unwrap();
    let receiver_handle = thread::spawn(move || receiver.run().unwrap());

    let sender = Sender::with_plc(
        SenderConfig {
            local_port: sender_port,
            peer_port: receiver_port,
            filename: input_path.clone(),
            max_win,
            rto,
            plc: PlcConfig::clean(),
            log_path: temp_path(&format!("{tag}-sender-log.txt")),
        },
        plc,
    )
    .unwrap();
    let sender_stats = sender.run().unwrap();

    let receiver_stats = receiver_handle.join().unwrap();
    let output = std::fs::read(&output_path).unwrap();
    std::fs::remove_file(&input_path).ok();
    std::fs::remove_file(&output_path).ok();

    Transfer {
        sender: sender_stats,
        receiver: receiver_stats,
        output,
    }
}

// ─── Clean channel ──────────────────────────────────────────────────────────

#[test]
fn clean_channel_stop_and_wait() {
    let input = patterned_bytes(3500);
    let t = run_transfer(
        "s1",
        (20010, 20011),
        &input,
        1000,
        Duration::from_millis(100),
        Plc::with_seed(PlcConfig::clean(), 1),
    );

    assert_eq!(t.output, input);
    assert_eq!(t.sender.original_data_sent, 3500);
    assert_eq!(t.sender.original_segments_sent, 4); // 3 × 1000 + 1 × 500
    assert_eq!(t.sender.timeout_retransmissions, 0);
    assert_eq!(t.sender.fast_retransmissions, 0);

    assert_eq!(t.receiver.original_data_received, 3500);
    assert_eq!(t.receiver.original_segments_received, 4);
    assert_eq!(t.receiver.duplicate_segments_received, 0);
    assert_eq!(t.receiver.total_acks_sent, 6); // SYN + 4 × DATA + FIN
}

#[test]
fn clean_channel_sliding_window() {
    let input = patterned_bytes(50_000);
    let t = run_transfer(
        "s2",
        (20020, 20021),
        &input,
        5000,
        Duration::from_millis(100),
        Plc::with_seed(PlcConfig::clean(), 2),
    );

    assert_eq!(t.output, input);
    assert_eq!(t.sender.original_segments_sent, 50);
    assert!(
        t.sender.timeout_retransmissions + t.sender.fast_retransmissions <= 1,
        "at most one spurious retransmission on a clean channel"
    );
}

#[test]
fn large_transfer_wraps_sequence_space() {
    // More than 64 KB forces 16-bit wire sequence wraparound regardless of
    // the random ISN.
    let input = patterned_bytes(80_000);
    let t = run_transfer(
        "wrap",
        (20030, 20031),
        &input,
        5000,
        Duration::from_millis(200),
        Plc::with_seed(PlcConfig::clean(), 3),
    );

    assert_eq!(t.output, input);
    assert_eq!(t.sender.original_segments_sent, 80);
    assert_eq!(t.receiver.original_data_received, 80_000);
}

// ─── Forward loss ───────────────────────────────────────────────────────────

#[test]
fn forward_loss_triggers_fast_retransmit() {
    // Drop the first DATA attempt (forward index 0 is the SYN). The three
    // segments behind it elicit three duplicate ACKs; the third must trigger
    // exactly one fast retransmit. The long rto keeps the timer out of it.
    let mut plc = Plc::with_seed(PlcConfig::clean(), 4);
    plc.script_forward_drops(&[1]);

    let input = patterned_bytes(4000);
    let t = run_transfer(
        "fastrtx",
        (20040, 20041),
        &input,
        4000,
        Duration::from_secs(2),
        plc,
    );

    assert_eq!(t.output, input);
    assert_eq!(t.sender.fast_retransmissions, 1);
    assert_eq!(t.sender.timeout_retransmissions, 0);
    assert_eq!(t.sender.duplicate_acks_received, 3);
    assert_eq!(t.sender.original_data_sent, 4000);
    assert_eq!(t.sender.total_data_sent, 5000); // one 1000-byte retransmission
    assert_eq!(t.sender.plc_forward_segments_dropped, 1);

    assert_eq!(t.receiver.duplicate_acks_sent, 3);
    assert_eq!(t.receiver.original_data_received, 4000);
}

#[test]
fn forward_loss_triggers_timeout_retransmit() {
    // Drop the final DATA attempt (forward index 10 after the SYN and nine
    // predecessors). Nothing follows it, so no duplicate ACKs arrive and
    // recovery must come from the retransmission timer.
    let mut plc = Plc::with_seed(PlcConfig::clean(), 5);
    plc.script_forward_drops(&[10]);

    let input = patterned_bytes(10_000);
    let t = run_transfer(
        "timeout",
        (20050, 20051),
        &input,
        4000,
        Duration::from_millis(200),
        plc,
    );

    assert_eq!(t.output, input);
    assert!(t.sender.timeout_retransmissions >= 1);
    assert_eq!(t.sender.fast_retransmissions, 0);
    assert_eq!(t.sender.original_data_sent, 10_000);
    assert!(t.sender.total_data_sent > 10_000);
    assert_eq!(t.receiver.original_data_received, 10_000);
}

// ─── Reverse loss ───────────────────────────────────────────────────────────

#[test]
fn reverse_loss_of_handshake_ack_recovers() {
    // Drop the SYN-ACK (reverse index 0). The sender must retransmit its SYN
    // on timeout and the receiver must re-answer without restarting state.
    let mut plc = Plc::with_seed(PlcConfig::clean(), 6);
    plc.script_reverse_drops(&[0]);

    let input = patterned_bytes(10_000);
    let t = run_transfer(
        "synack",
        (20060, 20061),
        &input,
        2000,
        Duration::from_millis(200),
        plc,
    );

    assert_eq!(t.output, input);
    assert!(t.sender.timeout_retransmissions >= 1);
    assert_eq!(t.sender.original_segments_sent, 10);
    assert_eq!(t.sender.plc_reverse_segments_dropped, 1);
    assert_eq!(t.receiver.original_data_received, 10_000);
}

// ─── Corruption ─────────────────────────────────────────────────────────────

#[test]
fn corruption_both_directions_recovers() {
    let cfg = PlcConfig {
        forward_corrupt: 0.35,
        reverse_corrupt: 0.35,
        ..PlcConfig::clean()
    };
    let input = patterned_bytes(10_000);
    let t = run_transfer(
        "corrupt",
        (20070, 20071),
        &input,
        2000,
        Duration::from_millis(200),
        Plc::with_seed(cfg, 20250801),
    );

    assert_eq!(t.output, input);
    assert_eq!(t.sender.original_data_sent, 10_000);
    assert!(
        t.receiver.corrupted_segments_discarded > 0,
        "forward corruption must reach the receiver's checksum"
    );
    assert!(
        t.sender.corrupted_acks_discarded > 0,
        "reverse corruption must reach the sender's checksum"
    );
    assert_eq!(
        t.sender.plc_forward_segments_corrupted, t.receiver.corrupted_segments_discarded,
        "every corrupted forward segment is discarded exactly once"
    );
}

// ─── Teardown ───────────────────────────────────────────────────────────────

#[test]
fn teardown_survives_lost_fin_ack() {
    // One DATA segment, so the reverse traffic is SYN-ACK (0), DATA-ACK (1),
    // FIN-ACK (2). Dropping the FIN-ACK forces the sender to retransmit FIN
    // and the receiver, lingering in TIME_WAIT, to re-ACK it without writing
    // any further bytes.
    let mut plc = Plc::with_seed(PlcConfig::clean(), 7);
    plc.script_reverse_drops(&[2]);

    let input = patterned_bytes(500);
    let t = run_transfer(
        "teardown",
        (20080, 20081),
        &input,
        1000,
        Duration::from_millis(200),
        plc,
    );

    assert_eq!(t.output, input);
    assert_eq!(t.output.len(), 500, "TIME_WAIT must not write extra bytes");
    assert!(t.sender.timeout_retransmissions >= 1);
    assert!(
        t.receiver.total_acks_sent >= 4,
        "SYN-ACK, DATA-ACK and two FIN-ACKs expected, got {}",
        t.receiver.total_acks_sent
    );
}
