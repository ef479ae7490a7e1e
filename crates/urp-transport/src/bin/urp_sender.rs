//! # URP Sender
//!
//! Transfers a file to a `urp-receiver` over localhost UDP through the
//! loss/corruption shim, writing the protocol event log to
//! `sender_log.txt` in the working directory.
//!
//! ## Usage
//!
//! ```bash
//! urp-sender <sender_port> <receiver_port> <filename> <max_win> <rto> <flp> <rlp> <fcp> <rcp>
//! ```

use std::path::PathBuf;
use std::time::Duration;

use urp_transport::plc::PlcConfig;
use urp_transport::sender::{Sender, SenderConfig, DEFAULT_LOG_PATH};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let cfg = parse_args()?;
    tracing::info!(
        local = cfg.local_port,
        peer = cfg.peer_port,
        file = %cfg.filename.display(),
        max_win = cfg.max_win,
        rto_s = cfg.rto.as_secs_f64(),
        "urp-sender starting"
    );

    let stats = Sender::new(cfg)?.run()?;
    tracing::info!(
        original_bytes = stats.original_data_sent,
        total_bytes = stats.total_data_sent,
        timeouts = stats.timeout_retransmissions,
        fast = stats.fast_retransmissions,
        "transfer complete"
    );
    Ok(())
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

fn parse_args() -> anyhow::Result<SenderConfig> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        std::process::exit(0);
    }
    if args.len() != 10 {
        print_help();
        anyhow::bail!("expected 9 arguments, got {}", args.len() - 1);
    }

    let port = |i: usize, name: &str| -> anyhow::Result<u16> {
        args[i]
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name} '{}': {e}", args[i]))
    };
    let prob = |i: usize, name: &str| -> anyhow::Result<f64> {
        let p: f64 = args[i]
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name} '{}': {e}", args[i]))?;
        if !(0.0..=1.0).contains(&p) {
            anyhow::bail!("{name} must lie in [0, 1], got {p}");
        }
        Ok(p)
    };

    let local_port = port(1, "sender_port")?;
    let peer_port = port(2, "receiver_port")?;
    let filename = PathBuf::from(&args[3]);
    let max_win: usize = args[4]
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid max_win '{}': {e}", args[4]))?;
    let rto_secs: f64 = args[5]
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid rto '{}': {e}", args[5]))?;
    if rto_secs <= 0.0 {
        anyhow::bail!("rto must be positive, got {rto_secs}");
    }

    let cfg = SenderConfig {
        local_port,
        peer_port,
        filename,
        max_win,
        rto: Duration::from_secs_f64(rto_secs),
        plc: PlcConfig {
            forward_loss: prob(6, "flp")?,
            reverse_loss: prob(7, "rlp")?,
            forward_corrupt: prob(8, "fcp")?,
            reverse_corrupt: prob(9, "rcp")?,
        },
        log_path: PathBuf::from(DEFAULT_LOG_PATH),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn print_help() {
    eprintln!(
        r#"urp-sender — reliable file transfer sender over lossy UDP

USAGE:
  urp-sender <sender_port> <receiver_port> <filename> <max_win> <rto> <flp> <rlp> <fcp> <rcp>

ARGUMENTS:
  sender_port     Local UDP port to bind
  receiver_port   Receiver's UDP port on localhost
  filename        File to transfer
  max_win         Window bound in bytes (1..32768)
  rto             Retransmission timeout in seconds (fractional allowed)
  flp             Forward loss probability [0, 1]
  rlp             Reverse loss probability [0, 1]
  fcp             Forward corruption probability [0, 1]
  rcp             Reverse corruption probability [0, 1]

The protocol event log and counter summary are written to sender_log.txt.
RUST_LOG controls diagnostic logging (e.g. info, urp_transport=debug).
"#
    );
}
