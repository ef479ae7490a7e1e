//! # URP Receiver
//!
//! Accepts one connection from a `urp-sender`, reassembles the byte stream
//! into the output file, and writes the protocol event log to
//! `receiver_log.txt` in the working directory.
//!
//! ## Usage
//!
//! ```bash
//! urp-receiver <receiver_port> <sender_port> <output_filename> <max_win>
//! ```

use std::path::PathBuf;

use urp_transport::receiver::{Receiver, ReceiverConfig, DEFAULT_LOG_PATH};

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
        output = %cfg.output.display(),
        "urp-receiver starting"
    );

    let stats = Receiver::new(cfg)?.run()?;
    tracing::info!(
        bytes = stats.original_data_received,
        duplicates = stats.duplicate_segments_received,
        acks = stats.total_acks_sent,
        "transfer complete"
    );
    Ok(())
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

fn parse_args() -> anyhow::Result<ReceiverConfig> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        std::process::exit(0);
    }
    if args.len() != 5 {
        print_help();
        anyhow::bail!("expected 4 arguments, got {}", args.len() - 1);
    }

    let local_port: u16 = args[1]
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid receiver_port '{}': {e}", args[1]))?;
    let peer_port: u16 = args[2]
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid sender_port '{}': {e}", args[2]))?;
    let output = PathBuf::from(&args[3]);
    let max_win: usize = args[4]
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid max_win '{}': {e}", args[4]))?;

    let cfg = ReceiverConfig {
        local_port,
        peer_port,
        output,
        max_win,
        log_path: PathBuf::from(DEFAULT_LOG_PATH),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn print_help() {
    eprintln!(
        r#"urp-receiver — reliable file transfer receiver over lossy UDP

USAGE:
  urp-receiver <receiver_port> <sender_port> <output_filename> <max_win>

ARGUMENTS:
  receiver_port     Local UDP port to bind
  sender_port       Sender's UDP port on localhost
  output_filename   Destination file (created truncating)
  max_win           Window bound in bytes (1..32768)

The protocol event log and counter summary are written to receiver_log.txt.
RUST_LOG controls diagnostic logging (e.g. info, urp_transport=debug).
"#
    );
}
