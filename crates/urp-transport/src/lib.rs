//! # urp-transport
//!
//! URP — a reliable byte-stream transport over unreliable UDP datagrams.
//!
//! A sender transfers a file to a receiver across a channel that may drop or
//! corrupt segments in either direction. Reliability comes from a three-way
//! style connection setup, a cumulative-ACK sliding window with a single
//! retransmission timer and three-dup-ACK fast retransmit, ordered receiver
//! reassembly with duplicate suppression, and a TIME_WAIT linger on teardown.
//! Loss and corruption are injected on the sender side by the PLC shim.
//!
//! ## Crate structure
//!
//! - [`wire`] — Segment header serialization, one's-complement checksum
//! - [`plc`] — Packet Loss & Corruption fault injector
//! - [`journal`] — Per-event protocol log lines
//! - [`stats`] — Per-side transfer statistics
//! - [`window`] — Sender-side sliding window and duplicate-ACK tracking
//! - [`reassembly`] — Receiver-side ordered delivery and duplicate detection
//! - [`sender`] — Sender engine (handshake, send loop, timer, teardown)
//! - [`receiver`] — Receiver engine (accept, deliver, ACK, TIME_WAIT)

pub mod journal;
pub mod plc;
pub mod reassembly;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod window;
pub mod wire;
