//! # PLC — Packet Loss & Corruption
//!
//! Probabilistic fault injector applied on the sender side only: the forward
//! policy covers everything the sender transmits (DATA/SYN/FIN), the reverse
//! policy covers everything it receives (ACKs). One uniform draw decides the
//! fate of each segment:
//!
//! ```text
//!   r < loss               → Drop
//!   loss ≤ r < loss+corr   → Corrupt (single bit flip past the seq/flags)
//!   otherwise              → Pass
//! ```
//!
//! The shim is seedable for reproducible runs, and accepts a scripted drop
//! plan (drop the Nth segment in a direction) so teardown races can be
//! staged deterministically in tests.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::Rng;
use rand::RngExt;
use rand::SeedableRng;
use std::collections::BTreeSet;

use crate::wire;

// ─── Configuration ──────────────────────────────────────────────────────────

/// The four channel fault probabilities, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlcConfig {
    /// Forward loss probability (sender → receiver).
    pub forward_loss: f64,
    /// Reverse loss probability (receiver → sender).
    pub reverse_loss: f64,
    /// Forward corruption probability.
    pub forward_corrupt: f64,
    /// Reverse corruption probability.
    pub reverse_corrupt: f64,
}

impl PlcConfig {
    /// A fault-free channel.
    pub fn clean() -> Self {
        PlcConfig::default()
    }

    /// Whether every probability lies in [0, 1].
    pub fn is_valid(&self) -> bool {
        [
            self.forward_loss,
            self.reverse_loss,
            self.forward_corrupt,
            self.reverse_corrupt,
        ]
        .iter()
        .all(|p| (0.0..=1.0).contains(p))
    }
}

// ─── Outcome ────────────────────────────────────────────────────────────────

/// What the shim did to one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Segment passes through unchanged.
    Pass(Bytes),
    /// Segment is lost; nothing reaches the wire.
    Drop,
    /// Segment is delivered with a single flipped bit.
    Corrupt(Bytes),
}

// ─── Shim ───────────────────────────────────────────────────────────────────

/// Stateful fault injector. Holds its own RNG so a seeded shim replays the
/// same fault sequence.
pub struct Plc {
    cfg: PlcConfig,
    rng: StdRng,
    forward_seen: u64,
    reverse_seen: u64,
    forward_drop_plan: BTreeSet<u64>,
    reverse_drop_plan: BTreeSet<u64>,
}

impl Plc {
    /// Create a shim with an entropy-seeded RNG.
    pub fn new(cfg: PlcConfig) -> Self {
        let seed = rand::rng().random::<u64>();
        Self::with_seed(cfg, seed)
    }

    /// Create a shim whose fault sequence is reproducible from `seed`.
    pub fn with_seed(cfg: PlcConfig, seed: u64) -> Self {
        Plc {
            cfg,
            rng: StdRng::seed_from_u64(seed),
            forward_seen: 0,
            reverse_seen: 0,
            forward_drop_plan: BTreeSet::new(),
            reverse_drop_plan: BTreeSet::new(),
        }
    }

    /// Force-drop specific forward segments by 0-based index, overriding the
    /// probabilistic draw for exactly those segments.
    pub fn script_forward_drops(&mut self, indices: &[u64]) {
        self.forward_drop_plan.extend(indices.iter().copied());
    }

    /// Force-drop specific reverse segments by 0-based index.
    pub fn script_reverse_drops(&mut self, indices: &[u64]) {
        self.reverse_drop_plan.extend(indices.iter().copied());
    }

    /// Apply the forward policy to an outbound segment.
    pub fn forward(&mut self, raw: &[u8]) -> Outcome {
        let idx = self.forward_seen;
        self.forward_seen += 1;
        if self.forward_drop_plan.remove(&idx) {
            return Outcome::Drop;
        }
        self.apply(self.cfg.forward_loss, self.cfg.forward_corrupt, raw)
    }

    /// Apply the reverse policy to an inbound segment.
    pub fn reverse(&mut self, raw: &[u8]) -> Outcome {
        let idx = self.reverse_seen;
        self.reverse_seen += 1;
        if self.reverse_drop_plan.remove(&idx) {
            return Outcome::Drop;
        }
        self.apply(self.cfg.reverse_loss, self.cfg.reverse_corrupt, raw)
    }

    fn apply(&mut self, loss: f64, corrupt: f64, raw: &[u8]) -> Outcome {
        let r = self.rng.random::<f64>();
        if r < loss {
            Outcome::Drop
        } else if r < loss + corrupt {
            Outcome::Corrupt(wire::corrupt(raw, &mut self.rng))
        } else {
            Outcome::Pass(Bytes::copy_from_slice(raw))
        }
    }
}
