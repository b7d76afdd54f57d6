//! Deterministic random number generation.
//!
//! RULE: Nothing in the pipeline may call any platform RNG.
//! All randomness flows through StreamRng instances derived
//! from the single master seed stored on the Run record.
//!
//! Each pipeline stage gets its own RNG stream, seeded deterministically
//! from (master_seed XOR stream_index). This means:
//!   - Adding a new stage never changes existing stages' streams.
//!   - Each stage's stream is fully reproducible in isolation.
//!   - Per-meter streams mix in a hash of the meter number, so the
//!     sequential and worker-pool pipelines draw identical values for
//!     a given meter regardless of scheduling order.

use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single pipeline stage.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream RNG from the master seed and a stable
    /// stream index. The index must never change once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform draw in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Gaussian draw. A degenerate sigma collapses to the mean.
    pub fn gauss(&mut self, mean: f64, sigma: f64) -> f64 {
        match Normal::new(mean, sigma) {
            Ok(dist) => dist.sample(&mut self.inner),
            Err(_) => mean,
        }
    }

    /// Poisson event count for the given rate. Zero for rate <= 0.
    pub fn poisson(&mut self, lambda: f64) -> u64 {
        match Poisson::new(lambda) {
            Ok(dist) => dist.sample(&mut self.inner) as u64,
            Err(_) => 0,
        }
    }

    /// Pick a uniform element from a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.next_u64_below(items.len() as u64) as usize;
        items.get(idx)
    }
}

/// All stream RNGs for a single run, derived from the master seed.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Stream for a run-global stage (seeding, infrastructure).
    pub fn for_stream(&self, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }

    /// Stream for a monthly population rule. The month ordinal is mixed
    /// into the seed so each month draws a fresh stream.
    pub fn for_month(&self, slot: StreamSlot, month_ordinal: u64) -> StreamRng {
        let mixed = self.master_seed ^ month_ordinal.wrapping_mul(0xd6e8_feb8_6659_fd93);
        StreamRng::new(mixed, slot as u64).with_name(slot.name())
    }

    /// Stream owned by one meter's pipeline. Derived from the meter
    /// number, not from scheduling order.
    pub fn for_meter(&self, slot: StreamSlot, meter_number: &str) -> StreamRng {
        let mixed = self.master_seed ^ fnv1a(meter_number);
        StreamRng::new(mixed, slot as u64).with_name(slot.name())
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries — only append.
/// Reordering changes every stage's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Seeding = 0,
    Connections = 1,
    Replacement = 2,
    Failure = 3,
    Upgrade = 4,
    Churn = 5,
    TariffChange = 6,
    Readings = 7,
    Billing = 8,
    Payment = 9,
    TransformerOutage = 10,
    // Add new streams here — append only.
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Seeding => "seeding",
            Self::Connections => "connections",
            Self::Replacement => "replacement",
            Self::Failure => "failure",
            Self::Upgrade => "upgrade",
            Self::Churn => "churn",
            Self::TariffChange => "tariff_change",
            Self::Readings => "readings",
            Self::Billing => "billing",
            Self::Payment => "payment",
            Self::TransformerOutage => "transformer_outage",
        }
    }
}
