use data_encoding::HEXLOWER;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The run's seeded random stream.
///
/// Owned by the scan session and lent to the selector and the evasion chain,
/// which are its only readers. Every draw advances `position`, so two runs
/// with the same seed that make the same calls see the same values.
#[derive(Debug, Clone)]
pub struct SeededStream {
    seed: u64,
    rng: StdRng,
    position: u64,
}

impl SeededStream {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            position: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of values drawn so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn next_f64(&mut self) -> f64 {
        self.position += 1;
        self.rng.gen::<f64>()
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    pub fn below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        self.position += 1;
        self.rng.gen_range(0..n.max(1))
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.below(items.len());
        items.get(idx)
    }
}

/// Per-attempt canary token.
///
/// Derived from the seed and the attempt ordinal rather than drawn from the
/// stream, so it never shifts payload mutations. Always `spk` plus 12
/// lowercase hex digits; the ordinal wraps at 24 bits.
pub fn canary_token(seed: u64, ordinal: u32) -> String {
    let tag = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).to_be_bytes();
    format!("spk{}{:06x}", HEXLOWER.encode(&tag[..3]), ordinal & 0x00FF_FFFF)
}
