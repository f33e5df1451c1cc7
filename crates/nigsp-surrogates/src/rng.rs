// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Seeded Random Streams
// ─────────────────────────────────────────────────────────────────────
//! One independent ChaCha8 stream per realisation index.
//!
//! Every stream shares the key derived from the base seed and differs only
//! in its stream id, so realisation `k` draws the same numbers no matter
//! which worker runs it or in what order.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedStream {
    seed: u64,
}

impl SeedStream {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generator for realisation `index`.
    pub fn rng(&self, index: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(index);
        rng
    }
}
