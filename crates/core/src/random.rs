use rand::Rng;

/// Source of the one random choice the evaluator makes.
///
/// Injected so tests can pin which unowned badge the guarantee path picks.
pub trait RandomSource {
    /// Returns an index in `0..len`. `len` is never zero.
    fn pick_index(&mut self, len: usize) -> usize;
}

/// Thread-local RNG backed source used outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick_index(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Always picks the same position, clamped to the candidate list.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPick(pub usize);

impl RandomSource for FixedPick {
    fn pick_index(&mut self, len: usize) -> usize {
        self.0.min(len.saturating_sub(1))
    }
}
