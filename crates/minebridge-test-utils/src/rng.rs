//! Deterministic RNG utilities for reproducible tests.

use minebridge_core::types::Action;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
#[must_use]
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Random action with mouse deltas bounded by the display size.
pub fn random_action(rng: &mut ChaCha8Rng, display_size: [u32; 2]) -> Action {
    Action::sample(rng, display_size[0], display_size[1])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_deterministic() {
        use rand::Rng;
        let mut rng1 = seeded_rng(42);
        let mut rng2 = seeded_rng(42);
        let v1: u64 = rng1.r#gen();
        let v2: u64 = rng2.r#gen();
        assert_eq!(v1, v2);
    }

    #[test]
    fn random_actions_reproducible() {
        let a: Vec<Action> = {
            let mut rng = seeded_rng(7);
            (0..5).map(|_| random_action(&mut rng, [64, 48])).collect()
        };
        let b: Vec<Action> = {
            let mut rng = seeded_rng(7);
            (0..5).map(|_| random_action(&mut rng, [64, 48])).collect()
        };
        assert_eq!(a, b);
    }
}
