//! Seed → instance identity derivation.
//!
//! A seeded instance gets a UUID that is a pure function of the seed, so the
//! world directory and config path derived from it are reproducible across
//! runs. Unseeded instances get a random v4 UUID.

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::{Builder, Uuid};

/// Deterministic instance id for `seed`.
///
/// # Example
///
/// ```
/// use minebridge_core::seed::instance_id_from_seed;
///
/// assert_eq!(instance_id_from_seed(42), instance_id_from_seed(42));
/// assert_ne!(instance_id_from_seed(42), instance_id_from_seed(43));
/// ```
#[must_use]
pub fn instance_id_from_seed(seed: u64) -> Uuid {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Builder::from_random_bytes(bytes).into_uuid()
}

/// Fresh random instance id for unseeded instances.
#[must_use]
pub fn random_instance_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_id_is_version_4() {
        let id = instance_id_from_seed(7);
        assert_eq!(id.get_version_num(), 4);
        assert_eq!(id.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn distinct_seeds_give_distinct_ids() {
        let ids: std::collections::HashSet<_> = (0..64).map(instance_id_from_seed).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(random_instance_id(), random_instance_id());
    }
}
