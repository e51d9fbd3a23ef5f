use rand::{rngs::StdRng, Rng, SeedableRng};

/// Construct a deterministic RNG from a fixed seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A display-channel identifier for one reporter instance. Only needs low
/// collision probability across concurrent runs; always a multiple of ten so
/// a run can claim adjacent window ids.
pub fn random_display_id() -> u32 {
    rand::thread_rng().gen_range(0..1_000_000) * 10
}
