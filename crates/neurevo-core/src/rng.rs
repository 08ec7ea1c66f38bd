use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

const TICK_PRIME: u64 = 0x9E37_79B9_7F4A_7C15;
const AGENT_PRIME: u64 = 0xBF58_476D_1CE4_E5B9;

/// Create a deterministic RNG from a seed.
pub fn create_rng(seed: u64) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(seed)
}

/// Derive an independent stream for one agent's decision phase on one tick.
///
/// Streams depend only on `(seed, tick, agent_id)`, never on thread scheduling.
pub fn derive_agent_rng(base_seed: u64, tick: u64, agent_id: u32) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(
        base_seed
            ^ tick.wrapping_mul(TICK_PRIME)
            ^ (agent_id as u64).wrapping_add(1).wrapping_mul(AGENT_PRIME),
    )
}
