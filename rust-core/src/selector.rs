// Deterministic selection from a seed.
// index i -> SHA-256("{seed}:{i}"), first 8 bytes big-endian, mod bound.
// Modulo bias is ~bound/2^64 and accepted.

use sha2::{Digest, Sha256};

/// Value in `[0, bound)`. Callers guard against `bound == 0`; it yields `None`.
pub fn deterministic_random(seed: &str, bound: usize, index: u64) -> Option<usize> {
    if bound == 0 {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", seed, index).as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(prefix);
    Some((value % bound as u64) as usize)
}

/// Shrinking-pool draw without replacement.
/// Winner i is removed from the pool left after winners 0..i; order matters.
/// Stops early if the pool runs out.
pub fn select_ordered<T>(seed: &str, pool: &[T], count: usize) -> Vec<T>
where
    T: Clone,
{
    let mut remaining: Vec<T> = pool.to_vec();
    let mut picked = Vec::with_capacity(count.min(pool.len()));
    for i in 0..count {
        let Some(idx) = deterministic_random(seed, remaining.len(), i as u64) else {
            break;
        };
        picked.push(remaining.remove(idx));
    }
    picked
}
