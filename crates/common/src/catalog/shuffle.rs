//! Seeded shuffle
//!
//! The directory listing is shuffled per visit but must be reproducible for
//! a given seed so paging through it stays stable.

const MODULUS: u64 = 233_280;
const MULTIPLIER: u64 = 9_301;
const INCREMENT: u64 = 49_297;

/// Linear congruential generator `s = (s * 9301 + 49297) mod 233280`
#[derive(Debug, Clone)]
pub struct SeededRandom {
    state: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Advance and return the new state, always below 233280
    pub fn next_state(&mut self) -> u64 {
        self.state = ((self.state % MODULUS) * MULTIPLIER + INCREMENT) % MODULUS;
        self.state
    }

    /// Uniform index in `0..bound`, i.e. `floor(state / 233280 * bound)`
    pub fn next_index(&mut self, bound: usize) -> usize {
        let state = self.next_state();
        (state * bound as u64 / MODULUS) as usize
    }
}

/// Fisher–Yates shuffle driven by [`SeededRandom`]. The same items and seed
/// always give the same order.
pub fn seeded_shuffle<T>(items: &mut [T], seed: u64) {
    let mut rng = SeededRandom::new(seed);
    let mut current = items.len();

    while current != 0 {
        let index = rng.next_index(current);
        current -= 1;
        items.swap(current, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_sequence() {
        let mut rng = SeededRandom::new(1);
        // (1 * 9301 + 49297) % 233280
        assert_eq!(rng.next_state(), 58_598);
        assert_eq!(rng.next_state(), (58_598 * 9_301 + 49_297) % 233_280);
    }

    #[test]
    fn test_same_seed_same_order() {
        let mut a: Vec<u32> = (0..20).collect();
        let mut b = a.clone();
        seeded_shuffle(&mut a, 1_736_400_000_000);
        seeded_shuffle(&mut b, 1_736_400_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_output_is_permutation() {
        for seed in [0, 1, 42, 233_280, u64::MAX] {
            let mut items: Vec<u32> = (0..50).collect();
            seeded_shuffle(&mut items, seed);
            let mut sorted = items.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_small_inputs() {
        let mut empty: Vec<u8> = vec![];
        seeded_shuffle(&mut empty, 7);
        assert!(empty.is_empty());

        let mut one = vec!["only"];
        seeded_shuffle(&mut one, 7);
        assert_eq!(one, vec!["only"]);
    }

    #[test]
    fn test_known_permutation() {
        // seed 1: states 58598, 127215, 79852 give indices 0, 1, 0
        let mut items = vec!['a', 'b', 'c'];
        seeded_shuffle(&mut items, 1);
        assert_eq!(items, vec!['c', 'b', 'a']);
    }
}
