// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives wiring and weight initialization, so every reservoir built from
// the same seed is identical on every platform.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in [0, 1) with 53 bits of precision.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u64;
        low + (self.next_u64() % span) as usize
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.gen_range_usize(0, i + 1);
            items.swap(i, j);
        }
    }

    /// A random permutation of `0..n`.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..n).collect();
        self.shuffle(&mut idx);
        idx
    }
}

/// Lazily draws a random permutation of `0..len` one element at a time.
///
/// Equivalent to a forward Fisher-Yates pass, but only the swapped slots are
/// materialized, so `len` may be as large as N² without allocating it.
/// Every drawn index is distinct.
#[derive(Debug)]
pub struct IndexSampler {
    len: usize,
    drawn: usize,
    swapped: HashMap<usize, usize>,
}

impl IndexSampler {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            drawn: 0,
            swapped: HashMap::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.len - self.drawn
    }

    pub fn draw(&mut self, rng: &mut Prng) -> Option<usize> {
        if self.drawn >= self.len {
            return None;
        }
        let i = self.drawn;
        let j = rng.gen_range_usize(i, self.len);
        let at_i = self.swapped.get(&i).copied().unwrap_or(i);
        let at_j = self.swapped.get(&j).copied().unwrap_or(j);
        self.swapped.insert(j, at_i);
        self.swapped.remove(&i);
        self.drawn += 1;
        Some(at_j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Prng::new(7);
        let mut b = Prng::new(7);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn zero_seed_is_usable() {
        let mut rng = Prng::new(0);
        assert_ne!(rng.next_u64(), 0);
    }

    #[test]
    fn ranges_are_respected() {
        let mut rng = Prng::new(3);
        for _ in 0..1000 {
            let x = rng.gen_range_f64(-0.5, 0.5);
            assert!((-0.5..0.5).contains(&x));
            let k = rng.gen_range_usize(3, 9);
            assert!((3..9).contains(&k));
        }
        assert_eq!(rng.gen_range_usize(4, 4), 4);
    }

    #[test]
    fn permutation_contains_every_index_once() {
        let mut rng = Prng::new(11);
        let mut p = rng.permutation(50);
        p.sort_unstable();
        assert_eq!(p, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn index_sampler_draws_distinct_indices_until_exhausted() {
        let mut rng = Prng::new(5);
        let mut sampler = IndexSampler::new(40);
        let mut seen = Vec::new();
        while let Some(i) = sampler.draw(&mut rng) {
            seen.push(i);
        }
        assert_eq!(sampler.remaining(), 0);
        seen.sort_unstable();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());
    }
}
