use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

/// Composite index of the fiducial pair `(prep, effect)`.
pub fn pair_index(prep: usize, effect: usize, n_effect: usize) -> usize {
    prep * n_effect + effect
}

/// Inverse of [`pair_index`].
pub fn pair_from_index(index: usize, n_effect: usize) -> (usize, usize) {
    let prep = index / n_effect;
    (prep, index - prep * n_effect)
}

/// Exact binomial coefficient `n choose m`.
pub fn choose(n: usize, m: usize) -> BigUint {
    if m > n {
        return BigUint::zero();
    }
    let m = m.min(n - m);
    // Each partial product is itself a binomial coefficient, so the division is exact.
    (1..=m).fold(BigUint::one(), |acc, i| acc * BigUint::from(n - m + i) / BigUint::from(i))
}

/// `n choose m` if it fits in a `usize`.
pub fn choose_usize(n: usize, m: usize) -> Option<usize> {
    choose(n, m).to_usize()
}

/// Iterates all `length`-subsets of `0..n` in lexicographic order.
#[derive(Clone, Debug)]
pub struct LexCombinations {
    n: usize,
    current: Option<Vec<usize>>,
}

impl LexCombinations {
    pub fn new(n: usize, length: usize) -> Self {
        let current = if length <= n {
            Some((0..length).collect())
        } else {
            None
        };
        Self { n, current }
    }
}

impl Iterator for LexCombinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        let k = current.len();

        // Advance the rightmost entry that still has room.
        let mut succ = current.clone();
        if let Some(i) = (0..k).rev().find(|&i| succ[i] < self.n - k + i) {
            succ[i] += 1;
            for j in i + 1..k {
                succ[j] = succ[j - 1] + 1;
            }
            self.current = Some(succ);
        }
        Some(current)
    }
}

/// The combination at position `rank` in the lexicographic enumeration of
/// `length`-subsets of `0..n`, or `None` if `rank` is out of range.
pub fn unrank_combination(n: usize, length: usize, rank: &BigUint) -> Option<Vec<usize>> {
    if *rank >= choose(n, length) {
        return None;
    }
    let mut rank = rank.clone();
    let mut combo = Vec::with_capacity(length);
    let mut x = 0;
    for pos in 0..length {
        loop {
            // Number of combinations whose entry at `pos` is `x`.
            let count = choose(n - x - 1, length - pos - 1);
            if rank < count {
                break;
            }
            rank -= count;
            x += 1;
        }
        combo.push(x);
        x += 1;
    }
    Some(combo)
}
