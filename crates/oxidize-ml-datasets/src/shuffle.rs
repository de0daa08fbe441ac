use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// A random ordering of `0..n`.
pub fn permutation(n: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_permutation_is_complete() {
        let mut rng = StdRng::seed_from_u64(113);
        let mut p = permutation(50, &mut rng);
        p.sort_unstable();
        assert_eq!(p, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_permutation_seeded() {
        let a = permutation(20, &mut StdRng::seed_from_u64(1));
        let b = permutation(20, &mut StdRng::seed_from_u64(1));
        let c = permutation(20, &mut StdRng::seed_from_u64(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_successive_draws_differ() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = permutation(20, &mut rng);
        let second = permutation(20, &mut rng);
        assert_ne!(first, second);
        assert!(permutation(0, &mut rng).is_empty());
    }
}
