//! Permutations of ciphertext batches

use crate::Error;
use rand::{distributions::Distribution, seq::SliceRandom, Rng};
use std::{convert::TryFrom, ops::Deref};

/// A permutation: applying it to `v` yields `w` with `w[i] = v[self[i]]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permutation(Vec<usize>);

impl Permutation {
    /// Creates a new identity permutation
    pub fn identity(n: usize) -> Self {
        Self((0..n).collect())
    }

    /// Creates a permutation equivalent to undoing this permutation
    pub fn inverse(&self) -> Self {
        let mut v = vec![0; self.len()];
        for (i, &p) in self.iter().enumerate() {
            v[p] = i;
        }
        Self(v)
    }

    /// Applies the permutation in place, following its cycles
    pub fn apply_to<T>(&self, slice: &mut [T]) {
        let mut placed = vec![false; self.len()];

        while let Some(start) = placed.iter().position(|&b| !b) {
            let mut i = start;
            loop {
                let p = self[i];
                placed[i] = true;
                if p == start {
                    break;
                }
                slice.swap(i, p);
                i = p;
            }
        }
    }

    /// Returns a permuted copy of a slice
    pub fn permuted<T: Clone>(&self, slice: &[T]) -> Vec<T> {
        self.iter().map(|&p| slice[p].clone()).collect()
    }
}

impl Deref for Permutation {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl TryFrom<Vec<usize>> for Permutation {
    type Error = Error;

    fn try_from(v: Vec<usize>) -> Result<Self, Error> {
        let mut seen = vec![false; v.len()];
        for &p in v.iter() {
            match seen.get_mut(p) {
                Some(s) if !*s => *s = true,
                _ => return Err(Error::InvalidPermutation),
            }
        }
        Ok(Self(v))
    }
}

/// A distribution that produces uniformly random permutations of the given
/// size
pub struct Shuffles(pub usize);

impl Distribution<Permutation> for Shuffles {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Permutation {
        let mut v: Vec<_> = (0..self.0).collect();
        v.shuffle(rng);
        Permutation(v)
    }
}

#[cfg(test)]
mod tests {
    use super::{Permutation, Shuffles};
    use rand::{thread_rng, Rng};
    use std::convert::TryFrom;

    #[test]
    fn permutation_from_vector_accepts_only_valid_permutations() {
        assert!(Permutation::try_from(vec![3, 2, 4, 1, 0]).is_ok());
        assert!(Permutation::try_from(vec![3, 2, 4, 3, 0]).is_err());
        assert!(Permutation::try_from(vec![3, 2, 5, 1, 0]).is_err());
    }

    #[test]
    fn applying_in_place_matches_permuted_copy() {
        let p = thread_rng().sample(&Shuffles(12));
        let v: Vec<_> = (100..112).collect();
        let mut w = v.clone();
        p.apply_to(&mut w);
        assert_eq!(w, p.permuted(&v));
        for i in 0..12 {
            assert_eq!(w[i], v[p[i]]);
        }
    }

    #[test]
    fn permutation_inverse_undoes_it() {
        let p = Permutation::try_from(vec![3, 2, 4, 1, 0]).unwrap();
        let v = vec!['a', 'b', 'c', 'd', 'e'];
        let w = p.permuted(&v);
        assert_eq!(p.inverse().permuted(&w), v);
        assert_eq!(p.inverse().inverse(), p);
        assert_eq!(Permutation::identity(5).permuted(&v), v);
    }

    #[test]
    fn random_shuffles_are_permutations() {
        let mut p: Vec<usize> = thread_rng().sample(&Shuffles(10)).to_vec();
        p.sort();
        assert_eq!(p, (0..10).collect::<Vec<_>>());
    }
}
