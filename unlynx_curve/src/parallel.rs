//! Data parallelism over fixed-size chunks

use rayon::prelude::*;

/// Controls how batch operations are spread over threads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parallelism {
    /// Whether batches run in parallel at all
    pub enabled: bool,
    /// Number of elements handled by one task
    pub chunk: usize,
}

impl Default for Parallelism {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk: 100,
        }
    }
}

impl Parallelism {
    /// A configuration that runs everything on the calling thread
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn split(&self, len: usize) -> Option<usize> {
        let chunk = self.chunk.max(1);
        if self.enabled && len > chunk {
            Some(chunk)
        } else {
            None
        }
    }

    /// Maps every element, keeping the input order
    pub fn map<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        match self.split(items.len()) {
            Some(chunk) => items
                .par_chunks(chunk)
                .map(|c| c.iter().map(&f).collect::<Vec<_>>())
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect(),
            None => items.iter().map(f).collect(),
        }
    }

    /// Maps every element together with its index, keeping the input order
    pub fn map_indexed<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(usize, &T) -> U + Sync + Send,
    {
        let indexed: Vec<_> = items.iter().enumerate().collect();
        self.map(&indexed, |(i, x)| f(*i, *x))
    }

    /// Checks a predicate on every element
    pub fn all<T, F>(&self, items: &[T], f: F) -> bool
    where
        T: Sync,
        F: Fn(&T) -> bool + Sync + Send,
    {
        self.map(items, f).into_iter().all(|b| b)
    }
}

#[cfg(test)]
mod tests {
    use super::Parallelism;

    #[test]
    fn parallel_and_sequential_maps_agree() {
        let v: Vec<u64> = (0..1000).collect();
        let par = Parallelism {
            enabled: true,
            chunk: 7,
        };
        let a = par.map(&v, |x| x * x);
        let b = Parallelism::sequential().map(&v, |x| x * x);
        assert_eq!(a, b);
        let c = par.map_indexed(&v, |i, x| i as u64 + x);
        assert_eq!(c[999], 1998);
    }

    #[test]
    fn all_sees_every_element() {
        let v: Vec<u32> = (0..250).collect();
        let par = Parallelism {
            enabled: true,
            chunk: 10,
        };
        assert!(par.all(&v, |&x| x < 250));
        assert!(!par.all(&v, |&x| x != 123));
    }
}
