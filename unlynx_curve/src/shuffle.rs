//! Permutation and re-randomization of ciphertext batches

use crate::{
    cipher::{CipherText, CipherVector},
    parallel::Parallelism,
    perm::{Permutation, Shuffles},
    Result,
};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
};
use rand::{rngs::StdRng, CryptoRng, Rng, SeedableRng};
use std::{fs, iter, path::Path};
use tracing::{debug, info};

const G: &RistrettoBasepointTable = &RISTRETTO_BASEPOINT_TABLE;

/// Number of lines in a precomputed randomization pool
pub const PRECOMPUTED_LINES: usize = 10;

/// One line of precomputed shuffle randomization: `cipher_v[i] = (s[i]·G,
/// s[i]·H)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherVectorScalar {
    /// Precomputed encryptions of zero
    pub cipher_v: CipherVector,
    /// Their blinding factors
    pub s: Vec<Scalar>,
}

/// Shuffles a batch of rows
///
/// Row `i` of the output is row `pi[i]` of the input re-randomized by
/// `beta[pi[i]]`. Randomizers come from a random line of the precomputed pool
/// when the line is wide enough for the row, and are drawn fresh otherwise.
pub fn shuffle_sequence<R: Rng + CryptoRng>(
    input: &[CipherVector],
    h: &RistrettoPoint,
    precomputed: Option<&[CipherVectorScalar]>,
    rng: &mut R,
    par: &Parallelism,
) -> (Vec<CipherVector>, Permutation, Vec<Vec<Scalar>>) {
    let pool = precomputed.filter(|p| !p.is_empty());

    let mut beta = Vec::with_capacity(input.len());
    let mut points: Vec<Option<&[CipherText]>> = Vec::with_capacity(input.len());
    for row in input.iter() {
        let width = row.len();
        let line = pool
            .map(|p| &p[rng.gen_range(0, p.len())])
            .filter(|l| l.s.len() >= width && l.cipher_v.len() >= width);
        match line {
            Some(l) => {
                beta.push(l.s[..width].to_vec());
                points.push(Some(&l.cipher_v[..width]));
            }
            None => {
                beta.push(iter::repeat_with(|| Scalar::random(rng)).take(width).collect());
                points.push(None);
            }
        }
    }

    let pi = rng.sample(&Shuffles(input.len()));
    let output = par.map(&pi[..], |&p| match points[p] {
        Some(pts) => input[p]
            .iter()
            .zip(pts.iter())
            .map(|(ct, z)| ct + z)
            .collect(),
        None => input[p]
            .iter()
            .zip(beta[p].iter())
            .map(|(ct, b)| ct.rerandomize(h, b))
            .collect(),
    });

    (output, pi, beta)
}

/// Builds a pool of `nbr_lines` precomputed randomization lines
pub fn create_precomputed_randomize<R: Rng + CryptoRng>(
    h: &RistrettoPoint,
    rng: &mut R,
    line_size: usize,
    nbr_lines: usize,
    par: &Parallelism,
) -> Vec<CipherVectorScalar> {
    let scalars: Vec<Vec<Scalar>> = (0..nbr_lines)
        .map(|_| iter::repeat_with(|| Scalar::random(rng)).take(line_size).collect())
        .collect();
    par.map(&scalars, |s| CipherVectorScalar {
        cipher_v: s
            .iter()
            .map(|s| CipherText::new(G * s, h * s))
            .collect(),
        s: s.clone(),
    })
}

fn seeded_pool(
    survey_secret: &Scalar,
    h: &RistrettoPoint,
    line_size: usize,
    par: &Parallelism,
) -> Vec<CipherVectorScalar> {
    let mut rng = StdRng::from_seed(survey_secret.to_bytes());
    create_precomputed_randomize(h, &mut rng, line_size * 2, PRECOMPUTED_LINES, par)
}

/// Builds the pool for a survey and writes it to `path`
pub fn precompute_for_shuffling(
    path: &Path,
    survey_secret: &Scalar,
    h: &RistrettoPoint,
    line_size: usize,
    par: &Parallelism,
) -> Result<Vec<CipherVectorScalar>> {
    info!(path = %path.display(), line_size, "precomputing shuffle randomization");
    let pool = seeded_pool(survey_secret, h, line_size, par);
    fs::write(path, unlynx_serde::serialize(&pool)?)?;
    Ok(pool)
}

/// Gets the pool for a survey
///
/// With `app_flag` set the pool is read from `path` if the file exists, and
/// generated and written there otherwise. Without it the pool is only kept in
/// memory.
pub fn precomputation_writing_for_shuffling(
    app_flag: bool,
    path: &Path,
    survey_secret: &Scalar,
    h: &RistrettoPoint,
    line_size: usize,
    par: &Parallelism,
) -> Result<Vec<CipherVectorScalar>> {
    if !app_flag {
        return Ok(seeded_pool(survey_secret, h, line_size, par));
    }
    match read_precomputed_file(path)? {
        Some(pool) => Ok(pool),
        None => precompute_for_shuffling(path, survey_secret, h, line_size, par),
    }
}

/// Reads a pool from a file, if the file exists
pub fn read_precomputed_file(path: &Path) -> Result<Option<Vec<CipherVectorScalar>>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "reading precomputed shuffle randomization");
    let bytes = fs::read(path)?;
    Ok(Some(unlynx_serde::deserialize(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cipher::{decrypt_int_vector, encrypt_int_vector},
        keys::PrivateKey,
    };
    use rand::thread_rng;
    use std::env;

    fn sorted_plaintexts(sk: &PrivateKey, rows: &[CipherVector]) -> Vec<Vec<i64>> {
        let mut v: Vec<_> = rows
            .iter()
            .map(|r| decrypt_int_vector(sk, r).unwrap())
            .collect();
        v.sort();
        v
    }

    #[test]
    fn shuffling_preserves_the_multiset_of_rows() {
        let mut rng = thread_rng();
        let par = Parallelism::default();
        let sk = PrivateKey::random(&mut rng);
        let pk = sk.public_key();
        let rows: Vec<_> = (0..10)
            .map(|i| encrypt_int_vector(&pk, &[i, i + 1]))
            .collect();

        let (shuffled, pi, beta) = shuffle_sequence(&rows, pk.point(), None, &mut rng, &par);
        assert_eq!(sorted_plaintexts(&sk, &rows), sorted_plaintexts(&sk, &shuffled));
        for (i, &p) in pi.iter().enumerate() {
            assert_eq!(shuffled[i][0], rows[p][0].rerandomize(pk.point(), &beta[p][0]));
        }
    }

    #[test]
    fn precomputed_pool_is_used_when_wide_enough() {
        let mut rng = thread_rng();
        let par = Parallelism::sequential();
        let sk = PrivateKey::random(&mut rng);
        let pk = sk.public_key();
        let rows: Vec<_> = (0..4)
            .map(|i| encrypt_int_vector(&pk, &[i, 2 * i, 3 * i]))
            .collect();

        let pool = create_precomputed_randomize(pk.point(), &mut rng, 6, 3, &par);
        let (shuffled, pi, beta) =
            shuffle_sequence(&rows, pk.point(), Some(&pool), &mut rng, &par);
        assert_eq!(sorted_plaintexts(&sk, &rows), sorted_plaintexts(&sk, &shuffled));
        for b in beta.iter() {
            assert!(pool.iter().any(|l| l.s[..3] == b[..]));
        }
        for (i, &p) in pi.iter().enumerate() {
            assert_eq!(shuffled[i][2], rows[p][2].rerandomize(pk.point(), &beta[p][2]));
        }

        let narrow = create_precomputed_randomize(pk.point(), &mut rng, 2, 3, &par);
        let (shuffled, _, beta) =
            shuffle_sequence(&rows, pk.point(), Some(&narrow), &mut rng, &par);
        assert_eq!(sorted_plaintexts(&sk, &rows), sorted_plaintexts(&sk, &shuffled));
        assert!(beta.iter().all(|b| b.len() == 3));
    }

    #[test]
    fn precomputed_pool_survives_the_file() {
        let mut rng = thread_rng();
        let par = Parallelism::default();
        let h = RistrettoPoint::random(&mut rng);
        let secret = Scalar::random(&mut rng);
        let path = env::temp_dir().join(format!("unlynx-pool-{}.bin", rng.gen::<u64>()));

        assert!(read_precomputed_file(&path).unwrap().is_none());
        let written =
            precomputation_writing_for_shuffling(true, &path, &secret, &h, 4, &par).unwrap();
        assert_eq!(written.len(), PRECOMPUTED_LINES);
        assert_eq!(written[0].s.len(), 8);
        let read = read_precomputed_file(&path).unwrap().unwrap();
        assert_eq!(read, written);
        let again =
            precomputation_writing_for_shuffling(true, &path, &Scalar::one(), &h, 4, &par)
                .unwrap();
        assert_eq!(again, written);
        fs::remove_file(&path).unwrap();

        let in_memory =
            precomputation_writing_for_shuffling(false, &path, &secret, &h, 4, &par).unwrap();
        assert_eq!(in_memory, written);
        assert!(!path.exists());
    }
}
