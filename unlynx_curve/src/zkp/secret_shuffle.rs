//! Verifiable secret shuffle of homomorphic encryptions

// [Gr05] Jens Groth: 'A Verifiable Secret Shuffle of Homomorphic Encryptions',
//          Cryptology ePrint Archive, Report 2005/246, 2005.

use super::{known_shuffle, TranscriptProtocol, TranscriptRngProtocol};
use crate::{cipher::CipherText, perm::Permutation, Error, Result};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
};
use merlin::Transcript;
use rand::thread_rng;

const G: &RistrettoBasepointTable = &RISTRETTO_BASEPOINT_TABLE;

/// Non-interactive proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    skc: known_shuffle::Proof,
    c: RistrettoPoint,
    cd: RistrettoPoint,
    ed: CipherText,
    f: Vec<Scalar>,
    z: Scalar,
}

/// Public parameters
#[derive(Copy, Clone)]
pub struct Publics<'a> {
    /// Public key
    pub h: &'a RistrettoPoint,
    /// Original
    pub e0: &'a [CipherText],
    /// Shuffled: `e1[i] = e0[pi[i]]` re-randomized by `r[i]`
    pub e1: &'a [CipherText],
}

/// Secret parameters
#[derive(Copy, Clone)]
pub struct Secrets<'a> {
    /// Permutation
    pub pi: &'a Permutation,
    /// Re-randomization factors, in output order
    pub r: &'a [Scalar],
}

fn commit_publics(transcript: &mut Transcript, publics: &Publics) {
    transcript.domain_sep(b"secret_shuffle");
    transcript.commit_point(b"h", publics.h);
    transcript.commit_ciphers(b"e0", publics.e0);
    transcript.commit_ciphers(b"e1", publics.e1);
}

fn domain(l: &Scalar, t: &[Scalar]) -> Vec<Scalar> {
    t.iter()
        .enumerate()
        .map(|(i, t)| l * Scalar::from((i + 1) as u64) + t)
        .collect()
}

impl Proof {
    /// Generates a non-interactive zero-knowledge proof of a secret shuffle
    pub fn create(transcript: &mut Transcript, publics: Publics, secrets: Secrets) -> Result<Self> {
        let n = publics.e0.len();
        if n == 0 {
            return Err(Error::Empty);
        }
        if publics.e1.len() != n || secrets.pi.len() != n || secrets.r.len() != n {
            return Err(Error::LengthMismatch(n, publics.e1.len()));
        }

        commit_publics(transcript, &publics);
        let com = transcript.challenge_pedersen(b"com", *publics.h, n);

        let rekey_rng = |t: &Transcript| {
            t.build_rng()
                .commit_permutation(b"pi", secrets.pi)
                .commit_scalars(b"r", secrets.r)
                .finalize(&mut thread_rng())
        };
        let mut rng = rekey_rng(&*transcript);

        let gh = CipherText::new(G.basepoint(), *publics.h);

        let p1: Vec<_> = secrets
            .pi
            .iter()
            .map(|p| Scalar::from((p + 1) as u64))
            .collect();
        let (c, r) = com.commit_to(&p1, &mut rng);
        transcript.commit_point(b"c", &c);

        let mut rng = rekey_rng(&*transcript);

        let d: Vec<_> = (0..n).map(|_| -Scalar::random(&mut rng)).collect();
        let (cd, rd) = com.commit_to(&d, &mut rng);
        transcript.commit_point(b"cd", &cd);

        let ed = gh * rd
            + d.iter()
                .zip(publics.e1.iter())
                .map(|(d, e)| e * d)
                .sum::<CipherText>();
        transcript.commit_cipher(b"ed", &ed);

        let t = transcript.challenge_scalars(b"t", n);

        let f: Vec<_> = secrets
            .pi
            .iter()
            .zip(d.iter())
            .map(|(p, d)| t[*p] - d)
            .collect();
        transcript.commit_scalars(b"f", &f);

        let z = secrets
            .pi
            .iter()
            .zip(secrets.r.iter())
            .map(|(p, r)| t[*p] * r)
            .sum::<Scalar>()
            + rd;
        transcript.commit_scalar(b"z", &z);

        let l = transcript.challenge_scalar(b"l");

        let m = domain(&l, &t);
        let commit = c * l + cd + com.commit_by(&f, &Scalar::zero());
        let rho = l * r + rd;

        let skc = known_shuffle::Proof::create(
            transcript,
            known_shuffle::Publics {
                com: &com,
                c: &commit,
                m: &m,
            },
            known_shuffle::Secrets {
                pi: secrets.pi,
                r: &rho,
            },
        );

        Ok(Self {
            skc,
            c,
            cd,
            ed,
            f,
            z,
        })
    }

    /// Verifies a non-interactive zero-knowledge proof of a secret shuffle
    pub fn verify(&self, transcript: &mut Transcript, publics: Publics) -> Result<()> {
        let n = publics.e0.len();
        if n == 0 || publics.e1.len() != n || self.f.len() != n {
            return Err(Error::BadProof);
        }

        commit_publics(transcript, &publics);
        let com = transcript.challenge_pedersen(b"com", *publics.h, n);

        let gh = CipherText::new(G.basepoint(), *publics.h);

        transcript.commit_point(b"c", &self.c);
        transcript.commit_point(b"cd", &self.cd);
        transcript.commit_cipher(b"ed", &self.ed);

        let t = transcript.challenge_scalars(b"t", n);

        transcript.commit_scalars(b"f", &self.f);
        transcript.commit_scalar(b"z", &self.z);

        let l = transcript.challenge_scalar(b"l");

        let m = domain(&l, &t);
        let commit = self.c * l + self.cd + com.commit_by(&self.f, &Scalar::zero());

        self.skc.verify(transcript, known_shuffle::Publics {
            com: &com,
            c: &commit,
            m: &m,
        })?;

        let efed = self.ed
            + publics
                .e1
                .iter()
                .zip(self.f.iter())
                .map(|(e, f)| e * f)
                .sum::<CipherText>();
        let etfd = efed
            - publics
                .e0
                .iter()
                .zip(t.iter())
                .map(|(e, t)| e * t)
                .sum::<CipherText>();

        if etfd == gh * self.z {
            Ok(())
        } else {
            Err(Error::BadProof)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{super::random_scalars, Proof, Publics, Secrets, G};
    use crate::{cipher::CipherText, perm::Shuffles, Error};
    use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
    use merlin::Transcript;
    use rand::{thread_rng, Rng};

    #[test]
    fn prove_and_verify_agree() {
        let mut rng = thread_rng();

        let h = &RistrettoPoint::random(&mut rng);
        let m = random_scalars(8, &mut rng);
        let e0: Vec<_> = m
            .iter()
            .map(|m| CipherText::encrypt_by(h, &(G * m), &Scalar::random(&mut rng)))
            .collect();
        let pi = &rng.sample(&Shuffles(8));
        let r = random_scalars(8, &mut rng);
        let e1: Vec<_> = pi
            .iter()
            .zip(r.iter())
            .map(|(&p, r)| e0[p].rerandomize(h, r))
            .collect();

        let publics = Publics {
            h,
            e0: &e0,
            e1: &e1,
        };
        let secrets = Secrets { pi, r: &r };

        let mut proof = Proof::create(&mut Transcript::new(b"test"), publics, secrets).unwrap();

        let verified = proof.verify(&mut Transcript::new(b"test"), publics);
        assert!(verified.is_ok());

        let mut e1_swapped = e1.clone();
        e1_swapped[3] = CipherText::encrypt_by(h, &(G * &m[0]), &Scalar::random(&mut rng));
        let verified = proof.verify(&mut Transcript::new(b"test"), Publics {
            e1: &e1_swapped,
            ..publics
        });
        assert!(matches!(verified, Err(Error::BadProof)));

        // break the proof
        proof.z += Scalar::one();
        let verified = proof.verify(&mut Transcript::new(b"test"), publics);
        assert!(matches!(verified, Err(Error::BadProof)));
    }

    #[test]
    fn empty_batches_cannot_be_proven() {
        let mut rng = thread_rng();
        let h = &RistrettoPoint::random(&mut rng);
        let pi = &rng.sample(&Shuffles(0));
        let publics = Publics {
            h,
            e0: &[],
            e1: &[],
        };
        let r = Proof::create(&mut Transcript::new(b"test"), publics, Secrets { pi, r: &[] });
        assert!(matches!(r, Err(Error::Empty)));
    }
}
