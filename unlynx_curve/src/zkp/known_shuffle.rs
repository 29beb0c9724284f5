//! Shuffle of known content argument

// [Gr05] Jens Groth: 'A Verifiable Secret Shuffle of Homomorphic Encryptions',
//          Cryptology ePrint Archive, Report 2005/246, 2005.

use super::{random_scalars, TranscriptProtocol, TranscriptRngProtocol};
use crate::{commit::Pedersen, perm::Permutation, Error, Result};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use merlin::Transcript;
use rand::thread_rng;

/// Non-interactive proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    cd: RistrettoPoint,
    cdd: RistrettoPoint,
    cda: RistrettoPoint,
    f: Vec<Scalar>,
    z: Scalar,
    fd: Vec<Scalar>,
    zd: Scalar,
}

/// Public parameters
#[derive(Copy, Clone)]
pub struct Publics<'a> {
    /// Commitment scheme
    pub com: &'a Pedersen,
    /// Commitment to the permuted domain
    pub c: &'a RistrettoPoint,
    /// Domain
    pub m: &'a [Scalar],
}

/// Secret parameters
#[derive(Copy, Clone)]
pub struct Secrets<'a> {
    /// Permutation
    pub pi: &'a Permutation,
    /// Blinding factor
    pub r: &'a Scalar,
}

fn commit_publics(transcript: &mut Transcript, publics: &Publics) {
    transcript.domain_sep(b"known_shuffle");
    transcript.commit_pedersen(b"com", publics.com);
    transcript.commit_point(b"c", publics.c);
    transcript.commit_scalars(b"m", publics.m);
}

impl Proof {
    /// Generates a non-interactive shuffle of known content argument
    ///
    /// The domain must not be empty.
    pub fn create(transcript: &mut Transcript, publics: Publics, secrets: Secrets) -> Self {
        commit_publics(transcript, &publics);

        let rekey_rng = |t: &Transcript| {
            t.build_rng()
                .commit_permutation(b"pi", secrets.pi)
                .commit_scalar(b"r", secrets.r)
                .finalize(&mut thread_rng())
        };
        let mut rng = rekey_rng(&*transcript);

        let n = publics.m.len();
        let m_pi = |i: usize| publics.m[secrets.pi[i]];

        // a single element has a fixed product, so its blinding must vanish
        let mut d = random_scalars(n, &mut rng);
        if n == 1 {
            d[0] = Scalar::zero();
        }

        let mut delta = Vec::with_capacity(n);
        delta.push(d[0]);
        delta.extend(random_scalars(n.saturating_sub(2), &mut rng));
        if n > 1 {
            delta.push(Scalar::zero());
        }

        let x = transcript.challenge_scalar(b"x");
        let mut a = Vec::with_capacity(n);
        let mut acc = Scalar::one();
        for i in 0..n {
            acc *= m_pi(i) - x;
            a.push(acc);
        }

        let mut rng = rekey_rng(&*transcript);
        let (cd, rd) = publics.com.commit_to(&d, &mut rng);
        transcript.commit_point(b"cd", &cd);

        let mut rng = rekey_rng(&*transcript);
        let mut dd: Vec<_> = (1..n).map(|i| -delta[i - 1] * d[i]).collect();
        dd.push(Scalar::zero());
        let (cdd, rdd) = publics.com.commit_to(&dd, &mut rng);
        transcript.commit_point(b"cdd", &cdd);

        let mut rng = rekey_rng(&*transcript);
        let mut da: Vec<_> = (1..n)
            .map(|i| delta[i] - (m_pi(i) - x) * delta[i - 1] - a[i - 1] * d[i])
            .collect();
        da.push(Scalar::zero());
        let (cda, rda) = publics.com.commit_to(&da, &mut rng);
        transcript.commit_point(b"cda", &cda);

        let e = transcript.challenge_scalar(b"e");
        let f: Vec<_> = (0..n).map(|i| e * m_pi(i) + d[i]).collect();
        let z = e * secrets.r + rd;

        let mut fd: Vec<_> = (1..n)
            .map(|i| e * da[i - 1] - delta[i - 1] * d[i])
            .collect();
        fd.push(Scalar::zero());
        let zd = e * rda + rdd;

        Self {
            cd,
            cdd,
            cda,
            f,
            z,
            fd,
            zd,
        }
    }

    /// Verifies a non-interactive shuffle of known content argument
    pub fn verify(&self, transcript: &mut Transcript, publics: Publics) -> Result<()> {
        let n = publics.m.len();
        if n == 0 || self.f.len() != n || self.fd.len() != n {
            return Err(Error::BadProof);
        }

        commit_publics(transcript, &publics);

        let x = transcript.challenge_scalar(b"x");

        transcript.commit_point(b"cd", &self.cd);
        transcript.commit_point(b"cdd", &self.cdd);
        transcript.commit_point(b"cda", &self.cda);

        let e = transcript.challenge_scalar(b"e");

        let cecd = publics.c * e + self.cd;
        publics.com.open(&cecd, &self.f, &self.z)?;
        let ceca = self.cda * e + self.cdd;
        publics.com.open(&ceca, &self.fd, &self.zd)?;

        let ex = e * x;
        let e_inv = e.invert();
        let mut ff = self.f[0] - ex;
        for i in 1..n {
            ff = (ff * (self.f[i] - ex) + self.fd[i - 1]) * e_inv;
        }
        let prod = publics.m.iter().map(|m| m - x).product::<Scalar>();
        if ff == e * prod {
            Ok(())
        } else {
            Err(Error::BadProof)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{random_scalars, Proof, Publics, Secrets};
    use crate::{commit::Pedersen, perm::Shuffles, Error};
    use curve25519_dalek::scalar::Scalar;
    use merlin::Transcript;
    use rand::{thread_rng, Rng};

    fn prove_and_verify_agree_on(n: usize) {
        let mut rng = thread_rng();

        let m = &random_scalars(n, &mut rng);
        let pi = &rng.sample(&Shuffles(n));
        let mp = pi.permuted(m);

        let com = &Pedersen::random(n, &mut rng);
        let (c, r) = com.commit_to(&mp, &mut rng);
        let publics = Publics { com, c: &c, m };
        let secrets = Secrets { pi, r: &r };

        let mut proof = Proof::create(&mut Transcript::new(b"test"), publics, secrets);

        let verified = proof.verify(&mut Transcript::new(b"test"), publics);
        assert!(verified.is_ok());

        // break the proof
        proof.z += Scalar::one();
        let verified = proof.verify(&mut Transcript::new(b"test"), publics);
        assert!(matches!(verified, Err(Error::BadProof)));
    }

    #[test]
    fn prove_and_verify_agree() {
        prove_and_verify_agree_on(8);
    }

    #[test]
    fn prove_and_verify_agree_on_tiny_domains() {
        prove_and_verify_agree_on(1);
        prove_and_verify_agree_on(2);
    }
}
