//! Differential privacy noise

use crate::{Error, Result};

fn laplace_pdf(x: f64, mean: f64, b: f64) -> f64 {
    (-(x - mean).abs() / b).exp() / (2.0 * b)
}

/// Builds a table of `n` noise values following a discretized Laplace
/// distribution of scale `b` (`sensitivity / epsilon`)
///
/// Walking `x = 0, 1, 2, ...`, each value is repeated `ceil(pdf(x) / quanta)`
/// times with both signs, so the table only depends on its parameters. With a
/// non-zero `limit` the walk starts over at 0 once `x` exceeds it.
pub fn generate_noise_values(
    n: usize,
    mean: f64,
    b: f64,
    quanta: f64,
    limit: u64,
) -> Result<Vec<i64>> {
    if b.is_nan() || b <= 0.0 {
        return Err(Error::InvalidParameter("noise scale must be positive"));
    }
    if quanta.is_nan() || quanta <= 0.0 {
        return Err(Error::InvalidParameter("noise quanta must be positive"));
    }

    let mut noise = Vec::with_capacity(n);
    let mut x = 0u64;
    while noise.len() < n {
        let rep = (laplace_pdf(x as f64, mean, b) / quanta).ceil() as usize;
        for _ in 0..rep.max(1) {
            noise.push(x as i64);
            if x != 0 {
                noise.push(-(x as i64));
            }
            if noise.len() >= n {
                break;
            }
        }
        x = if limit > 0 && x >= limit { 0 } else { x + 1 };
    }
    noise.truncate(n);
    Ok(noise)
}

#[cfg(test)]
mod tests {
    use super::generate_noise_values;

    #[test]
    fn noise_table_follows_the_distribution() {
        assert!(generate_noise_values(0, 0.0, 1.0, 0.005, 0)
            .unwrap()
            .is_empty());

        let noise = generate_noise_values(500, 0.0, 1.0, 0.005, 0).unwrap();
        assert_eq!(noise.len(), 500);
        assert!(noise[..100].iter().all(|&x| x == 0));
        let ones: Vec<i64> = (0..19).flat_map(|_| vec![1, -1]).collect();
        assert_eq!(noise[100..138], ones[..]);
    }

    #[test]
    fn noise_stays_within_the_limit() {
        let noise = generate_noise_values(1000, 0.0, 10.0, 0.1, 3).unwrap();
        assert_eq!(noise.len(), 1000);
        assert!(noise.iter().all(|x| x.abs() <= 3));
    }

    #[test]
    fn bad_parameters_are_rejected() {
        assert!(generate_noise_values(10, 0.0, 0.0, 0.1, 0).is_err());
        assert!(generate_noise_values(10, 0.0, 1.0, -1.0, 0).is_err());
        assert!(generate_noise_values(10, 0.0, f64::NAN, 0.1, 0).is_err());
    }
}
