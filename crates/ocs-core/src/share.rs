//! Threshold share algebra
//!
//! Shares are evaluations `f(i + 1)` of a degree `t - 1` polynomial whose
//! constant term is the aggregate secret. Commitments `a_j * G` let anyone
//! check a share, and Lagrange interpolation in the exponent recombines
//! `t` partial shares without ever materializing the secret.

use crate::types::{CommitmentPolynomial, DistKeyShare, NodeIndex, PartialShare};
use crate::{Error, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

fn evaluation_point(index: NodeIndex) -> Scalar {
    Scalar::from(index as u64) + Scalar::ONE
}

impl CommitmentPolynomial {
    /// Evaluate the committed polynomial in the exponent at `index + 1`
    pub fn eval(&self, index: NodeIndex) -> ProjectivePoint {
        let x = evaluation_point(index);
        self.commits
            .iter()
            .rev()
            .fold(ProjectivePoint::IDENTITY, |acc, commit| acc * x + *commit)
    }

    /// Aggregate public key `X`
    pub fn public_key(&self) -> ProjectivePoint {
        self.commits
            .first()
            .copied()
            .unwrap_or(ProjectivePoint::IDENTITY)
    }

    /// Number of shares needed to interpolate
    pub fn threshold(&self) -> usize {
        self.commits.len()
    }

    /// Check `secret * G == eval(index)` in constant time
    pub fn check(&self, share: &DistKeyShare) -> bool {
        let expected = ProjectivePoint::GENERATOR * share.secret;
        expected.ct_eq(&self.eval(share.index)).into()
    }
}

impl DistKeyShare {
    /// Partial re-encryption `secret * (U + Xc)`
    pub fn reencrypt(&self, u: &ProjectivePoint, xc: &ProjectivePoint) -> PartialShare {
        PartialShare {
            index: self.index,
            value: (*u + *xc) * self.secret,
        }
    }
}

/// Interpolate the first `threshold` partial shares at zero.
///
/// Every share index must be unique across the whole slice. Returns
/// `Σ λ_i * value_i`, which equals `x * (U + Xc)` when the shares are
/// consistent.
#[instrument(skip(shares), fields(count = shares.len()))]
pub fn recover_commit(shares: &[PartialShare], threshold: usize) -> Result<ProjectivePoint> {
    if threshold == 0 {
        return Err(Error::InvalidConfig("threshold must be at least 1".into()));
    }
    if shares.len() < threshold {
        return Err(Error::InsufficientShares {
            required: threshold,
            actual: shares.len(),
        });
    }

    let mut seen = HashSet::with_capacity(shares.len());
    for share in shares {
        if !seen.insert(share.index) {
            return Err(Error::DuplicateShareIndex(share.index));
        }
    }

    let chosen = &shares[..threshold];
    let xs: Vec<Scalar> = chosen.iter().map(|s| evaluation_point(s.index)).collect();

    let mut result = ProjectivePoint::IDENTITY;
    for (i, share) in chosen.iter().enumerate() {
        let lambda = lagrange_coefficient(i, &xs)?;
        result += share.value * lambda;
    }

    debug!(threshold, "Recovered commit from partial shares");
    Ok(result)
}

/// λ_i = Π_{j≠i} x_j / (x_j - x_i)
fn lagrange_coefficient(i: usize, xs: &[Scalar]) -> Result<Scalar> {
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for (j, xj) in xs.iter().enumerate() {
        if j == i {
            continue;
        }
        numerator *= *xj;
        denominator *= *xj - xs[i];
    }

    let inverse: Option<Scalar> = denominator.invert().into();
    inverse
        .map(|inv| numerator * inv)
        .ok_or_else(|| Error::Crypto("degenerate evaluation points".into()))
}

/// Trusted dealer producing `n` shares of a fresh random secret.
///
/// Stands in for the distributed key generation when setting up local
/// deployments and tests. The secret itself is dropped before returning.
#[instrument]
pub fn deal(n: usize, threshold: usize) -> Result<(CommitmentPolynomial, Vec<DistKeyShare>)> {
    if threshold == 0 {
        return Err(Error::InvalidConfig("threshold must be at least 1".into()));
    }
    if threshold > n {
        return Err(Error::InvalidConfig(
            "threshold cannot exceed number of nodes".into(),
        ));
    }

    let mut rng = OsRng;
    let coefficients: Vec<Scalar> = (0..threshold).map(|_| Scalar::random(&mut rng)).collect();
    let commits = coefficients
        .iter()
        .map(|coef| ProjectivePoint::GENERATOR * *coef)
        .collect();

    let shares = (0..n)
        .map(|index| DistKeyShare {
            index,
            secret: evaluate_polynomial(&coefficients, evaluation_point(index)),
        })
        .collect();

    debug!(n, threshold, "Dealt key shares");
    Ok((CommitmentPolynomial { commits }, shares))
}

fn evaluate_polynomial(coefficients: &[Scalar], x: Scalar) -> Scalar {
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, coef| acc * x + *coef)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_key, encode_key};
    use crate::types::KeyPair;

    fn partial_shares(
        shares: &[DistKeyShare],
        u: &ProjectivePoint,
        xc: &ProjectivePoint,
    ) -> Vec<PartialShare> {
        shares.iter().map(|s| s.reencrypt(u, xc)).collect()
    }

    #[test]
    fn test_dealt_shares_match_commitments() {
        let (poly, shares) = deal(5, 3).unwrap();
        assert_eq!(poly.threshold(), 3);
        for share in &shares {
            assert!(poly.check(share));
        }
    }

    #[test]
    fn test_tampered_share_fails_check() {
        let (poly, mut shares) = deal(3, 2).unwrap();
        shares[1].secret += Scalar::ONE;
        assert!(!poly.check(&shares[1]));

        shares[0].index = 2;
        assert!(!poly.check(&shares[0]));
    }

    #[test]
    fn test_check_handles_largest_index() {
        let (poly, _) = deal(3, 2).unwrap();
        let share = DistKeyShare {
            index: usize::MAX,
            secret: Scalar::ONE,
        };
        assert!(!poly.check(&share));
        assert_eq!(
            poly.eval(usize::MAX),
            poly.commits[0] + poly.commits[1] * (Scalar::from(usize::MAX as u64) + Scalar::ONE)
        );
    }

    #[test]
    fn test_recover_commit_matches_public_key() {
        // Partial shares of the generator interpolate to X
        let (poly, shares) = deal(4, 3).unwrap();
        let commits: Vec<PartialShare> = shares
            .iter()
            .map(|s| PartialShare {
                index: s.index,
                value: ProjectivePoint::GENERATOR * s.secret,
            })
            .collect();

        assert_eq!(recover_commit(&commits, 3).unwrap(), poly.public_key());
        assert_eq!(recover_commit(&commits[1..], 3).unwrap(), poly.public_key());
    }

    #[test]
    fn test_onchain_five_nodes() {
        let (poly, shares) = deal(5, 3).unwrap();
        let x = poly.public_key();
        let reader = KeyPair::random();
        let key = b"0123456789abcdef";

        let encoded = encode_key(&x, key).unwrap();
        let partials = partial_shares(&shares, &encoded.u, &reader.public);

        let xhat_enc = recover_commit(&partials[2..], 3).unwrap();
        let decoded = decode_key(&x, &encoded.c, &xhat_enc, &reader.secret).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_undersized_set_does_not_reveal_key() {
        let (poly, shares) = deal(3, 2).unwrap();
        let x = poly.public_key();
        let reader = KeyPair::random();
        let key = b"Very secret Message to be encr";

        let encoded = encode_key(&x, key).unwrap();
        let partials = partial_shares(&shares, &encoded.u, &reader.public);

        assert!(matches!(
            recover_commit(&partials[..1], 2),
            Err(Error::InsufficientShares { required: 2, actual: 1 })
        ));

        // Forcing interpolation with a single share yields the wrong point
        let wrong = recover_commit(&partials[..1], 1).unwrap();
        match decode_key(&x, &encoded.c, &wrong, &reader.secret) {
            Ok(bytes) => assert_ne!(bytes, key.to_vec()),
            Err(e) => assert!(matches!(e, Error::DecodeFailed(_))),
        }
    }

    #[test]
    fn test_duplicate_indices_fail() {
        let share = PartialShare {
            index: 1,
            value: ProjectivePoint::GENERATOR,
        };
        assert!(matches!(
            recover_commit(&[share, share], 2),
            Err(Error::DuplicateShareIndex(1))
        ));
    }

    #[test]
    fn test_deal_validates_parameters() {
        assert!(deal(3, 0).is_err());
        assert!(deal(2, 3).is_err());
        assert!(deal(1, 1).is_ok());
    }

    #[test]
    fn test_lagrange_coefficients_sum_to_one() {
        let xs: Vec<Scalar> = (1..=3u64).map(Scalar::from).collect();
        let sum = (0..3)
            .map(|i| lagrange_coefficient(i, &xs).unwrap())
            .fold(Scalar::ZERO, |acc, l| acc + l);
        assert_eq!(sum, Scalar::ONE);
    }
}
