//! Embedding of short byte strings into secp256k1 points
//!
//! The data is written into the x-coordinate of a compressed point:
//!
//! ```text
//! tag (0x02|0x03) || len || data || random fill
//! ```
//!
//! The random fill is redrawn until the x-coordinate lies on the curve,
//! which succeeds for about half of all candidates. A leading length
//! byte of at most [`EMBED_CAPACITY`] keeps the coordinate far below the
//! field modulus.

use crate::{Error, Result};
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    AffinePoint, EncodedPoint, ProjectivePoint,
};
use rand::{CryptoRng, RngCore};

/// Maximum number of bytes a single point can carry
pub const EMBED_CAPACITY: usize = 30;

const COMPRESSED_LEN: usize = 33;

/// Each attempt fails with probability ~1/2
const MAX_ATTEMPTS: usize = 256;

/// Map `data` to a curve point that [`extract`] inverts
pub fn embed<R: RngCore + CryptoRng>(data: &[u8], rng: &mut R) -> Result<ProjectivePoint> {
    if data.len() > EMBED_CAPACITY {
        return Err(Error::KeyTooLarge {
            len: data.len(),
            capacity: EMBED_CAPACITY,
        });
    }

    let mut candidate = [0u8; COMPRESSED_LEN];
    for _ in 0..MAX_ATTEMPTS {
        rng.fill_bytes(&mut candidate);
        candidate[0] = 0x02 | (candidate[0] & 1);
        candidate[1] = data.len() as u8;
        candidate[2..2 + data.len()].copy_from_slice(data);

        let Ok(encoded) = EncodedPoint::from_bytes(candidate) else {
            continue;
        };
        if let Some(affine) = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        {
            return Ok(ProjectivePoint::from(affine));
        }
    }

    Err(Error::Crypto("no curve point found for embedding".into()))
}

/// Recover the bytes carried by an embedded point
pub fn extract(point: &ProjectivePoint) -> Result<Vec<u8>> {
    let encoded = point.to_affine().to_encoded_point(true);
    let bytes = encoded.as_bytes();
    if bytes.len() != COMPRESSED_LEN {
        return Err(Error::DecodeFailed("point at infinity carries no data".into()));
    }

    let len = bytes[1] as usize;
    if len > EMBED_CAPACITY {
        return Err(Error::DecodeFailed(format!(
            "embedded length {} exceeds capacity {}",
            len, EMBED_CAPACITY
        )));
    }

    Ok(bytes[2..2 + len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_embed_extract_all_lengths() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for len in 0..=EMBED_CAPACITY {
            let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
            let point = embed(&data, &mut rng).unwrap();
            assert_eq!(extract(&point).unwrap(), data, "length {}", len);
        }
    }

    #[test]
    fn test_embed_is_randomized() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let a = embed(b"same", &mut rng).unwrap();
        let b = embed(b"same", &mut rng).unwrap();
        assert_ne!(a, b);
        assert_eq!(extract(&a).unwrap(), extract(&b).unwrap());
    }

    #[test]
    fn test_embed_rejects_oversized() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let result = embed(&[0u8; EMBED_CAPACITY + 1], &mut rng);
        assert!(matches!(
            result,
            Err(Error::KeyTooLarge { len: 31, capacity: EMBED_CAPACITY })
        ));
    }

    #[test]
    fn test_extract_identity_fails() {
        assert!(matches!(
            extract(&ProjectivePoint::IDENTITY),
            Err(Error::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_extract_generator_fails() {
        // The x-coordinate of G starts with 0x79, far beyond any valid length
        assert!(matches!(
            extract(&ProjectivePoint::GENERATOR),
            Err(Error::DecodeFailed(_))
        ));
    }
}
