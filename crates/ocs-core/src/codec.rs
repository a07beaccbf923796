//! ElGamal encoding of a document key under the collective public key
//!
//! The writer publishes `(U, C)` with
//!
//! ```text
//! U = r * G
//! C = r * X + Embed(key)
//! ```
//!
//! The reader receives `XhatEnc = x * (U + Xc)` interpolated from partial
//! shares. Since `x * Xc = xc * X`, subtracting `xc * X` leaves `x * U = r * X`,
//! which is exactly the blinding on `C`.

use crate::embed::{embed, extract};
use crate::types::EncodedKey;
use crate::Result;
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use tracing::{debug, instrument};

/// Encode `key` under the aggregate public key `x`
#[instrument(skip_all, fields(key_len = key.len()))]
pub fn encode_key(x: &ProjectivePoint, key: &[u8]) -> Result<EncodedKey> {
    encode_key_with_rng(x, key, &mut OsRng)
}

/// Encode `key` drawing the blinding scalar and embedding fill from `rng`
pub fn encode_key_with_rng<R: RngCore + CryptoRng>(
    x: &ProjectivePoint,
    key: &[u8],
    rng: &mut R,
) -> Result<EncodedKey> {
    let key_point = embed(key, rng)?;
    let r = Scalar::random(&mut *rng);

    let u = ProjectivePoint::GENERATOR * r;
    let c = *x * r + key_point;

    debug!("Encoded document key");
    Ok(EncodedKey { u, c })
}

/// Recover the document key from the re-encrypted commit.
///
/// # Arguments
/// * `x` - Aggregate public key
/// * `c` - Ciphertext point published by the writer
/// * `xhat_enc` - Interpolation of the partial shares, `x * (U + Xc)`
/// * `xc` - Reader private key
pub fn decode_key(
    x: &ProjectivePoint,
    c: &ProjectivePoint,
    xhat_enc: &ProjectivePoint,
    xc: &Scalar,
) -> Result<Vec<u8>> {
    let xhat_dec = *x * (-*xc);
    let xhat = *xhat_enc + xhat_dec;
    let key_point = *c + (-xhat);

    extract(&key_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EMBED_CAPACITY;
    use crate::types::KeyPair;
    use crate::Error;

    #[test]
    fn test_encode_decode_with_plain_secret() {
        // Single holder: the aggregate secret is known, XhatEnc = x * (U + Xc)
        let aggregate = KeyPair::random();
        let reader = KeyPair::random();
        let key = b"sixteen byte key";

        let encoded = encode_key(&aggregate.public, key).unwrap();
        let xhat_enc = (encoded.u + reader.public) * aggregate.secret;

        let decoded = decode_key(&aggregate.public, &encoded.c, &xhat_enc, &reader.secret).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_encode_uses_fresh_randomness() {
        let aggregate = KeyPair::random();
        let first = encode_key(&aggregate.public, b"k").unwrap();
        let second = encode_key(&aggregate.public, b"k").unwrap();
        assert_ne!(first.u, second.u);
        assert_ne!(first.c, second.c);
    }

    #[test]
    fn test_encode_rejects_long_key() {
        let aggregate = KeyPair::random();
        let key = vec![1u8; EMBED_CAPACITY + 1];
        assert!(matches!(
            encode_key(&aggregate.public, &key),
            Err(Error::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_with_wrong_reader_key_fails() {
        let aggregate = KeyPair::random();
        let reader = KeyPair::random();
        let intruder = KeyPair::random();
        let key = b"Very secret Message to be encr";

        let encoded = encode_key(&aggregate.public, key).unwrap();
        let xhat_enc = (encoded.u + reader.public) * aggregate.secret;

        match decode_key(&aggregate.public, &encoded.c, &xhat_enc, &intruder.secret) {
            Ok(bytes) => assert_ne!(bytes, key.to_vec()),
            Err(e) => assert!(matches!(e, Error::DecodeFailed(_))),
        }
    }
}
