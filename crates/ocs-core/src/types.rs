//! Core types for the on-chain secrets protocol

use crate::{Error, Result};
use k256::{
    elliptic_curve::{
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field, PrimeField,
    },
    AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Position of a node in the communication tree; also its share index
pub type NodeIndex = usize;

/// Length of a canonical scalar encoding
pub const SCALAR_LEN: usize = 32;

/// Identifier distinguishing concurrent or retried protocol runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a fresh random run identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compressed SEC1 encoding of a point (identity is the single byte `0x00`)
pub fn point_to_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Parse a SEC1 encoded point, rejecting anything not on the curve
pub fn point_from_bytes(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|e| Error::InvalidPoint(e.to_string()))?;
    let affine: AffinePoint = Option::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| Error::InvalidPoint("point is not on the curve".into()))?;
    Ok(ProjectivePoint::from(affine))
}

/// Big-endian scalar encoding
pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; SCALAR_LEN] {
    let mut bytes = [0u8; SCALAR_LEN];
    bytes.copy_from_slice(&scalar.to_bytes());
    bytes
}

/// Parse a canonical scalar; values at or above the group order are rejected
pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    if bytes.len() != SCALAR_LEN {
        return Err(Error::Deserialization(format!(
            "scalar must be {} bytes, got {}",
            SCALAR_LEN,
            bytes.len()
        )));
    }
    Option::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
        .ok_or_else(|| Error::Deserialization("non-canonical scalar".into()))
}

pub(crate) mod point_serde {
    use k256::ProjectivePoint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(point: &ProjectivePoint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&super::point_to_bytes(point))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ProjectivePoint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        super::point_from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod points_serde {
    use k256::ProjectivePoint;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(points: &[ProjectivePoint], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: Vec<Vec<u8>> = points.iter().map(super::point_to_bytes).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<ProjectivePoint>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Vec<Vec<u8>> = Vec::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|bytes| super::point_from_bytes(bytes).map_err(serde::de::Error::custom))
            .collect()
    }
}

pub(crate) mod scalar_serde {
    use k256::Scalar;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&super::scalar_to_bytes(scalar))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        super::scalar_from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A node's share of the aggregate private key.
///
/// Produced by the key generation step and owned by exactly one node.
/// It is never put into a protocol message; `Debug` prints the index only.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DistKeyShare {
    /// Share index (evaluation point is `index + 1`)
    pub index: NodeIndex,

    /// Secret scalar
    #[serde(with = "scalar_serde")]
    pub secret: Scalar,
}

impl fmt::Debug for DistKeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistKeyShare")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Public commitments `a_j * G` to the coefficients of the sharing polynomial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentPolynomial {
    #[serde(with = "points_serde")]
    pub commits: Vec<ProjectivePoint>,
}

/// One node's re-encryption contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialShare {
    /// Index of the contributing node
    pub index: NodeIndex,

    /// `secret_i * (U + Xc)`
    #[serde(with = "point_serde")]
    pub value: ProjectivePoint,
}

/// The writer's published artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedKey {
    /// Commit point `U = r * G`
    #[serde(with = "point_serde")]
    pub u: ProjectivePoint,

    /// Ciphertext point `C = r * X + Embed(key)`
    #[serde(with = "point_serde")]
    pub c: ProjectivePoint,
}

/// Request disseminated to every node for one re-encryption run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReencryptionRequest {
    /// Commit point `U` of the encoded key
    #[serde(with = "point_serde")]
    pub u: ProjectivePoint,

    /// Reader public key `Xc`
    #[serde(with = "point_serde")]
    pub xc: ProjectivePoint,

    /// Number of shares needed to interpolate
    pub threshold: usize,

    /// Data handed to the verification policy
    pub verification_data: Option<Vec<u8>>,

    /// Commitments every node checks its own share against
    pub poly: CommitmentPolynomial,
}

impl ReencryptionRequest {
    /// Build a request for `encoded` on behalf of the reader `xc`
    pub fn new(
        encoded: &EncodedKey,
        xc: ProjectivePoint,
        poly: CommitmentPolynomial,
        verification_data: Option<Vec<u8>>,
    ) -> Self {
        Self {
            u: encoded.u,
            xc,
            threshold: poly.threshold(),
            verification_data,
            poly,
        }
    }
}

/// Reader key pair `(xc, Xc = xc * G)`
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    #[serde(with = "scalar_serde")]
    pub secret: Scalar,

    #[serde(with = "point_serde")]
    #[zeroize(skip)]
    pub public: ProjectivePoint,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG
    pub fn random() -> Self {
        let secret = Scalar::random(&mut OsRng);
        Self {
            secret,
            public: ProjectivePoint::GENERATOR * secret,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(point_to_bytes(&self.public)))
            .finish_non_exhaustive()
    }
}

/// How long a node remembers a finished run by default
pub const DEFAULT_RUN_RETENTION: Duration = Duration::from_secs(60);

/// Per-node protocol settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Wait budget per tree level below a node; a node of height `h`
    /// waits at most `h * child_wait` for its children.
    pub child_wait: Duration,

    /// Finished runs are remembered this long; duplicates and late replies
    /// arriving within the window are ignored.
    pub run_retention: Duration,
}

impl NodeConfig {
    /// Create a validated configuration
    pub fn new(child_wait: Duration) -> Result<Self> {
        if child_wait.is_zero() {
            return Err(Error::InvalidConfig("child wait must be non-zero".into()));
        }
        Ok(Self {
            child_wait,
            run_retention: DEFAULT_RUN_RETENTION,
        })
    }

    /// Override how long finished runs are remembered
    pub fn with_run_retention(mut self, run_retention: Duration) -> Result<Self> {
        if run_retention.is_zero() {
            return Err(Error::InvalidConfig("run retention must be non-zero".into()));
        }
        self.run_retention = run_retention;
        Ok(self)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            child_wait: Duration::from_secs(1),
            run_retention: DEFAULT_RUN_RETENTION,
        }
    }
}
