//! Verification policies deciding whether a node contributes a share
//!
//! Every node evaluates its policy independently. Policies must be free
//! of side effects so that nodes given the same request agree.

use crate::types::ReencryptionRequest;

/// Authorization hook evaluated by each node before contributing
pub trait VerificationPolicy: Send + Sync {
    /// Return `true` to contribute a partial share for `request`
    fn verify(&self, request: &ReencryptionRequest) -> bool;
}

impl<F> VerificationPolicy for F
where
    F: Fn(&ReencryptionRequest) -> bool + Send + Sync,
{
    fn verify(&self, request: &ReencryptionRequest) -> bool {
        self(request)
    }
}

/// Accept any request that carries verification data
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadPresent;

impl VerificationPolicy for PayloadPresent {
    fn verify(&self, request: &ReencryptionRequest) -> bool {
        request.verification_data.is_some()
    }
}

/// Accept only requests whose verification data equals a fixed value
#[derive(Debug, Clone)]
pub struct ExpectedPayload(pub Vec<u8>);

impl VerificationPolicy for ExpectedPayload {
    fn verify(&self, request: &ReencryptionRequest) -> bool {
        request.verification_data.as_deref() == Some(self.0.as_slice())
    }
}

/// A missing payload is refused without consulting the policy
pub(crate) fn authorize(policy: &dyn VerificationPolicy, request: &ReencryptionRequest) -> bool {
    request.verification_data.is_some() && policy.verify(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommitmentPolynomial;
    use k256::ProjectivePoint;

    fn request(data: Option<&[u8]>) -> ReencryptionRequest {
        ReencryptionRequest {
            u: ProjectivePoint::GENERATOR,
            xc: ProjectivePoint::GENERATOR,
            threshold: 1,
            verification_data: data.map(|d| d.to_vec()),
            poly: CommitmentPolynomial {
                commits: vec![ProjectivePoint::GENERATOR],
            },
        }
    }

    #[test]
    fn test_missing_payload_is_refused() {
        let always = |_: &ReencryptionRequest| true;
        assert!(!authorize(&always, &request(None)));
        assert!(authorize(&always, &request(Some(b""))));
    }

    #[test]
    fn test_expected_payload() {
        let policy = ExpectedPayload(b"correct block".to_vec());
        assert!(authorize(&policy, &request(Some(b"correct block"))));
        assert!(!authorize(&policy, &request(Some(b"wrong block"))));
    }

    #[test]
    fn test_payload_present() {
        assert!(authorize(&PayloadPresent, &request(Some(b"x"))));
        assert!(!authorize(&PayloadPresent, &request(None)));
    }
}
