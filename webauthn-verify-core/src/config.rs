//! Verification policy.

use serde::{Deserialize, Serialize};

use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::COSEAlgorithm;

/// The relying party policy applied to every ceremony a [`WebauthnVerifier`] checks.
///
/// The defaults require user presence, allow self attestation and leave revocation checking
/// off. A policy is usually loaded from the relying party configuration as JSON:
///
/// ```
/// use webauthn_verify_core::VerifierPolicy;
///
/// let policy = VerifierPolicy::from_json(r#"{ "user_verification_required": true }"#)
///     .expect("Invalid policy");
/// assert!(policy.user_presence_required);
/// assert!(policy.user_verification_required);
/// ```
///
/// [`WebauthnVerifier`]: crate::WebauthnVerifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierPolicy {
    /// Reject ceremonies where the user present flag is clear.
    pub user_presence_required: bool,
    /// Reject ceremonies where the user verified flag is clear.
    pub user_verification_required: bool,
    /// Accept self attestation. When false a self attested registration is rejected.
    pub self_attestation_allowed: bool,
    /// Check each attestation certificate against the revocation lists the trust anchor
    /// repository supplies.
    pub revocation_check_enabled: bool,
    /// Reject a certificate path that includes its own self signed root.
    pub full_chain_prohibited: bool,
    /// Only accept the teeEnforced authorization list of android key attestations.
    pub tee_enforced_only: bool,
    /// If set, only credentials using one of these algorithms may register.
    pub allowed_algorithms: Option<Vec<COSEAlgorithm>>,
    /// If set, every extension output the authenticator returns must be listed here.
    pub expected_extensions: Option<Vec<String>>,
    /// Do not check that SafetyNet responses are not from the future. Only for replaying
    /// captured test vectors.
    pub danger_ignore_safetynet_timestamp: bool,
}

impl Default for VerifierPolicy {
    fn default() -> Self {
        VerifierPolicy {
            user_presence_required: true,
            user_verification_required: false,
            self_attestation_allowed: true,
            revocation_check_enabled: false,
            full_chain_prohibited: false,
            tee_enforced_only: false,
            allowed_algorithms: None,
            expected_extensions: None,
            danger_ignore_safetynet_timestamp: false,
        }
    }
}

impl VerifierPolicy {
    /// Load a policy from JSON. Missing fields take their default.
    pub fn from_json(s: &str) -> WebauthnResult<Self> {
        serde_json::from_str(s).map_err(|e| {
            error!(?e, "invalid verifier policy");
            WebauthnError::DataConversion(format!("verifier policy: {e}"))
        })
    }

    pub(crate) fn algorithm_allowed(&self, alg: COSEAlgorithm) -> bool {
        self.allowed_algorithms
            .as_ref()
            .map(|algs| algs.contains(&alg))
            .unwrap_or(true)
    }

    pub(crate) fn extension_expected(&self, id: &str) -> bool {
        self.expected_extensions
            .as_ref()
            .map(|exts| exts.iter().any(|e| e == id))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let policy = VerifierPolicy::from_json("{}").unwrap();
        assert_eq!(policy, VerifierPolicy::default());
        assert!(policy.algorithm_allowed(COSEAlgorithm::RS256));
        assert!(policy.extension_expected("credProtect"));
    }

    #[test]
    fn policy_from_json() {
        let policy = VerifierPolicy::from_json(
            r#"{
                "self_attestation_allowed": false,
                "allowed_algorithms": [-7, -8],
                "expected_extensions": ["credProtect"]
            }"#,
        )
        .unwrap();
        assert!(policy.user_presence_required);
        assert!(!policy.self_attestation_allowed);
        assert!(policy.algorithm_allowed(COSEAlgorithm::ES256));
        assert!(!policy.algorithm_allowed(COSEAlgorithm::RS256));
        assert!(policy.extension_expected("credProtect"));
        assert!(!policy.extension_expected("hmac-secret"));

        assert!(matches!(
            VerifierPolicy::from_json(r#"{ "allowed_algorithms": [1] }"#),
            Err(WebauthnError::DataConversion(_))
        ));
    }
}
