//! The verifier and its builder, plus the ceremony checks shared by registration and
//! authentication.

use std::fmt;
use std::sync::Arc;

use openssl::memcmp;
use webauthn_attestation_ca::TrustAnchorRepository;

use crate::attestation::{AttestationStatementVerifier, AttestationVerifierRegistry};
use crate::authentication::CustomAuthenticationVerifier;
use crate::config::VerifierPolicy;
use crate::crypto::compute_sha256;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::registration::CustomRegistrationVerifier;
use crate::trust::TrustEvaluator;

/// A builder for a [`WebauthnVerifier`].
///
/// ```
/// use std::sync::Arc;
/// use webauthn_verify_core::{TrustAnchorStore, VerifierPolicy, WebauthnVerifierBuilder};
///
/// let policy = VerifierPolicy {
///     self_attestation_allowed: false,
///     ..Default::default()
/// };
/// let verifier = WebauthnVerifierBuilder::new(Arc::new(TrustAnchorStore::default()))
///     .policy(policy)
///     .build();
/// assert!(!verifier.policy().self_attestation_allowed);
/// ```
pub struct WebauthnVerifierBuilder {
    trust_anchors: Arc<dyn TrustAnchorRepository>,
    policy: VerifierPolicy,
    attestation_verifiers: Vec<Arc<dyn AttestationStatementVerifier>>,
    disabled_formats: Vec<String>,
    custom_registration_verifiers: Vec<Arc<dyn CustomRegistrationVerifier>>,
    custom_authentication_verifiers: Vec<Arc<dyn CustomAuthenticationVerifier>>,
}

impl WebauthnVerifierBuilder {
    /// Start a builder that evaluates attestation trust against `trust_anchors`.
    pub fn new(trust_anchors: Arc<dyn TrustAnchorRepository>) -> Self {
        WebauthnVerifierBuilder {
            trust_anchors,
            policy: VerifierPolicy::default(),
            attestation_verifiers: Vec::new(),
            disabled_formats: Vec::new(),
            custom_registration_verifiers: Vec::new(),
            custom_authentication_verifiers: Vec::new(),
        }
    }

    /// Set the policy applied to every ceremony.
    pub fn policy(mut self, policy: VerifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a statement verifier, replacing the built in verifier of the same format.
    pub fn attestation_verifier(mut self, verifier: Arc<dyn AttestationStatementVerifier>) -> Self {
        self.attestation_verifiers.push(verifier);
        self
    }

    /// Reject every statement of `format` as unsupported.
    pub fn disable_attestation_format(mut self, format: &str) -> Self {
        self.disabled_formats.push(format.to_string());
        self
    }

    /// Run an additional check after the built in registration stages.
    pub fn custom_registration_verifier(
        mut self,
        verifier: Arc<dyn CustomRegistrationVerifier>,
    ) -> Self {
        self.custom_registration_verifiers.push(verifier);
        self
    }

    /// Run an additional check after the built in authentication stages.
    pub fn custom_authentication_verifier(
        mut self,
        verifier: Arc<dyn CustomAuthenticationVerifier>,
    ) -> Self {
        self.custom_authentication_verifiers.push(verifier);
        self
    }

    /// Complete the construction of the verifier.
    pub fn build(self) -> WebauthnVerifier {
        let mut registry = AttestationVerifierRegistry::new(&self.policy);
        for verifier in self.attestation_verifiers.into_iter() {
            registry.register(verifier);
        }
        for format in self.disabled_formats.iter() {
            registry.unregister(format);
        }

        trace!(?registry, policy = ?self.policy, "built webauthn verifier");

        WebauthnVerifier {
            trust: TrustEvaluator::new(self.trust_anchors, &self.policy),
            registry,
            policy: self.policy,
            custom_registration_verifiers: self.custom_registration_verifiers,
            custom_authentication_verifiers: self.custom_authentication_verifiers,
        }
    }
}

/// Verifies registration and authentication ceremonies.
///
/// A verifier holds no mutable state. It is cheap to clone and can be shared between threads.
#[derive(Clone)]
pub struct WebauthnVerifier {
    pub(crate) policy: VerifierPolicy,
    pub(crate) registry: AttestationVerifierRegistry,
    pub(crate) trust: TrustEvaluator,
    pub(crate) custom_registration_verifiers: Vec<Arc<dyn CustomRegistrationVerifier>>,
    pub(crate) custom_authentication_verifiers: Vec<Arc<dyn CustomAuthenticationVerifier>>,
}

impl fmt::Debug for WebauthnVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebauthnVerifier")
            .field("policy", &self.policy)
            .field("registry", &self.registry)
            .field("trust", &self.trust)
            .field(
                "custom_registration_verifiers",
                &self.custom_registration_verifiers.len(),
            )
            .field(
                "custom_authentication_verifiers",
                &self.custom_authentication_verifiers.len(),
            )
            .finish()
    }
}

impl WebauthnVerifier {
    /// The policy this verifier applies.
    pub fn policy(&self) -> &VerifierPolicy {
        &self.policy
    }

    /// Check the client data of a ceremony: its type, the challenge, the origin and token
    /// binding, in that order.
    pub(crate) fn verify_client_data(
        &self,
        client_data: &CollectedClientData,
        expected_type: &str,
        server_property: &ServerProperty,
    ) -> WebauthnResult<()> {
        // Verify that the value of C.type is the expected ceremony type.
        if client_data.type_ != expected_type {
            debug!(found = %client_data.type_, expected = %expected_type, "invalid client data type");
            return Err(WebauthnError::InvalidClientDataType);
        }

        // Verify that the value of C.challenge equals the challenge issued for this ceremony.
        let expected = server_property.challenge.as_deref().ok_or_else(|| {
            debug!("no challenge was issued for this ceremony");
            WebauthnError::MissingChallenge
        })?;
        let presented: &[u8] = client_data.challenge.as_ref();
        if presented.len() != expected.len() || !memcmp::eq(presented, expected) {
            debug!("challenge mismatch");
            return Err(WebauthnError::BadChallenge);
        }

        // Verify that the value of C.origin matches an allowed origin.
        let origin = client_data.origin.parse::<Origin>()?;
        if !server_property.origins.iter().any(|allowed| allowed == &origin) {
            debug!(%origin, allowed = ?server_property.origins, "origin is not allowed");
            return Err(WebauthnError::BadOrigin);
        }

        // If token binding was used on the connection, the id must match it.
        if let Some(token_binding) = client_data.token_binding.as_ref() {
            if token_binding.status == TokenBindingStatus::Present {
                let presented = token_binding
                    .id
                    .as_ref()
                    .map(|id| -> &[u8] { id.as_ref() });
                match (presented, server_property.token_binding_id.as_deref()) {
                    (Some(presented), Some(expected)) if presented == expected => {}
                    _ => {
                        debug!("token binding id mismatch");
                        return Err(WebauthnError::BadTokenBinding);
                    }
                }
            }
        }

        Ok(())
    }

    /// Check the authenticator data of a ceremony: the rpIdHash, then the flags.
    pub(crate) fn verify_authenticator_data(
        &self,
        auth_data: &AuthenticatorData,
        server_property: &ServerProperty,
    ) -> WebauthnResult<()> {
        // Verify that the rpIdHash in authData is the SHA-256 hash of the RP ID expected by
        // the relying party.
        let rp_id_hash = compute_sha256(server_property.rp_id.as_bytes());
        if !memcmp::eq(&auth_data.rp_id_hash, &rp_id_hash) {
            debug!(rp_id = %server_property.rp_id, "rp id hash mismatch");
            return Err(WebauthnError::BadRpId);
        }

        if self.policy.user_presence_required && !auth_data.user_present() {
            debug!("user present flag is not set");
            return Err(WebauthnError::UserNotPresent);
        }

        if self.policy.user_verification_required && !auth_data.user_verified() {
            debug!("user verified flag is not set");
            return Err(WebauthnError::UserNotVerified);
        }

        if auth_data.backup_state() && !auth_data.backup_eligible() {
            debug!("backup state set on a credential that is not backup eligible");
            return Err(WebauthnError::InconsistentBackupState);
        }

        Ok(())
    }

    /// With an expected extension list configured, every extension output must be listed.
    pub(crate) fn verify_extensions(
        &self,
        extensions: Option<&AuthenticatorExtensions>,
    ) -> WebauthnResult<()> {
        for id in extensions.into_iter().flat_map(|ext| ext.keys()) {
            if !self.policy.extension_expected(id) {
                debug!(%id, "unexpected extension output");
                return Err(WebauthnError::UnexpectedExtension(id.clone()));
            }
        }
        Ok(())
    }
}
