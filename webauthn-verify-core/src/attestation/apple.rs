use super::{
    validate_extension, wrong_statement, AppleNonce, AttestationStatement,
    AttestationStatementVerifier,
};
use crate::constants::FMT_APPLE;
use crate::crypto::compute_sha256;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::registration::RegistrationObject;

/// Verifies Apple anonymous attestation (`apple`).
/// <https://www.w3.org/TR/webauthn-2/#sctn-apple-anonymous-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleAnonymousAttestationVerifier;

impl AttestationStatementVerifier for AppleAnonymousAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_APPLE
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let x5c = match registration.attestation_object().att_stmt() {
            AttestationStatement::AppleAnonymous { x5c } => x5c,
            other => return Err(wrong_statement(FMT_APPLE, other)),
        };
        let acd = registration.attested_credential_data()?;
        let cred_cert = x5c.leaf()?;

        // Perform SHA-256 hash of nonceToHash to produce nonce, and verify that nonce equals the
        // value of the extension with OID 1.2.840.113635.100.8.2 in credCert.
        let nonce = compute_sha256(&registration.signed_data());
        validate_extension::<AppleNonce>(&cred_cert, &nonce)?;

        // Verify that the credential public key equals the Subject Public Key of credCert.
        let cert_key = COSEKey::try_from((acd.credential_pk.type_, &*cred_cert))?;
        if !cert_key.same_public_key(&acd.credential_pk) {
            debug!("apple credential key does not match the certificate");
            return Err(WebauthnError::BadAttestationStatement(
                "credential key does not match the certificate".to_string(),
            ));
        }

        Ok(AttestationType::AnonCa)
    }
}
