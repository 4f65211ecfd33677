use super::{
    validate_extension, wrong_statement, AppleNonce, AttestationStatement,
    AttestationStatementVerifier,
};
use crate::constants::{
    APPLE_APPATTEST_AAGUID_DEVELOPMENT, APPLE_APPATTEST_AAGUID_PRODUCTION, FMT_APPLE_APPATTEST,
};
use crate::crypto::compute_sha256;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::registration::RegistrationObject;

/// Verifies App Attest statements (`apple-appattest`) from iOS applications.
///
/// The receipt is only required to be present. Redeeming it is done against Apple's service.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleAppAttestAttestationVerifier;

impl AttestationStatementVerifier for AppleAppAttestAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_APPLE_APPATTEST
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let (x5c, receipt) = match registration.attestation_object().att_stmt() {
            AttestationStatement::AppleAppAttest { x5c, receipt } => (x5c, receipt),
            other => return Err(wrong_statement(FMT_APPLE_APPATTEST, other)),
        };
        let acd = registration.attested_credential_data()?;

        if x5c.is_empty() || receipt.is_empty() {
            debug!("app attest statement is missing x5c or receipt");
            return Err(WebauthnError::BadAttestationStatement(
                "app attest requires x5c and receipt".to_string(),
            ));
        }
        let cred_cert = x5c.leaf()?;

        // The nonce is the SHA-256 of authenticatorData and clientDataHash, embedded in the
        // leaf certificate.
        let nonce = compute_sha256(&registration.signed_data());
        validate_extension::<AppleNonce>(&cred_cert, &nonce)?;

        // A freshly attested key has never signed.
        let auth_data = registration.attestation_object().auth_data();
        if auth_data.counter != 0 {
            debug!(counter = auth_data.counter, "app attest counter is not zero");
            return Err(WebauthnError::MaliciousCounterValue {
                presented: auth_data.counter,
                stored: 0,
            });
        }

        // The aaguid names the App Attest environment.
        if acd.aaguid != APPLE_APPATTEST_AAGUID_DEVELOPMENT
            && acd.aaguid != APPLE_APPATTEST_AAGUID_PRODUCTION
        {
            debug!(aaguid = ?acd.aaguid, "app attest aaguid is not an app attest environment");
            return Err(WebauthnError::BadAaguid);
        }

        // The key id is the SHA-256 of the uncompressed leaf public key.
        let cert_key = COSEKey::try_from((COSEAlgorithm::ES256, &*cred_cert))?;
        let key_id = compute_sha256(&cert_key.get_alg_key_ecc_x962_raw()?);
        if acd.credential_id != key_id {
            debug!("app attest credential id is not the key id of the certificate");
            return Err(WebauthnError::BadAttestationStatement(
                "credential id does not match the certificate key".to_string(),
            ));
        }

        Ok(AttestationType::Basic)
    }
}
