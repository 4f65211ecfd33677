use super::{wrong_statement, AttestationStatement, AttestationStatementVerifier};
use crate::constants::FMT_FIDO_U2F;
use crate::crypto::{certificate_curve, verify_signature};
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::registration::RegistrationObject;

/// Verifies `fido-u2f` statements from U2F authenticators.
/// <https://w3c.github.io/webauthn/#sctn-fido-u2f-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct FidoU2FAttestationVerifier;

impl AttestationStatementVerifier for FidoU2FAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_FIDO_U2F
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let (x5c, sig) = match registration.attestation_object().att_stmt() {
            AttestationStatement::FidoU2F { x5c, sig } => (x5c, sig),
            other => return Err(wrong_statement(FMT_FIDO_U2F, other)),
        };
        let acd = registration.attested_credential_data()?;

        // Check that x5c has exactly one element and let att_cert be that element.
        if x5c.certificates().len() != 1 {
            debug!(len = x5c.certificates().len(), "fido-u2f x5c must hold one certificate");
            return Err(WebauthnError::BadAttestationStatement(
                "fido-u2f x5c must contain exactly one certificate".to_string(),
            ));
        }
        let att_cert = x5c.leaf()?;

        // Let certificate public key be the public key conveyed by att_cert. If certificate
        // public key is not an Elliptic Curve (EC) public key over the P-256 curve, terminate
        // this algorithm and return an appropriate error.
        if certificate_curve(&att_cert)? != Some(ECDSACurve::SECP256R1) {
            debug!("fido-u2f attestation certificate key is not p-256");
            return Err(WebauthnError::Certificate(
                "fido-u2f attestation certificate key must be p-256".to_string(),
            ));
        }

        // U2F authenticators have no AAGUID.
        if acd.aaguid != [0u8; 16] {
            debug!(aaguid = ?acd.aaguid, "fido-u2f aaguid must be zero");
            return Err(WebauthnError::BadAaguid);
        }

        // Convert the COSE_KEY formatted credentialPublicKey to Raw ANSI X9.62 public key
        // format. The credential key must itself be a P-256 key.
        match &acd.credential_pk.key {
            COSEKeyType::EC_EC2(ec2) if ec2.curve == ECDSACurve::SECP256R1 => {}
            _ => {
                return Err(WebauthnError::Certificate(
                    "fido-u2f credential key must be p-256".to_string(),
                ))
            }
        }
        let public_key_u2f = acd.credential_pk.get_alg_key_ecc_x962_raw()?;

        // Let verificationData be the concatenation of (0x00 || rpIdHash || clientDataHash ||
        // credentialId || publicKeyU2F)
        let r: [u8; 1] = [0x00];
        let verification_data: Vec<u8> = r
            .iter()
            .chain(registration.attestation_object().auth_data().rp_id_hash.iter())
            .chain(registration.client_data_hash().iter())
            .chain(acd.credential_id.iter())
            .chain(public_key_u2f.iter())
            .copied()
            .collect();

        // Verify the sig using verificationData and certificate public key per [SEC1].
        let verified = verify_signature(COSEAlgorithm::ES256, &att_cert, sig, &verification_data)?;
        if !verified {
            debug!("fido-u2f signature verification failed");
            return Err(WebauthnError::BadSignature);
        }

        Ok(AttestationType::Basic)
    }
}
