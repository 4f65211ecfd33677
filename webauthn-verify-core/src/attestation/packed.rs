use super::{
    validate_extension, wrong_statement, AttestationStatement, AttestationStatementVerifier,
    FidoGenCeAaguid,
};
use crate::constants::FMT_PACKED;
use crate::crypto::{assert_packed_attest_req, certificate_curve, verify_signature};
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::registration::RegistrationObject;

/// Verifies `packed` statements in all three shapes: an attestation certificate path, self
/// attestation, or an ECDAA key id.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct PackedAttestationVerifier;

impl AttestationStatementVerifier for PackedAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_PACKED
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let (alg, sig, x5c, ecdaa_key_id) = match registration.attestation_object().att_stmt() {
            AttestationStatement::Packed {
                alg,
                sig,
                x5c,
                ecdaa_key_id,
            } => (*alg, sig, x5c, ecdaa_key_id),
            other => return Err(wrong_statement(FMT_PACKED, other)),
        };
        let acd = registration.attested_credential_data()?;
        let credential_pk = &acd.credential_pk;
        let verification_data = registration.signed_data();

        match (x5c, ecdaa_key_id) {
            (Some(_), Some(_)) => {
                debug!("packed statement has both x5c and ecdaaKeyId");
                Err(WebauthnError::BadAttestationStatement(
                    "packed statement must not carry both x5c and ecdaaKeyId".to_string(),
                ))
            }
            (Some(x5c), None) => {
                // A statement signed by the credential key is self attestation, whatever
                // certificates came with it. The trust stage rejects the certificate path.
                if alg == credential_pk.type_
                    && credential_pk.verify_signature(sig, &verification_data)?
                {
                    debug!("packed statement signed by the credential key carries x5c");
                    return Ok(AttestationType::Self_);
                }

                let att_cert = x5c.leaf()?;
                let cert_key = COSEKey::try_from((alg, &*att_cert))?;
                if cert_key.same_public_key(credential_pk) {
                    debug!("packed attestation certificate holds the credential key");
                    return Ok(AttestationType::Self_);
                }

                // An EC attestation key must be on the curve that alg names.
                if let Some(curve) = certificate_curve(&att_cert)? {
                    if alg.ecdsa_curve() != Some(curve) {
                        debug!(?alg, ?curve, "packed alg does not match the certificate curve");
                        return Err(WebauthnError::Certificate(
                            "packed alg does not match the attestation certificate curve"
                                .to_string(),
                        ));
                    }
                }

                // Verify that sig is a valid signature over the concatenation of
                // authenticatorData and clientDataHash using the attestation public key in
                // attestnCert with the algorithm specified in alg.
                if !verify_signature(alg, &att_cert, sig, &verification_data)? {
                    debug!("packed x5c signature verification failed");
                    return Err(WebauthnError::BadSignature);
                }

                // Verify that attestnCert meets the requirements in § 8.2.1 Packed Attestation
                // Statement Certificate Requirements.
                assert_packed_attest_req(&att_cert)?;

                // If attestnCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
                // (id-fido-gen-ce-aaguid) verify that the value of this extension matches the
                // aaguid in authenticatorData.
                validate_extension::<FidoGenCeAaguid>(&att_cert, &acd.aaguid)?;

                Ok(AttestationType::Basic)
            }
            (None, Some(_)) => {
                // ECDAA signatures cannot be checked here, the trust stage rejects them.
                debug!("packed ecdaa attestation");
                Ok(AttestationType::ECDAA)
            }
            (None, None) => {
                // Validate that alg matches the algorithm of the credentialPublicKey in
                // authenticatorData.
                if alg != credential_pk.type_ {
                    debug!(?alg, cred_alg = ?credential_pk.type_, "packed self attestation alg mismatch");
                    return Err(WebauthnError::BadAttestationStatement(
                        "packed self attestation alg does not match the credential key"
                            .to_string(),
                    ));
                }

                // Verify that sig is a valid signature over the concatenation of
                // authenticatorData and clientDataHash using the credential public key with alg.
                if !credential_pk.verify_signature(sig, &verification_data)? {
                    debug!("packed self attestation signature verification failed");
                    return Err(WebauthnError::BadSignature);
                }

                Ok(AttestationType::Self_)
            }
        }
    }
}
