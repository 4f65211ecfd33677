use super::{
    validate_extension, wrong_statement, AttestationStatement, AttestationStatementVerifier,
    FidoGenCeAaguid,
};
use crate::constants::*;
use crate::crypto::{assert_tpm_attest_req, only_hash_from_type, verify_signature};
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::internals::{tpm_name, TpmsAttest, TpmtPublic};
use crate::registration::RegistrationObject;

/// Verifies `tpm` statements produced by platform TPMs, such as Windows Hello.
/// <https://w3c.github.io/webauthn/#sctn-tpm-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct TpmAttestationVerifier;

fn bad_statement(msg: &str) -> WebauthnError {
    debug!(%msg, "tpm statement rejected");
    WebauthnError::BadAttestationStatement(msg.to_string())
}

impl AttestationStatementVerifier for TpmAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_TPM
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let (ver, alg, x5c, ecdaa_key_id, sig, cert_info_bytes, pub_area_bytes) =
            match registration.attestation_object().att_stmt() {
                AttestationStatement::Tpm {
                    ver,
                    alg,
                    x5c,
                    ecdaa_key_id,
                    sig,
                    cert_info,
                    pub_area,
                } => (ver, *alg, x5c, ecdaa_key_id, sig, cert_info, pub_area),
                other => return Err(wrong_statement(FMT_TPM, other)),
            };
        let acd = registration.attested_credential_data()?;

        // The version of the TPM specification to which the signature conforms.
        if ver != "2.0" {
            return Err(bad_statement("unsupported tpm version"));
        }

        // Verify that the public key specified by the parameters and unique fields of pubArea
        // is identical to the credentialPublicKey in the attestedCredentialData.
        let pub_area = TpmtPublic::try_from(pub_area_bytes.as_slice())?;
        trace!(?pub_area);
        if !pub_area.matches_key(&acd.credential_pk) {
            return Err(bad_statement("tpm pubArea does not match the credential key"));
        }

        // Validate that certInfo is valid: magic is TPM_GENERATED_VALUE and type is
        // TPM_ST_ATTEST_CERTIFY.
        let cert_info = TpmsAttest::try_from(cert_info_bytes.as_slice())?;
        trace!(?cert_info);
        if cert_info.magic != TPM_GENERATED_VALUE {
            return Err(bad_statement("tpm certInfo magic is invalid"));
        }
        if cert_info.type_ != TPM_ST_ATTEST_CERTIFY {
            return Err(bad_statement("tpm certInfo is not an attest certify structure"));
        }

        // Verify that extraData is set to the hash of attToBeSigned using the hash algorithm
        // employed in "alg".
        let att_to_be_signed = registration.signed_data();
        if only_hash_from_type(alg, &att_to_be_signed)? != cert_info.extra_data {
            return Err(bad_statement("tpm certInfo extraData does not match"));
        }

        // Verify that attested contains a TPMS_CERTIFY_INFO structure whose name field contains
        // a valid Name for pubArea, as computed using the algorithm in the nameAlg field.
        let certify = cert_info
            .attested
            .as_ref()
            .ok_or_else(|| bad_statement("tpm certInfo is missing certify info"))?;
        if tpm_name(pub_area.name_alg, pub_area_bytes)? != certify.name {
            return Err(bad_statement("tpm certified name does not match pubArea"));
        }

        match (x5c, ecdaa_key_id) {
            (Some(_), Some(_)) => Err(bad_statement(
                "tpm statement must not carry both x5c and ecdaaKeyId",
            )),
            (None, None) => Err(bad_statement("tpm statement requires x5c or ecdaaKeyId")),
            (None, Some(_)) => {
                debug!("tpm ecdaa attestation");
                Ok(AttestationType::ECDAA)
            }
            (Some(x5c), None) => {
                let aik_cert = x5c.leaf()?;

                // Verify the sig is a valid signature over certInfo using the attestation public
                // key in aikCert with the algorithm specified in alg.
                if !verify_signature(alg, &aik_cert, sig, cert_info_bytes)? {
                    debug!("tpm signature verification failed");
                    return Err(WebauthnError::BadSignature);
                }

                // Verify that aikCert meets the requirements in § 8.3.1 TPM Attestation
                // Statement Certificate Requirements.
                assert_tpm_attest_req(&aik_cert)?;

                // If aikCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
                // (id-fido-gen-ce-aaguid) verify that the value of this extension matches the
                // aaguid in authenticatorData.
                validate_extension::<FidoGenCeAaguid>(&aik_cert, &acd.aaguid)?;

                trace!(firmware_version = cert_info.firmware_version, "tpm attestation");
                Ok(AttestationType::AttCa)
            }
        }
    }
}
