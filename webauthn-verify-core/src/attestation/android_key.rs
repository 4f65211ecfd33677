use super::{wrong_statement, AttestationStatement, AttestationStatementVerifier};
use crate::asn1::{self, Asn1Node};
use crate::constants::{FMT_ANDROID_KEY, OID_ANDROID_KEY_ATTESTATION};
use crate::crypto::{certificate_extension, verify_signature};
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::registration::RegistrationObject;

const KM_ORIGIN_GENERATED: u64 = 0;
const KM_PURPOSE_SIGN: u64 = 2;

// AuthorizationList tags.
const KM_TAG_PURPOSE: u32 = 1;
const KM_TAG_ALL_APPLICATIONS: u32 = 600;
const KM_TAG_ORIGIN: u32 = 702;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AuthorizationList {
    all_applications: bool,
    origin: Option<u64>,
    purpose: Vec<u64>,
}

impl AuthorizationList {
    fn parse(node: &Asn1Node<'_>) -> WebauthnResult<Self> {
        if !node.is_universal(asn1::tag::SEQUENCE) {
            return Err(WebauthnError::DataConversion(
                "authorization list must be a sequence".to_string(),
            ));
        }

        let all_applications = node.find_context(KM_TAG_ALL_APPLICATIONS)?.is_some();

        let origin = match node.find_context(KM_TAG_ORIGIN)? {
            Some(tagged) => Some(tagged.child(0)?.as_u64()?),
            None => None,
        };

        let purpose = match node.find_context(KM_TAG_PURPOSE)? {
            Some(tagged) => {
                let set = tagged.child(0)?;
                if !set.is_universal(asn1::tag::SET) {
                    return Err(WebauthnError::DataConversion(
                        "key purpose must be a set".to_string(),
                    ));
                }
                set.children()?
                    .iter()
                    .map(|p| p.as_u64())
                    .collect::<WebauthnResult<Vec<_>>>()?
            }
            None => Vec::new(),
        };

        Ok(AuthorizationList {
            all_applications,
            origin,
            purpose,
        })
    }
}

/// The parts of the android KeyDescription this verifier checks.
///
/// ```text
/// KeyDescription ::= SEQUENCE {
///     attestationVersion         INTEGER,
///     attestationSecurityLevel   SecurityLevel,
///     keymasterVersion           INTEGER,
///     keymasterSecurityLevel     SecurityLevel,
///     attestationChallenge       OCTET_STRING,
///     uniqueId                   OCTET_STRING,
///     softwareEnforced           AuthorizationList,
///     teeEnforced                AuthorizationList,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyDescription {
    attestation_security_level: u64,
    attestation_challenge: Vec<u8>,
    software_enforced: AuthorizationList,
    tee_enforced: AuthorizationList,
}

impl KeyDescription {
    fn parse(value: &[u8]) -> WebauthnResult<Self> {
        let seq = asn1::parse(value)?;
        Ok(KeyDescription {
            attestation_security_level: seq.child(1)?.as_u64()?,
            attestation_challenge: seq.child(4)?.as_octet_string()?.to_vec(),
            software_enforced: AuthorizationList::parse(seq.child(6)?)?,
            tee_enforced: AuthorizationList::parse(seq.child(7)?)?,
        })
    }
}

/// Verifies `android-key` statements from the Android hardware backed keystore.
/// <https://w3c.github.io/webauthn/#sctn-android-key-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidKeyAttestationVerifier {
    tee_enforced_only: bool,
}

impl AndroidKeyAttestationVerifier {
    /// When `tee_enforced_only` is set only the teeEnforced authorization list is accepted as
    /// evidence of the key origin and purpose.
    pub fn new(tee_enforced_only: bool) -> Self {
        AndroidKeyAttestationVerifier { tee_enforced_only }
    }

    fn check_authorization(&self, desc: &KeyDescription) -> WebauthnResult<()> {
        // The AuthorizationList.allApplications field is not present on either authorization
        // list, since PublicKeyCredential MUST be scoped to the RP ID.
        if desc.software_enforced.all_applications || desc.tee_enforced.all_applications {
            debug!("android key is not scoped to an application");
            return Err(WebauthnError::BadAttestationStatement(
                "android key allApplications must not be set".to_string(),
            ));
        }

        // The value in the AuthorizationList.origin field is equal to KM_ORIGIN_GENERATED and
        // the AuthorizationList.purpose field contains KM_PURPOSE_SIGN.
        let (origin, sign_purpose) = if self.tee_enforced_only {
            (
                desc.tee_enforced.origin,
                desc.tee_enforced.purpose.contains(&KM_PURPOSE_SIGN),
            )
        } else {
            (
                desc.tee_enforced.origin.or(desc.software_enforced.origin),
                desc.tee_enforced.purpose.contains(&KM_PURPOSE_SIGN)
                    || desc.software_enforced.purpose.contains(&KM_PURPOSE_SIGN),
            )
        };

        if origin != Some(KM_ORIGIN_GENERATED) || !sign_purpose {
            debug!(?origin, ?sign_purpose, tee_enforced_only = %self.tee_enforced_only, "android key authorization is invalid");
            return Err(WebauthnError::BadAttestationStatement(
                "android key was not generated for signing".to_string(),
            ));
        }

        Ok(())
    }
}

impl AttestationStatementVerifier for AndroidKeyAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_ANDROID_KEY
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let (alg, sig, x5c) = match registration.attestation_object().att_stmt() {
            AttestationStatement::AndroidKey { alg, sig, x5c } => (*alg, sig, x5c),
            other => return Err(wrong_statement(FMT_ANDROID_KEY, other)),
        };
        let acd = registration.attested_credential_data()?;
        let cred_cert = x5c.leaf()?;

        // Verify that sig is a valid signature over the concatenation of authenticatorData and
        // clientDataHash using the public key in the first certificate in x5c with the
        // algorithm specified in alg.
        if !verify_signature(alg, &cred_cert, sig, &registration.signed_data())? {
            debug!("android key signature verification failed");
            return Err(WebauthnError::BadSignature);
        }

        // Verify that the public key in the first certificate in x5c matches the
        // credentialPublicKey in the attestedCredentialData in authenticatorData.
        let cert_key = COSEKey::try_from((acd.credential_pk.type_, &*cred_cert))?;
        if !cert_key.same_public_key(&acd.credential_pk) {
            debug!("android key certificate does not hold the credential key");
            return Err(WebauthnError::BadAttestationStatement(
                "credential key does not match the certificate".to_string(),
            ));
        }

        // Verify that the attestationChallenge field in the attestation certificate extension
        // data is identical to clientDataHash.
        let der = cred_cert.to_der()?;
        let extension = certificate_extension(&der, &OID_ANDROID_KEY_ATTESTATION)?
            .ok_or_else(|| {
                debug!("android key certificate is missing the key description");
                WebauthnError::BadAttestationStatement(
                    "certificate is missing the android key attestation extension".to_string(),
                )
            })?;
        let desc = KeyDescription::parse(extension)?;
        trace!(?desc);

        if desc.attestation_challenge != registration.client_data_hash() {
            debug!("android key attestation challenge mismatch");
            return Err(WebauthnError::BadAttestationStatement(
                "android key attestation challenge does not match".to_string(),
            ));
        }

        self.check_authorization(&desc)?;

        trace!(
            security_level = desc.attestation_security_level,
            "android key attestation"
        );
        Ok(AttestationType::Basic)
    }
}
