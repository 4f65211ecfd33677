use std::str::FromStr;
use std::time::{Duration, UNIX_EPOCH};

use base64urlsafedata::Base64UrlSafeData;
use compact_jwt::{JwsUnverified, JwtError};
use openssl::nid::Nid;
use openssl::x509;
use serde::{Deserialize, Serialize};

use super::{wrong_statement, AttestationStatement, AttestationStatementVerifier, CertificatePath};
use crate::constants::*;
use crate::crypto::{compute_sha256, subject_entry};
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::registration::RegistrationObject;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SafetyNetAttestResponse {
    pub(crate) timestamp_ms: u64,
    pub(crate) nonce: Base64UrlSafeData,
    #[serde(default)]
    pub(crate) apk_package_name: Option<String>,
    pub(crate) cts_profile_match: bool,
    pub(crate) basic_integrity: bool,
    #[serde(default)]
    pub(crate) evaluation_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum SafetyNetError {
    #[error("Response is not utf8")]
    Malformed,

    #[error("JWT error: {0:?}")]
    Jwt(#[from] JwtError),

    #[error("No cert in chain")]
    MissingCertChain,

    #[error("openssl")]
    OpenSSL(#[from] openssl::error::ErrorStack),

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("hostname invalid")]
    InvalidHostname,

    #[error("False CTS Profile Match")]
    CtsProfileMatchFailed,

    #[error("Timestamp is in the future")]
    FutureTimestamp,
}

impl From<SafetyNetError> for WebauthnError {
    fn from(e: SafetyNetError) -> Self {
        debug!(?e, "safetynet response rejected");
        match e {
            SafetyNetError::Jwt(JwtError::InvalidSignature) => WebauthnError::BadSignature,
            SafetyNetError::Jwt(_) | SafetyNetError::Malformed => {
                WebauthnError::DataConversion(e.to_string())
            }
            SafetyNetError::OpenSSL(e) => WebauthnError::OpenSSLError(e),
            SafetyNetError::InvalidHostname => WebauthnError::Certificate(e.to_string()),
            SafetyNetError::MissingCertChain
            | SafetyNetError::NonceMismatch
            | SafetyNetError::CtsProfileMatchFailed
            | SafetyNetError::FutureTimestamp => {
                WebauthnError::BadAttestationStatement(e.to_string())
            }
        }
    }
}

fn unverified_response(response: &[u8]) -> Result<JwsUnverified, SafetyNetError> {
    let token = std::str::from_utf8(response).map_err(|_| SafetyNetError::Malformed)?;
    trace!(?token);
    Ok(JwsUnverified::from_str(token)?)
}

fn embedded_chain(jwsu: &JwsUnverified) -> Result<Vec<x509::X509>, SafetyNetError> {
    match jwsu.get_x5c_chain()? {
        Some(certs) if !certs.is_empty() => Ok(certs),
        _ => Err(SafetyNetError::MissingCertChain),
    }
}

/// The certificate path from the header of a SafetyNet response.
pub(crate) fn response_certificate_path(response: &[u8]) -> WebauthnResult<CertificatePath> {
    let jwsu = unverified_response(response)?;
    let certificates = embedded_chain(&jwsu)?
        .iter()
        .map(|c| c.to_der())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CertificatePath::new(certificates))
}

/// Verifies `android-safetynet` statements.
/// <https://www.w3.org/TR/webauthn/#sctn-android-safetynet-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidSafetyNetAttestationVerifier {
    danger_ignore_timestamp: bool,
}

impl AndroidSafetyNetAttestationVerifier {
    /// Setting `danger_ignore_timestamp` skips the check that the response timestamp is not in
    /// the future. This exists only for replaying captured responses in tests.
    pub fn new(danger_ignore_timestamp: bool) -> Self {
        AndroidSafetyNetAttestationVerifier {
            danger_ignore_timestamp,
        }
    }
}

impl AttestationStatementVerifier for AndroidSafetyNetAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_ANDROID_SAFETYNET
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let (ver, response) = match registration.attestation_object().att_stmt() {
            AttestationStatement::AndroidSafetyNet { ver, response } => (ver, response),
            other => return Err(wrong_statement(FMT_ANDROID_SAFETYNET, other)),
        };

        // there's only 1 version now
        if ver.is_empty() {
            return Err(WebauthnError::BadAttestationStatement(
                "safetynet version must not be empty".to_string(),
            ));
        }

        // 2. Verify that response is a valid SafetyNet response of version ver.
        let jwsu = unverified_response(response)?;
        let certs = embedded_chain(&jwsu)?;
        let leaf_cert = certs.first().ok_or(SafetyNetError::MissingCertChain)?;

        // Verify with the embedded leaf certificate.
        let claims = jwsu
            .validate_embeded::<SafetyNetAttestResponse>()
            .map_err(SafetyNetError::from)?
            .into_inner();

        // 3. Verify that the nonce attribute in the payload of response is identical to the
        // Base64 encoding of the SHA-256 hash of the concatenation of authenticatorData and
        // clientDataHash.
        let nonce: &[u8] = claims.nonce.as_ref();
        if nonce != compute_sha256(&registration.signed_data()).as_slice() {
            return Err(SafetyNetError::NonceMismatch.into());
        }

        // 4. Verify that attestationCert is issued to the hostname "attest.android.com".
        if subject_entry(leaf_cert, Nid::COMMONNAME).as_deref() != Some(SAFETYNET_HOSTNAME) {
            return Err(SafetyNetError::InvalidHostname.into());
        }

        // 5. Verify that the ctsProfileMatch attribute in the payload of response is true.
        if !claims.cts_profile_match {
            return Err(SafetyNetError::CtsProfileMatchFailed.into());
        }

        // Verify sanity of timestamp in the payload
        if !self.danger_ignore_timestamp {
            let now = registration
                .timestamp()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_millis();
            if u128::from(claims.timestamp_ms) > now + SAFETYNET_CLOCK_SKEW_MS {
                return Err(SafetyNetError::FutureTimestamp.into());
            }
        }

        trace!(
            apk_package_name = ?claims.apk_package_name,
            basic_integrity = claims.basic_integrity,
            evaluation_type = ?claims.evaluation_type,
            "safetynet response accepted"
        );
        Ok(AttestationType::Basic)
    }
}
