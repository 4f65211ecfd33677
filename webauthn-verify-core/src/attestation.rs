//! Attestation statements and the verifiers that check them.
//!
//! An attestation object carries one statement whose shape depends on its `fmt`. The statement
//! is decoded into the closed [`AttestationStatement`] sum type, then an
//! [`AttestationVerifierRegistry`] selects the verifier registered for that exact format string
//! and asks it to check the format specific signature and classify the attestation.

use std::collections::BTreeMap;
use std::sync::Arc;

use der_parser::oid::Oid;
use openssl::x509;
use serde_cbor_2::Value;

use crate::asn1;
use crate::config::VerifierPolicy;
use crate::constants::*;
use crate::crypto;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::internals::{cbor_from_slice, cbor_to_vec};
use crate::registration::RegistrationObject;

mod android_key;
pub(crate) mod android_safetynet;
mod apple;
mod apple_appattest;
mod fido_u2f;
mod none;
mod packed;
mod tpm;

pub use self::android_key::AndroidKeyAttestationVerifier;
pub use self::android_safetynet::AndroidSafetyNetAttestationVerifier;
pub use self::apple::AppleAnonymousAttestationVerifier;
pub use self::apple_appattest::AppleAppAttestAttestationVerifier;
pub use self::fido_u2f::FidoU2FAttestationVerifier;
pub use self::none::NoneAttestationVerifier;
pub use self::packed::PackedAttestationVerifier;
pub use self::tpm::TpmAttestationVerifier;

/// An attestation certificate path in DER, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePath(Vec<Vec<u8>>);

impl CertificatePath {
    /// Create a path from DER certificates, leaf first.
    pub fn new(certificates: Vec<Vec<u8>>) -> Self {
        CertificatePath(certificates)
    }

    /// The DER certificates, leaf first.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// If the path holds no certificates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode every certificate of the path.
    pub fn to_x509(&self) -> WebauthnResult<Vec<x509::X509>> {
        self.0
            .iter()
            .map(|der| x509::X509::from_der(der).map_err(WebauthnError::certificate))
            .collect()
    }

    /// Decode the leaf certificate.
    pub fn leaf(&self) -> WebauthnResult<x509::X509> {
        let der = self.0.first().ok_or_else(|| {
            WebauthnError::BadAttestationStatement("x5c must not be empty".to_string())
        })?;
        x509::X509::from_der(der).map_err(WebauthnError::certificate)
    }

    fn from_cbor(v: &Value) -> WebauthnResult<Self> {
        let arr = cbor_try_array!(v)?;
        let certificates = arr
            .iter()
            .map(|c| cbor_try_bytes!(c).map(|b| b.clone()))
            .collect::<WebauthnResult<Vec<_>>>()?;
        Ok(CertificatePath(certificates))
    }

    fn to_cbor(&self) -> Value {
        Value::Array(self.0.iter().cloned().map(Value::Bytes).collect())
    }
}

/// A decoded attestation statement. The format is implied by the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationStatement {
    /// `none`: no attestation was provided.
    None,
    /// `fido-u2f`
    FidoU2F {
        /// The attestation certificate path.
        x5c: CertificatePath,
        /// The signature.
        sig: Vec<u8>,
    },
    /// `packed`
    Packed {
        /// The signing algorithm.
        alg: COSEAlgorithm,
        /// The signature.
        sig: Vec<u8>,
        /// The attestation certificate path, absent for self attestation.
        x5c: Option<CertificatePath>,
        /// The ECDAA key id, for ECDAA attestation.
        ecdaa_key_id: Option<Vec<u8>>,
    },
    /// `tpm`
    Tpm {
        /// The TPM specification version the signature conforms to.
        ver: String,
        /// The signing algorithm.
        alg: COSEAlgorithm,
        /// The AIK certificate path.
        x5c: Option<CertificatePath>,
        /// The ECDAA key id, for ECDAA attestation.
        ecdaa_key_id: Option<Vec<u8>>,
        /// The signature over `cert_info`.
        sig: Vec<u8>,
        /// The TPMS_ATTEST structure.
        cert_info: Vec<u8>,
        /// The TPMT_PUBLIC structure of the credential key.
        pub_area: Vec<u8>,
    },
    /// `android-key`
    AndroidKey {
        /// The signing algorithm.
        alg: COSEAlgorithm,
        /// The signature.
        sig: Vec<u8>,
        /// The key attestation certificate path.
        x5c: CertificatePath,
    },
    /// `android-safetynet`
    AndroidSafetyNet {
        /// The Google Play Services version.
        ver: String,
        /// The compact JWS returned by the SafetyNet API.
        response: Vec<u8>,
    },
    /// `apple`: anonymous attestation.
    AppleAnonymous {
        /// The credential certificate path.
        x5c: CertificatePath,
    },
    /// `apple-appattest`
    AppleAppAttest {
        /// The credential certificate path.
        x5c: CertificatePath,
        /// The App Attest receipt.
        receipt: Vec<u8>,
    },
}

fn field_bytes(m: &BTreeMap<Value, Value>, key: &str) -> WebauthnResult<Vec<u8>> {
    cbor_map_field!(m, key).and_then(|v| cbor_try_bytes!(v).map(|b| b.clone()))
}

fn field_string(m: &BTreeMap<Value, Value>, key: &str) -> WebauthnResult<String> {
    cbor_map_field!(m, key).and_then(|v| cbor_try_string!(v).map(|s| s.clone()))
}

fn field_alg(m: &BTreeMap<Value, Value>) -> WebauthnResult<COSEAlgorithm> {
    cbor_map_field!(m, "alg")
        .and_then(|v| cbor_try_i128!(v))
        .and_then(COSEAlgorithm::try_from)
}

fn field_x5c(m: &BTreeMap<Value, Value>) -> WebauthnResult<CertificatePath> {
    cbor_map_field!(m, "x5c").and_then(CertificatePath::from_cbor)
}

fn optional<T>(r: WebauthnResult<T>) -> WebauthnResult<Option<T>> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(WebauthnError::BadAttestationStatement(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn text_key(k: &str) -> Value {
    Value::Text(k.to_string())
}

impl AttestationStatement {
    /// Decode the `attStmt` map of an attestation object with format `fmt`.
    ///
    /// A missing required field is a bad statement, a field of the wrong type is a data
    /// conversion error, and an unknown format is unsupported.
    pub fn from_cbor(fmt: &str, att_stmt: &Value) -> WebauthnResult<Self> {
        let m = cbor_try_map!(att_stmt)?;

        let stmt = match fmt {
            FMT_NONE => {
                if !m.is_empty() {
                    return Err(WebauthnError::BadAttestationStatement(
                        "none attestation must have an empty statement".to_string(),
                    ));
                }
                AttestationStatement::None
            }
            FMT_FIDO_U2F => AttestationStatement::FidoU2F {
                x5c: field_x5c(m)?,
                sig: field_bytes(m, "sig")?,
            },
            FMT_PACKED => AttestationStatement::Packed {
                alg: field_alg(m)?,
                sig: field_bytes(m, "sig")?,
                x5c: optional(field_x5c(m))?,
                ecdaa_key_id: optional(field_bytes(m, "ecdaaKeyId"))?,
            },
            FMT_TPM => AttestationStatement::Tpm {
                ver: field_string(m, "ver")?,
                alg: field_alg(m)?,
                x5c: optional(field_x5c(m))?,
                ecdaa_key_id: optional(field_bytes(m, "ecdaaKeyId"))?,
                sig: field_bytes(m, "sig")?,
                cert_info: field_bytes(m, "certInfo")?,
                pub_area: field_bytes(m, "pubArea")?,
            },
            FMT_ANDROID_KEY => AttestationStatement::AndroidKey {
                alg: field_alg(m)?,
                sig: field_bytes(m, "sig")?,
                x5c: field_x5c(m)?,
            },
            FMT_ANDROID_SAFETYNET => AttestationStatement::AndroidSafetyNet {
                ver: field_string(m, "ver")?,
                response: field_bytes(m, "response")?,
            },
            FMT_APPLE => AttestationStatement::AppleAnonymous { x5c: field_x5c(m)? },
            FMT_APPLE_APPATTEST => AttestationStatement::AppleAppAttest {
                x5c: field_x5c(m)?,
                receipt: field_bytes(m, "receipt")?,
            },
            unknown => {
                debug!(?unknown, "unsupported attestation format");
                return Err(WebauthnError::UnsupportedAttestationFormat(
                    unknown.to_string(),
                ));
            }
        };

        trace!(?stmt);
        Ok(stmt)
    }

    /// Encode this statement as an `attStmt` map.
    pub fn to_cbor(&self) -> Value {
        let mut m = BTreeMap::new();
        match self {
            AttestationStatement::None => {}
            AttestationStatement::FidoU2F { x5c, sig } => {
                m.insert(text_key("x5c"), x5c.to_cbor());
                m.insert(text_key("sig"), Value::Bytes(sig.clone()));
            }
            AttestationStatement::Packed {
                alg,
                sig,
                x5c,
                ecdaa_key_id,
            } => {
                m.insert(text_key("alg"), Value::Integer(i128::from(*alg)));
                m.insert(text_key("sig"), Value::Bytes(sig.clone()));
                if let Some(x5c) = x5c {
                    m.insert(text_key("x5c"), x5c.to_cbor());
                }
                if let Some(id) = ecdaa_key_id {
                    m.insert(text_key("ecdaaKeyId"), Value::Bytes(id.clone()));
                }
            }
            AttestationStatement::Tpm {
                ver,
                alg,
                x5c,
                ecdaa_key_id,
                sig,
                cert_info,
                pub_area,
            } => {
                m.insert(text_key("ver"), Value::Text(ver.clone()));
                m.insert(text_key("alg"), Value::Integer(i128::from(*alg)));
                if let Some(x5c) = x5c {
                    m.insert(text_key("x5c"), x5c.to_cbor());
                }
                if let Some(id) = ecdaa_key_id {
                    m.insert(text_key("ecdaaKeyId"), Value::Bytes(id.clone()));
                }
                m.insert(text_key("sig"), Value::Bytes(sig.clone()));
                m.insert(text_key("certInfo"), Value::Bytes(cert_info.clone()));
                m.insert(text_key("pubArea"), Value::Bytes(pub_area.clone()));
            }
            AttestationStatement::AndroidKey { alg, sig, x5c } => {
                m.insert(text_key("alg"), Value::Integer(i128::from(*alg)));
                m.insert(text_key("sig"), Value::Bytes(sig.clone()));
                m.insert(text_key("x5c"), x5c.to_cbor());
            }
            AttestationStatement::AndroidSafetyNet { ver, response } => {
                m.insert(text_key("ver"), Value::Text(ver.clone()));
                m.insert(text_key("response"), Value::Bytes(response.clone()));
            }
            AttestationStatement::AppleAnonymous { x5c } => {
                m.insert(text_key("x5c"), x5c.to_cbor());
            }
            AttestationStatement::AppleAppAttest { x5c, receipt } => {
                m.insert(text_key("x5c"), x5c.to_cbor());
                m.insert(text_key("receipt"), Value::Bytes(receipt.clone()));
            }
        }
        Value::Map(m)
    }

    /// The format identifier of this statement.
    pub fn format(&self) -> &'static str {
        match self {
            AttestationStatement::None => FMT_NONE,
            AttestationStatement::FidoU2F { .. } => FMT_FIDO_U2F,
            AttestationStatement::Packed { .. } => FMT_PACKED,
            AttestationStatement::Tpm { .. } => FMT_TPM,
            AttestationStatement::AndroidKey { .. } => FMT_ANDROID_KEY,
            AttestationStatement::AndroidSafetyNet { .. } => FMT_ANDROID_SAFETYNET,
            AttestationStatement::AppleAnonymous { .. } => FMT_APPLE,
            AttestationStatement::AppleAppAttest { .. } => FMT_APPLE_APPATTEST,
        }
    }

    /// The certificate path this statement presents for trust evaluation, if any. For
    /// SafetyNet this is taken from the header of the signed response.
    pub fn trust_path(&self) -> WebauthnResult<Option<CertificatePath>> {
        match self {
            AttestationStatement::None => Ok(None),
            AttestationStatement::FidoU2F { x5c, .. }
            | AttestationStatement::AndroidKey { x5c, .. }
            | AttestationStatement::AppleAnonymous { x5c }
            | AttestationStatement::AppleAppAttest { x5c, .. } => Ok(Some(x5c.clone())),
            AttestationStatement::Packed { x5c, .. } | AttestationStatement::Tpm { x5c, .. } => {
                Ok(x5c.clone())
            }
            AttestationStatement::AndroidSafetyNet { response, .. } => {
                android_safetynet::response_certificate_path(response).map(Some)
            }
        }
    }
}

/// A decoded attestation object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationObject {
    auth_data: AuthenticatorData,
    auth_data_bytes: Vec<u8>,
    att_stmt: AttestationStatement,
}

impl AttestationObject {
    /// Assemble an attestation object, encoding the authenticator data.
    pub fn new(auth_data: AuthenticatorData, att_stmt: AttestationStatement) -> WebauthnResult<Self> {
        let auth_data_bytes = auth_data.to_bytes()?;
        Ok(AttestationObject {
            auth_data,
            auth_data_bytes,
            att_stmt,
        })
    }

    /// The parsed authenticator data.
    pub fn auth_data(&self) -> &AuthenticatorData {
        &self.auth_data
    }

    /// The authenticator data exactly as it was signed.
    pub fn auth_data_bytes(&self) -> &[u8] {
        &self.auth_data_bytes
    }

    /// The attestation statement.
    pub fn att_stmt(&self) -> &AttestationStatement {
        &self.att_stmt
    }

    /// The attestation format, derived from the statement.
    pub fn format(&self) -> &'static str {
        self.att_stmt.format()
    }

    /// Encode to the attestation object cbor map.
    pub fn to_bytes(&self) -> WebauthnResult<Vec<u8>> {
        let mut m = BTreeMap::new();
        m.insert(text_key("fmt"), Value::Text(self.format().to_string()));
        m.insert(text_key("attStmt"), self.att_stmt.to_cbor());
        m.insert(text_key("authData"), Value::Bytes(self.auth_data_bytes.clone()));
        cbor_to_vec(&Value::Map(m))
    }
}

impl TryFrom<&[u8]> for AttestationObject {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<AttestationObject, WebauthnError> {
        let v = cbor_from_slice(data)?;
        let m = cbor_try_map!(&v)?;

        let get = |k: &str| {
            m.get(&text_key(k)).ok_or_else(|| {
                debug!(field = %k, "attestation object is missing a field");
                WebauthnError::DataConversion(format!("attestation object is missing {k}"))
            })
        };

        let auth_data_bytes = cbor_try_bytes!(get("authData")?)?.clone();
        let fmt = cbor_try_string!(get("fmt")?)?;
        let att_stmt = AttestationStatement::from_cbor(fmt, get("attStmt")?)?;
        let auth_data = AuthenticatorData::try_from(auth_data_bytes.as_slice())?;

        Ok(AttestationObject {
            auth_data,
            auth_data_bytes,
            att_stmt,
        })
    }
}

/// A verifier for one attestation statement format.
pub trait AttestationStatementVerifier: Send + Sync {
    /// The format identifier this verifier handles.
    fn format(&self) -> &'static str;

    /// If this verifier can verify the statement of `registration`.
    fn supports(&self, registration: &RegistrationObject) -> bool {
        registration.attestation_object().format() == self.format()
    }

    /// Check the statement signature and classify the attestation. Trust of any certificate
    /// path is evaluated separately.
    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType>;
}

pub(crate) fn wrong_statement(expected: &str, stmt: &AttestationStatement) -> WebauthnError {
    error!(%expected, found = %stmt.format(), "attestation verifier dispatched the wrong statement");
    WebauthnError::IllegalArgument(format!(
        "{expected} verifier cannot verify a {} statement",
        stmt.format()
    ))
}

/// The set of statement verifiers, keyed by exact format identifier.
#[derive(Clone)]
pub struct AttestationVerifierRegistry {
    verifiers: BTreeMap<&'static str, Arc<dyn AttestationStatementVerifier>>,
}

impl std::fmt::Debug for AttestationVerifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.verifiers.keys()).finish()
    }
}

impl AttestationVerifierRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        AttestationVerifierRegistry {
            verifiers: BTreeMap::new(),
        }
    }

    /// A registry with a verifier for every known format, configured from `policy`.
    pub fn new(policy: &VerifierPolicy) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NoneAttestationVerifier));
        registry.register(Arc::new(FidoU2FAttestationVerifier));
        registry.register(Arc::new(PackedAttestationVerifier));
        registry.register(Arc::new(TpmAttestationVerifier));
        registry.register(Arc::new(AndroidKeyAttestationVerifier::new(
            policy.tee_enforced_only,
        )));
        registry.register(Arc::new(AndroidSafetyNetAttestationVerifier::new(
            policy.danger_ignore_safetynet_timestamp,
        )));
        registry.register(Arc::new(AppleAnonymousAttestationVerifier));
        registry.register(Arc::new(AppleAppAttestAttestationVerifier));
        registry
    }

    /// Add or replace the verifier for its format.
    pub fn register(&mut self, verifier: Arc<dyn AttestationStatementVerifier>) {
        self.verifiers.insert(verifier.format(), verifier);
    }

    /// Remove the verifier for `format`, so statements of that format are rejected.
    pub fn unregister(&mut self, format: &str) {
        self.verifiers.remove(format);
    }

    /// Dispatch the statement of `registration` to the verifier for its format.
    pub fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        let fmt = registration.attestation_object().format();
        let verifier = self
            .verifiers
            .get(fmt)
            .filter(|v| v.supports(registration))
            .ok_or_else(|| {
                debug!(%fmt, "no verifier configured for format");
                WebauthnError::UnsupportedAttestationFormat(fmt.to_string())
            })?;

        let attestation_type = verifier.verify(registration)?;
        debug!(%fmt, ?attestation_type, "attestation statement verified");
        Ok(attestation_type)
    }
}

/// x509 certificate extensions are validated by checking that the value of the extension is
/// equal to some other value.
pub trait AttestationX509Extension {
    /// The type of the value in the certificate extension.
    type Output: Eq;

    /// The oid of the extension.
    const OID: Oid<'static>;

    /// If `true`, validating this certificate fails if this extension is missing.
    const IS_REQUIRED: bool;

    /// How to parse the value out of the DER of the certificate extension.
    fn parse(value: &[u8]) -> WebauthnResult<Self::Output>;

    /// The error to return if the extension holds a different value.
    fn validation_error() -> WebauthnError;
}

/// The Fido AAGUID x509 extension.
pub struct FidoGenCeAaguid;

impl AttestationX509Extension for FidoGenCeAaguid {
    type Output = Aaguid;

    // If cert contains an extension with OID 1 3 6 1 4 1 45724 1 1 4 (id-fido-gen-ce-aaguid)
    // verify that the value of this extension matches the aaguid in authenticatorData.
    const OID: Oid<'static> = OID_FIDO_GEN_CE_AAGUID;

    const IS_REQUIRED: bool = false;

    fn parse(value: &[u8]) -> WebauthnResult<Aaguid> {
        let node = asn1::parse(value)?;
        Aaguid::try_from(node.as_octet_string()?).map_err(|_| {
            WebauthnError::DataConversion("aaguid extension has an invalid length".to_string())
        })
    }

    fn validation_error() -> WebauthnError {
        WebauthnError::BadAaguid
    }
}

/// The Apple nonce extension, `SEQUENCE { [1] EXPLICIT OCTET STRING }`.
pub(crate) struct AppleNonce;

impl AttestationX509Extension for AppleNonce {
    type Output = [u8; 32];

    const OID: Oid<'static> = OID_APPLE_NONCE;

    const IS_REQUIRED: bool = true;

    fn parse(value: &[u8]) -> WebauthnResult<[u8; 32]> {
        let seq = asn1::parse(value)?;
        let tagged = seq.find_context(1)?.ok_or_else(|| {
            WebauthnError::DataConversion("apple nonce extension is missing [1]".to_string())
        })?;
        let nonce = tagged.child(0)?.as_octet_string()?;
        <[u8; 32]>::try_from(nonce).map_err(|_| {
            WebauthnError::DataConversion("apple nonce has an invalid length".to_string())
        })
    }

    fn validation_error() -> WebauthnError {
        WebauthnError::BadAttestationStatement("certificate nonce does not match".to_string())
    }
}

/// Validate an x509 extension of `certificate` against `data`.
pub fn validate_extension<T>(
    certificate: &x509::X509Ref,
    data: &<T as AttestationX509Extension>::Output,
) -> WebauthnResult<()>
where
    T: AttestationX509Extension,
{
    let der = certificate.to_der()?;
    match crypto::certificate_extension(&der, &T::OID)? {
        Some(value) => {
            if &T::parse(value)? == data {
                Ok(())
            } else {
                debug!(oid = ?T::OID, "certificate extension value mismatch");
                Err(T::validation_error())
            }
        }
        None if T::IS_REQUIRED => {
            debug!(oid = ?T::OID, "certificate is missing a required extension");
            Err(WebauthnError::BadAttestationStatement(format!(
                "certificate is missing extension {}",
                T::OID.to_id_string()
            )))
        }
        None => Ok(()),
    }
}
