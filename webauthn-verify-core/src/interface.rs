//! Types that describe credentials, ceremonies and verification outcomes. The types that a
//! caller persists (`COSEKey`, `StoredCredential`) are designed to be serialised and should
//! not change.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64urlsafedata::Base64UrlSafeData;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::constants::*;
use crate::error::{WebauthnError, WebauthnResult};

/// Representation of an AAGUID
/// <https://www.w3.org/TR/webauthn/#aaguid>
pub type Aaguid = [u8; 16];

/// A credential id as chosen by the authenticator.
pub type CredentialID = Vec<u8>;

/// A COSE signature algorithm identifier.
/// <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
#[repr(i32)]
pub enum COSEAlgorithm {
    /// ECDSA with SHA-256
    ES256 = -7,
    /// ECDSA with SHA-384
    ES384 = -35,
    /// ECDSA with SHA-512
    ES512 = -36,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256 = -257,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384 = -258,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512 = -259,
    /// RSASSA-PSS with SHA-256
    PS256 = -37,
    /// RSASSA-PSS with SHA-384
    PS384 = -38,
    /// RSASSA-PSS with SHA-512
    PS512 = -39,
    /// EdDSA
    EDDSA = -8,
    /// RSASSA-PKCS1-v1_5 with SHA-1. Only accepted on attestation certificates of TPMs that
    /// predate SHA-256 support.
    INSECURE_RS1 = -65535,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = WebauthnError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -37 => Ok(COSEAlgorithm::PS256),
            -38 => Ok(COSEAlgorithm::PS384),
            -39 => Ok(COSEAlgorithm::PS512),
            -8 => Ok(COSEAlgorithm::EDDSA),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            _ => Err(WebauthnError::DataConversion(format!(
                "unknown cose algorithm {i}"
            ))),
        }
    }
}

impl TryFrom<i64> for COSEAlgorithm {
    type Error = WebauthnError;

    fn try_from(i: i64) -> Result<Self, Self::Error> {
        COSEAlgorithm::try_from(i128::from(i))
    }
}

impl From<COSEAlgorithm> for i64 {
    fn from(alg: COSEAlgorithm) -> i64 {
        alg as i64
    }
}

impl From<COSEAlgorithm> for i128 {
    fn from(alg: COSEAlgorithm) -> i128 {
        alg as i128
    }
}

/// An ECDSACurve identifier. You probably will never need to alter
/// or use this value, as it is set inside the Credential for you.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ECDSACurve {
    // +---------+-------+----------+------------------------------------+
    // | Name    | Value | Key Type | Description                        |
    // +---------+-------+----------+------------------------------------+
    // | P-256   | 1     | EC2      | NIST P-256 also known as secp256r1 |
    // | P-384   | 2     | EC2      | NIST P-384 also known as secp384r1 |
    // | P-521   | 3     | EC2      | NIST P-521 also known as secp521r1 |
    // +---------+-------+----------+------------------------------------+
    /// Identifies this curve as SECP256R1 (X9_62_PRIME256V1 in OpenSSL)
    SECP256R1 = 1,
    /// Identifies this curve as SECP384R1
    SECP384R1 = 2,
    /// Identifies this curve as SECP521R1
    SECP521R1 = 3,
}

impl TryFrom<i128> for ECDSACurve {
    type Error = WebauthnError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(WebauthnError::DataConversion(format!(
                "unknown ecdsa curve {i}"
            ))),
        }
    }
}

impl ECDSACurve {
    /// The size in bytes of one affine coordinate on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }
}

/// An EDDSACurve identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EDDSACurve {
    /// Identifies this OKP as ED25519
    ED25519 = 6,
    /// Identifies this OKP as ED448
    ED448 = 7,
}

impl TryFrom<i128> for EDDSACurve {
    type Error = WebauthnError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            6 => Ok(EDDSACurve::ED25519),
            7 => Ok(EDDSACurve::ED448),
            _ => Err(WebauthnError::DataConversion(format!(
                "unknown eddsa curve {i}"
            ))),
        }
    }
}

impl EDDSACurve {
    /// The size in bytes of the public key on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            EDDSACurve::ED25519 => 32,
            EDDSACurve::ED448 => 57,
        }
    }
}

/// A COSE Elliptic Curve Public Key. This is generally the provided credential
/// that an authenticator registers, and is used to authenticate the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEEC2Key {
    /// The curve that this key references.
    pub curve: ECDSACurve,
    /// The key's public X coordinate.
    pub x: Vec<u8>,
    /// The key's public Y coordinate.
    pub y: Vec<u8>,
}

/// A COSE Octet Key Pair public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEOKPKey {
    /// The curve that this key references.
    pub curve: EDDSACurve,
    /// The public key.
    pub x: Vec<u8>,
}

/// A COSE RSA PublicKey.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSERSAKey {
    /// An RSA modulus
    pub n: Vec<u8>,
    /// An RSA exponent
    pub e: Vec<u8>,
}

/// The type of Key contained within a COSE value.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEKeyType {
    /// Identifies this as an Elliptic Curve octet key pair
    EC_OKP(COSEOKPKey),
    /// Identifies this as an Elliptic Curve EC2 key
    EC_EC2(COSEEC2Key),
    /// Identifies this as an RSA key
    RSA(COSERSAKey),
}

/// The numeric id of the COSEKeyType used in the CBOR fields.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i64)]
pub enum COSEKeyTypeId {
    /// Octet Key Pair
    EC_OKP = 1,
    /// Elliptic Curve Keys w/ x- and y-coordinate
    EC_EC2 = 2,
    /// RSA
    EC_RSA = 3,
}

/// A COSE Key as provided by the Authenticator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEKey {
    /// The algorithm this key signs with
    pub type_: COSEAlgorithm,
    /// The public key
    pub key: COSEKeyType,
}

/// The classification an attestation statement verifier assigns to a statement.
/// <https://www.w3.org/TR/webauthn/#sctn-attestation-types>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationType {
    /// Signed by an attestation certificate that is shared by a batch of authenticators.
    Basic,
    /// Signed by the credential private key itself.
    Self_,
    /// Signed by a key certified by an attestation CA, such as a TPM AIK.
    AttCa,
    /// Signed by a per-credential certificate from an anonymisation CA.
    AnonCa,
    /// Elliptic curve direct anonymous attestation.
    ECDAA,
    /// No attestation was provided.
    None,
    /// An attestation that could not be classified.
    Uncertain,
}

/// The result of evaluating the trust path of an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustOutcome {
    /// The certificate path chained to a trust anchor.
    Trusted,
    /// No trust anchors were known for this authenticator, so the path could not be evaluated.
    Uncertain,
    /// The attestation type carries no trust path (none or self attestation).
    NotApplicable,
}

/// Attested Credential Data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    /// The guid of the authenticator. May indicate manufacturer.
    pub aaguid: Aaguid,
    /// The credential ID.
    pub credential_id: CredentialID,
    /// The credentials public Key.
    pub credential_pk: COSEKey,
}

/// Extension outputs from the authenticator, keyed by extension identifier.
pub type AuthenticatorExtensions = BTreeMap<String, serde_cbor_2::Value>;

/// Data returned by the authenticator during a ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    /// Hash of the relying party id.
    pub rp_id_hash: [u8; 32],
    /// The raw flags byte.
    pub flags: u8,
    /// The counter of this credentials activations.
    pub counter: u32,
    /// The attested credential data, present on registration.
    pub acd: Option<AttestedCredentialData>,
    /// Extensions supplied by the device. Never an empty map.
    pub extensions: Option<AuthenticatorExtensions>,
}

impl AuthenticatorData {
    /// Build authenticator data, setting the attested credential data and extension flags from
    /// what is present so the flags and content always agree.
    pub fn new(
        rp_id_hash: [u8; 32],
        flags: u8,
        counter: u32,
        acd: Option<AttestedCredentialData>,
        extensions: Option<AuthenticatorExtensions>,
    ) -> Self {
        let extensions = extensions.filter(|e| !e.is_empty());
        let mut flags = flags & !(FLAG_ATTESTED_CREDENTIAL_DATA | FLAG_EXTENSION_DATA);
        if acd.is_some() {
            flags |= FLAG_ATTESTED_CREDENTIAL_DATA;
        }
        if extensions.is_some() {
            flags |= FLAG_EXTENSION_DATA;
        }
        AuthenticatorData {
            rp_id_hash,
            flags,
            counter,
            acd,
            extensions,
        }
    }

    /// Flag if the user was present.
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    /// Flag if the user verified to the device. Implies presence.
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// Flag if the credential may be backed up.
    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BACKUP_ELIGIBLE != 0
    }

    /// Flag if the credential is currently backed up.
    pub fn backup_state(&self) -> bool {
        self.flags & FLAG_BACKUP_STATE != 0
    }
}

/// The state of token binding as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenBindingStatus {
    /// Token binding was used on the connection.
    Present,
    /// The client supports token binding but did not negotiate it.
    Supported,
    /// The client does not support token binding.
    NotSupported,
}

/// Token binding state from the client data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    /// The status
    pub status: TokenBindingStatus,
    /// The token binding id, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Base64UrlSafeData>,
}

/// <https://w3c.github.io/webauthn/#dictdef-collectedclientdata>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    /// The ceremony type, `webauthn.create` or `webauthn.get`.
    #[serde(rename = "type")]
    pub type_: String,
    /// The challenge, base64url encoded on the wire.
    pub challenge: Base64UrlSafeData,
    /// The origin of the requesting document.
    pub origin: String,
    /// Token binding state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_binding: Option<TokenBinding>,
    /// If the request came from a cross origin iframe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
}

impl TryFrom<&[u8]> for CollectedClientData {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(data).map_err(|e| {
            debug!(?e, "invalid client data json");
            WebauthnError::DataConversion(format!("client data: {e}"))
        })
    }
}

/// A web origin as compared by the verifier.
///
/// For `http` and `https` two origins are equal when scheme, host and port match, with
/// default ports filled in, so `https://example.com` equals `https://example.com:443`.
/// Other schemes, such as `android:apk-key-hash:...`, compare their full serialised form.
#[derive(Debug, Clone)]
pub struct Origin {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    serialized: String,
}

impl Origin {
    fn is_web(&self) -> bool {
        self.scheme == "https" || self.scheme == "http"
    }
}

impl FromStr for Origin {
    type Err = WebauthnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| {
            debug!(?e, origin = %s, "unparseable origin");
            WebauthnError::BadOrigin
        })?;
        let scheme = url.scheme().to_string();
        let origin = match scheme.as_str() {
            "https" | "http" => {
                // An origin is scheme, host and port only.
                let has_userinfo = !url.username().is_empty() || url.password().is_some();
                let has_path = !matches!(url.path(), "" | "/");
                if has_userinfo || has_path || url.query().is_some() || url.fragment().is_some() {
                    debug!(origin = %s, "origin carries more than scheme, host and port");
                    return Err(WebauthnError::BadOrigin);
                }
                let host = url
                    .host_str()
                    .ok_or(WebauthnError::BadOrigin)?
                    .to_ascii_lowercase();
                Origin {
                    scheme,
                    host: Some(host),
                    port: url.port_or_known_default(),
                    serialized: s.to_string(),
                }
            }
            _ => Origin {
                scheme,
                host: None,
                port: None,
                serialized: s.to_string(),
            },
        };
        Ok(origin)
    }
}

impl TryFrom<&Url> for Origin {
    type Error = WebauthnError;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        Origin::from_str(url.as_str())
    }
}

impl PartialEq for Origin {
    fn eq(&self, other: &Self) -> bool {
        if self.is_web() && other.is_web() {
            self.scheme == other.scheme && self.host == other.host && self.port == other.port
        } else {
            self.serialized == other.serialized
        }
    }
}

impl Eq for Origin {}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => write!(f, "{}://{}:{}", self.scheme, host, port),
            _ => write!(f, "{}", self.serialized),
        }
    }
}

/// The relying party context of a single ceremony: what origins are allowed, the relying party
/// id, and the challenge that was issued for this ceremony by the challenge collaborator.
#[derive(Debug, Clone)]
pub struct ServerProperty {
    pub(crate) origins: Vec<Origin>,
    pub(crate) rp_id: String,
    pub(crate) challenge: Option<Vec<u8>>,
    pub(crate) token_binding_id: Option<Vec<u8>>,
}

impl ServerProperty {
    /// Create the context for a ceremony. `challenge` is `None` when the challenge store had no
    /// challenge for this ceremony, which causes verification to fail.
    pub fn new(origin: &Url, rp_id: &str, challenge: Option<Vec<u8>>) -> WebauthnResult<Self> {
        Ok(ServerProperty {
            origins: vec![Origin::try_from(origin)?],
            rp_id: rp_id.to_string(),
            challenge,
            token_binding_id: None,
        })
    }

    /// Allow an additional origin for this ceremony.
    pub fn with_origin(mut self, origin: &str) -> WebauthnResult<Self> {
        self.origins.push(Origin::from_str(origin)?);
        Ok(self)
    }

    /// Set the token binding id of the TLS connection this ceremony arrived on.
    pub fn with_token_binding_id(mut self, id: Vec<u8>) -> Self {
        self.token_binding_id = Some(id);
        self
    }

    /// The relying party id.
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// The allowed origins.
    pub fn origins(&self) -> &[Origin] {
        &self.origins
    }
}

/// A previously registered credential, supplied by the credential store for an authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// The ID of this credential.
    pub credential_id: CredentialID,
    /// The public key of this credential
    pub public_key: COSEKey,
    /// The last signature counter that was persisted for this credential.
    pub counter: u32,
}

/// The raw values of an assertion as returned by the client.
#[derive(Debug, Clone)]
pub struct AuthenticationRequest<'a> {
    /// The credential id the client used.
    pub credential_id: &'a [u8],
    /// The raw authenticator data.
    pub authenticator_data: &'a [u8],
    /// The raw client data json.
    pub client_data_json: &'a [u8],
    /// The assertion signature.
    pub signature: &'a [u8],
}

/// The outcome of a successful registration. The caller persists the credential id, public key
/// and counter.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// The attestation statement format that was verified.
    pub format: String,
    /// How the attestation statement was classified.
    pub attestation_type: AttestationType,
    /// The result of evaluating the attestation trust path.
    pub trust: TrustOutcome,
    /// The authenticator model.
    pub aaguid: Uuid,
    /// The new credential id.
    pub credential_id: CredentialID,
    /// The new credential public key.
    pub public_key: COSEKey,
    /// The initial signature counter.
    pub counter: u32,
    /// If the user was verified during registration.
    pub user_verified: bool,
    /// If the credential may be backed up.
    pub backup_eligible: bool,
    /// If the credential is backed up.
    pub backup_state: bool,
    /// Authenticator extension outputs.
    pub extensions: Option<AuthenticatorExtensions>,
}

impl RegistrationResult {
    /// The credential record the caller should persist.
    pub fn to_stored_credential(&self) -> StoredCredential {
        StoredCredential {
            credential_id: self.credential_id.clone(),
            public_key: self.public_key.clone(),
            counter: self.counter,
        }
    }
}

/// The outcome of a successful authentication. The counter is validated but never persisted
/// here; when `needs_update` is set the caller writes `counter` back to its credential store
/// with compare-and-swap semantics.
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    /// The credential that was used.
    pub credential_id: CredentialID,
    /// The validated counter reported by the authenticator.
    pub counter: u32,
    /// If the stored counter should be updated.
    pub needs_update: bool,
    /// If the user was verified.
    pub user_verified: bool,
    /// If the credential may be backed up.
    pub backup_eligible: bool,
    /// If the credential is backed up.
    pub backup_state: bool,
    /// Authenticator extension outputs.
    pub extensions: Option<AuthenticatorExtensions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(s: &str) -> Origin {
        Origin::from_str(s).unwrap()
    }

    #[test]
    fn origin_default_port_equality() {
        assert_eq!(origin("https://example.com"), origin("https://example.com:443"));
        assert_eq!(origin("http://example.com"), origin("http://example.com:80"));
        assert_eq!(origin("https://EXAMPLE.com/"), origin("https://example.com"));
    }

    #[test]
    fn origin_mismatch() {
        // scheme
        assert_ne!(origin("http://example.com"), origin("https://example.com"));
        // host
        assert_ne!(origin("https://example.com"), origin("https://www.example.com"));
        // port
        assert_ne!(origin("https://example.com"), origin("https://example.com:8443"));
        assert_ne!(origin("https://example.com:80"), origin("http://example.com:80"));
    }

    #[test]
    fn origin_opaque_schemes() {
        let apk = "android:apk-key-hash:pNiP5iKyQ8JwgGOaKA1zGPUPJIS-0H1xKCQcfIoGLck";
        assert_eq!(origin(apk), origin(apk));
        assert_ne!(
            origin(apk),
            origin("android:apk-key-hash:AAAP5iKyQ8JwgGOaKA1zGPUPJIS-0H1xKCQcfIoGLck")
        );
        assert_ne!(origin(apk), origin("https://example.com"));
    }

    #[test]
    fn origin_unparseable() {
        for s in [
            "not an origin",
            "https://u@example.com",
            "https://u:p@example.com/",
            "https://example.com/x",
            "https://example.com/?q=1",
            "https://example.com#top",
        ] {
            assert!(
                matches!(Origin::from_str(s), Err(WebauthnError::BadOrigin)),
                "{s}"
            );
        }
    }

    #[test]
    fn client_data_parse() {
        let json = br#"{"type":"webauthn.get","challenge":"AAECAw","origin":"https://example.com","tokenBinding":{"status":"supported"},"crossOrigin":false}"#;
        let cd = CollectedClientData::try_from(json.as_slice()).unwrap();
        assert_eq!(cd.type_, "webauthn.get");
        let challenge: &[u8] = cd.challenge.as_ref();
        assert_eq!(challenge, &[0u8, 1, 2, 3]);
        assert_eq!(
            cd.token_binding.map(|t| t.status),
            Some(TokenBindingStatus::Supported)
        );

        let bad = br#"{"type":"webauthn.get","challenge":"AAECAw","origin":"https://example.com","tokenBinding":{"status":"bogus"}}"#;
        assert!(matches!(
            CollectedClientData::try_from(bad.as_slice()),
            Err(WebauthnError::DataConversion(_))
        ));

        assert!(CollectedClientData::try_from(b"{".as_slice()).is_err());
    }

    #[test]
    fn authenticator_data_flags_follow_content() {
        let ad = AuthenticatorData::new([0; 32], 0xff, 1, None, Some(BTreeMap::new()));
        assert_eq!(ad.flags & FLAG_ATTESTED_CREDENTIAL_DATA, 0);
        assert_eq!(ad.flags & FLAG_EXTENSION_DATA, 0);
        assert!(ad.extensions.is_none());
        assert!(ad.user_present());
        assert!(ad.user_verified());
    }
}
