//! A software authenticator that produces registration and authentication responses for
//! tests. It owns a throwaway attestation CA, an attestation certificate issued by that CA and
//! a single P-256 credential. The CA also issues the per-credential certificates of the
//! android-key, SafetyNet and App Attest formats.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose, Engine as _};
use der_parser::oid::Oid;
use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Extension, X509NameBuilder, X509};
use openssl::{error::ErrorStack, rand};

use base64urlsafedata::Base64UrlSafeData;
use serde_cbor_2::Value;
use uuid::Uuid;

use crate::attestation::android_safetynet::SafetyNetAttestResponse;
use crate::attestation::{AttestationObject, AttestationStatement, CertificatePath};
use crate::constants::{
    CLIENT_DATA_TYPE_CREATE, CLIENT_DATA_TYPE_GET, OID_ANDROID_KEY_ATTESTATION,
    OID_APPLE_NONCE, OID_FIDO_GEN_CE_AAGUID, SAFETYNET_HOSTNAME,
};
use crate::crypto::compute_sha256;
use crate::interface::*;

const FLAGS_USER_PRESENT: u8 = 0x01;

const ATTESTATION_SUBJECT: &[(&str, &str)] = &[
    ("C", "AU"),
    ("ST", "QLD"),
    ("O", "Webauthn Verify Core"),
    ("CN", "Soft Token Attestation"),
    ("OU", "Authenticator Attestation"),
];

// Android KeyMaster AuthorizationList encodings.
// SEQUENCE { [1] { SET { INTEGER 2 } }, [702] { INTEGER 0 } }
pub(crate) const KM_SIGN_GENERATED: [u8; 16] =
    hex_literal::hex!("30 0e a1 05 31 03 02 01 02 bf 85 3e 03 02 01 00");
// SEQUENCE { [600] { NULL } }
pub(crate) const KM_ALL_APPLICATIONS: [u8; 8] = hex_literal::hex!("30 06 bf 84 58 02 05 00");
pub(crate) const KM_EMPTY: [u8; 2] = hex_literal::hex!("30 00");

/// An android KeyDescription with TEE security levels and the given authorization lists.
pub(crate) fn android_key_description(challenge: &[u8], software: &[u8], tee: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    // attestationVersion 3, SecurityLevel TEE, keymasterVersion 4, SecurityLevel TEE
    body.extend_from_slice(&hex_literal::hex!("02 01 03 0a 01 01 02 01 04 0a 01 01"));
    body.push(0x04);
    body.push(u8::try_from(challenge.len()).unwrap());
    body.extend_from_slice(challenge);
    // uniqueId
    body.extend_from_slice(&hex_literal::hex!("04 00"));
    body.extend_from_slice(software);
    body.extend_from_slice(tee);
    assert!(body.len() < 0x80);
    let mut out = vec![0x30, body.len() as u8];
    out.extend_from_slice(&body);
    out
}

fn generate_ec(nid: Nid) -> Result<PKey<Private>, ErrorStack> {
    EcGroup::from_curve_name(nid)
        .and_then(|group| EcKey::generate(&group))
        .and_then(PKey::from_ec_key)
}

fn valid_now() -> Result<(Asn1Time, Asn1Time), ErrorStack> {
    Ok((Asn1Time::days_from_now(0)?, Asn1Time::days_from_now(1)?))
}

/// The test CA: a self signed P-256 root that issues every leaf of the token.
struct Issuer {
    key: PKey<Private>,
    cert: X509,
}

impl Issuer {
    fn new(unique_id: Uuid) -> Result<Self, ErrorStack> {
        let key = generate_ec(Nid::X9_62_PRIME256V1)?;

        let mut x509_name = X509NameBuilder::new()?;
        x509_name.append_entry_by_text("C", "AU")?;
        x509_name.append_entry_by_text("ST", "QLD")?;
        x509_name.append_entry_by_text("O", "Webauthn Verify Core")?;
        // The subject must be unique so that store verification cannot pick another token's CA.
        x509_name.append_entry_by_text("CN", &format!("Soft Token CA {unique_id}"))?;
        let x509_name = x509_name.build();

        let mut cert_builder = X509::builder()?;
        // 2 means version 3.
        cert_builder.set_version(2)?;
        let serial_number = BigNum::from_u32(1).and_then(|serial| serial.to_asn1_integer())?;
        cert_builder.set_serial_number(&serial_number)?;
        cert_builder.set_subject_name(&x509_name)?;
        cert_builder.set_issuer_name(&x509_name)?;
        let (not_before, not_after) = valid_now()?;
        cert_builder.set_not_before(&not_before)?;
        cert_builder.set_not_after(&not_after)?;

        cert_builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        cert_builder.append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()?,
        )?;
        let subject_key_identifier =
            SubjectKeyIdentifier::new().build(&cert_builder.x509v3_context(None, None))?;
        cert_builder.append_extension(subject_key_identifier)?;

        cert_builder.set_pubkey(&key)?;
        cert_builder.sign(&key, MessageDigest::sha256())?;

        Ok(Issuer {
            key,
            cert: cert_builder.build(),
        })
    }

    /// Issue an end entity certificate for `key`, with extra non critical extensions given as
    /// (oid, DER value).
    fn issue(
        &self,
        key: &PKeyRef<Private>,
        subject: &[(&str, &str)],
        extensions: &[(Oid<'static>, Vec<u8>)],
        (not_before, not_after): (Asn1Time, Asn1Time),
    ) -> Result<X509, ErrorStack> {
        let mut x509_name = X509NameBuilder::new()?;
        for (field, value) in subject.iter() {
            x509_name.append_entry_by_text(field, value)?;
        }
        let x509_name = x509_name.build();

        let mut cert_builder = X509::builder()?;
        cert_builder.set_version(2)?;
        let serial_number = BigNum::from_u32(2).and_then(|serial| serial.to_asn1_integer())?;
        cert_builder.set_serial_number(&serial_number)?;
        cert_builder.set_pubkey(key)?;
        cert_builder.set_subject_name(&x509_name)?;
        cert_builder.set_issuer_name(self.cert.subject_name())?;
        cert_builder.set_not_before(&not_before)?;
        cert_builder.set_not_after(&not_after)?;

        cert_builder.append_extension(BasicConstraints::new().build()?)?;
        cert_builder.append_extension(
            KeyUsage::new()
                .critical()
                .non_repudiation()
                .digital_signature()
                .build()?,
        )?;

        let subject_key_identifier = SubjectKeyIdentifier::new()
            .build(&cert_builder.x509v3_context(Some(&self.cert), None))?;
        cert_builder.append_extension(subject_key_identifier)?;
        let auth_key_identifier = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&cert_builder.x509v3_context(Some(&self.cert), None))?;
        cert_builder.append_extension(auth_key_identifier)?;

        for (oid, der) in extensions.iter() {
            let oid: Asn1Object = Asn1Object::from_str(&oid.to_id_string())?;
            let der: Asn1OctetString = Asn1OctetString::new_from_bytes(der)?;
            let extension = X509Extension::new_from_der(&oid, false, &der)?;
            cert_builder.append_extension(extension)?;
        }

        cert_builder.sign(&self.key, MessageDigest::sha256())?;
        Ok(cert_builder.build())
    }

    /// `leaf` followed by this CA.
    fn path(&self, leaf: &X509) -> CertificatePath {
        CertificatePath::new(vec![leaf.to_der().unwrap(), self.cert.to_der().unwrap()])
    }
}

fn aaguid_extension(aaguid: &Aaguid) -> (Oid<'static>, Vec<u8>) {
    // id-fido-gen-ce-aaguid holds the aaguid as an OCTET STRING.
    let mut aaguid_der = vec![0x04, 0x10];
    aaguid_der.extend_from_slice(aaguid);
    (OID_FIDO_GEN_CE_AAGUID, aaguid_der)
}

fn sign(key: &PKeyRef<Private>, data: &[u8]) -> Vec<u8> {
    let mut signer = Signer::new(MessageDigest::sha256(), key).unwrap();
    signer.update(data).unwrap();
    signer.sign_to_vec().unwrap()
}

/// Encode client data json the way a browser would.
pub(crate) fn client_data_json(
    type_: &str,
    challenge: &[u8],
    origin: &str,
    cross_origin: Option<bool>,
) -> Vec<u8> {
    let client_data = CollectedClientData {
        type_: type_.to_string(),
        challenge: Base64UrlSafeData::from(challenge.to_vec()),
        origin: origin.to_string(),
        token_binding: None,
        cross_origin,
    };
    serde_json::to_vec(&client_data).unwrap()
}

pub(crate) struct SoftToken {
    ca: Issuer,
    attestation_key: PKey<Private>,
    attestation_cert: X509,
    credential_key: PKey<Private>,
    credential_id: Vec<u8>,
    aaguid: Aaguid,
}

impl SoftToken {
    /// A token with a P-256 attestation key.
    pub(crate) fn new() -> Self {
        Self::with_attestation_key(generate_ec(Nid::X9_62_PRIME256V1).unwrap())
    }

    /// A token whose attestation certificate holds an RSA key.
    pub(crate) fn new_rsa_attestation() -> Self {
        let rsa = Rsa::generate(2048).and_then(PKey::from_rsa).unwrap();
        Self::with_attestation_key(rsa)
    }

    /// A token whose attestation certificate holds a P-384 key.
    pub(crate) fn new_p384_attestation() -> Self {
        Self::with_attestation_key(generate_ec(Nid::SECP384R1).unwrap())
    }

    fn with_attestation_key(attestation_key: PKey<Private>) -> Self {
        let mut aaguid = [0u8; 16];
        rand::rand_bytes(&mut aaguid).unwrap();
        let mut credential_id = vec![0u8; 32];
        rand::rand_bytes(&mut credential_id).unwrap();

        let ca = Issuer::new(Uuid::from_bytes(aaguid)).unwrap();
        let attestation_cert = ca
            .issue(
                &attestation_key,
                ATTESTATION_SUBJECT,
                &[aaguid_extension(&aaguid)],
                valid_now().unwrap(),
            )
            .unwrap();

        SoftToken {
            ca,
            attestation_key,
            attestation_cert,
            credential_key: generate_ec(Nid::X9_62_PRIME256V1).unwrap(),
            credential_id,
            aaguid,
        }
    }

    pub(crate) fn ca_certificate(&self) -> X509 {
        self.ca.cert.clone()
    }

    pub(crate) fn attestation_certificate(&self) -> X509 {
        self.attestation_cert.clone()
    }

    /// The attestation certificate as issued for 2000.
    pub(crate) fn expired_attestation_certificate(&self) -> X509 {
        let validity = (
            Asn1Time::from_unix(946_684_800).unwrap(),
            Asn1Time::from_unix(978_307_200).unwrap(),
        );
        self.ca
            .issue(
                &self.attestation_key,
                ATTESTATION_SUBJECT,
                &[aaguid_extension(&self.aaguid)],
                validity,
            )
            .unwrap()
    }

    pub(crate) fn aaguid(&self) -> Aaguid {
        self.aaguid
    }

    pub(crate) fn credential_id(&self) -> Vec<u8> {
        self.credential_id.clone()
    }

    pub(crate) fn credential_public_key(&self) -> COSEKey {
        let ec_key = self.credential_key.ec_key().unwrap();
        let mut ctx = BigNumContext::new().unwrap();
        let mut x = BigNum::new().unwrap();
        let mut y = BigNum::new().unwrap();
        ec_key
            .public_key()
            .affine_coordinates(ec_key.group(), &mut x, &mut y, &mut ctx)
            .unwrap();
        COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: x.to_vec_padded(32).unwrap(),
                y: y.to_vec_padded(32).unwrap(),
            }),
        }
    }

    fn attestation_path(&self) -> CertificatePath {
        CertificatePath::new(vec![self.attestation_cert.to_der().unwrap()])
    }

    /// Authenticator data attesting the credential of this token.
    fn authenticator_data(
        &self,
        rp_id: &str,
        flags: u8,
        aaguid: Aaguid,
        counter: u32,
        extensions: Option<AuthenticatorExtensions>,
    ) -> AuthenticatorData {
        let acd = AttestedCredentialData {
            aaguid,
            credential_id: self.credential_id.clone(),
            credential_pk: self.credential_public_key(),
        };
        AuthenticatorData::new(
            compute_sha256(rp_id.as_bytes()),
            flags,
            counter,
            Some(acd),
            extensions,
        )
    }

    /// Build a registration response. `statement` receives the authenticator data and the
    /// client data hash and returns the statement to embed.
    fn register<F>(
        &self,
        challenge: &[u8],
        origin: &str,
        auth_data: AuthenticatorData,
        statement: F,
    ) -> (Vec<u8>, Vec<u8>)
    where
        F: FnOnce(&AuthenticatorData, &[u8; 32]) -> AttestationStatement,
    {
        let cdj = client_data_json(CLIENT_DATA_TYPE_CREATE, challenge, origin, None);
        let client_data_hash = compute_sha256(&cdj);

        let att_stmt = statement(&auth_data, &client_data_hash);
        let att_obj = AttestationObject::new(auth_data, att_stmt)
            .and_then(|o| o.to_bytes())
            .unwrap();
        (att_obj, cdj)
    }

    fn packed_self_statement(&self, auth_data: &AuthenticatorData, cdh: &[u8; 32]) -> AttestationStatement {
        AttestationStatement::Packed {
            alg: COSEAlgorithm::ES256,
            sig: sign(&self.credential_key, &signed_data(auth_data, cdh)),
            x5c: None,
            ecdaa_key_id: None,
        }
    }

    fn packed_self(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
        flags: u8,
        extensions: Option<AuthenticatorExtensions>,
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = self.authenticator_data(rp_id, flags, self.aaguid, 0, extensions);
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            self.packed_self_statement(auth_data, cdh)
        })
    }

    pub(crate) fn packed_self_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        self.packed_self(challenge, rp_id, origin, FLAGS_USER_PRESENT, None)
    }

    pub(crate) fn packed_self_registration_with_flags(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
        flags: u8,
    ) -> (Vec<u8>, Vec<u8>) {
        self.packed_self(challenge, rp_id, origin, flags, None)
    }

    pub(crate) fn packed_self_registration_with_cred_protect(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let mut extensions = AuthenticatorExtensions::new();
        extensions.insert("credProtect".to_string(), Value::Integer(1));
        self.packed_self(challenge, rp_id, origin, FLAGS_USER_PRESENT, Some(extensions))
    }

    /// Packed self attestation over authenticator data without attested credential data.
    pub(crate) fn packed_registration_without_credential_data(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = AuthenticatorData::new(
            compute_sha256(rp_id.as_bytes()),
            FLAGS_USER_PRESENT,
            0,
            None,
            None,
        );
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            self.packed_self_statement(auth_data, cdh)
        })
    }

    /// Signed by the credential key but carrying the attestation certificate.
    pub(crate) fn packed_self_registration_with_x5c(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, self.aaguid, 0, None);
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            AttestationStatement::Packed {
                alg: COSEAlgorithm::ES256,
                sig: sign(&self.credential_key, &signed_data(auth_data, cdh)),
                x5c: Some(self.attestation_path()),
                ecdaa_key_id: None,
            }
        })
    }

    /// Packed basic attestation, always claiming ES256 whatever the attestation key is.
    pub(crate) fn packed_basic_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, self.aaguid, 0, None);
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            AttestationStatement::Packed {
                alg: COSEAlgorithm::ES256,
                sig: sign(&self.attestation_key, &signed_data(auth_data, cdh)),
                x5c: Some(self.attestation_path()),
                ecdaa_key_id: None,
            }
        })
    }

    pub(crate) fn packed_ecdaa_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, self.aaguid, 0, None);
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            AttestationStatement::Packed {
                alg: COSEAlgorithm::ES256,
                sig: sign(&self.attestation_key, &signed_data(auth_data, cdh)),
                x5c: None,
                ecdaa_key_id: Some(vec![0x01; 32]),
            }
        })
    }

    pub(crate) fn u2f_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let public_key_u2f = self
            .credential_public_key()
            .get_alg_key_ecc_x962_raw()
            .unwrap();
        let auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, [0u8; 16], 0, None);
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            let mut data = vec![0x00];
            data.extend_from_slice(&auth_data.rp_id_hash);
            data.extend_from_slice(cdh);
            data.extend_from_slice(&self.credential_id);
            data.extend_from_slice(&public_key_u2f);
            AttestationStatement::FidoU2F {
                x5c: self.attestation_path(),
                sig: sign(&self.attestation_key, &data),
            }
        })
    }

    pub(crate) fn none_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, [0u8; 16], 0, None);
        self.register(challenge, origin, auth_data, |_, _| AttestationStatement::None)
    }

    /// android-key attestation. The credential certificate carries a KeyDescription with the
    /// client data hash as challenge and the given authorization lists.
    pub(crate) fn android_key_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
        software: &[u8],
        tee: &[u8],
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, self.aaguid, 0, None);
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            let key_description = android_key_description(cdh, software, tee);
            let cred_cert = self
                .ca
                .issue(
                    &self.credential_key,
                    &[("CN", "Android Keystore Key")],
                    &[(OID_ANDROID_KEY_ATTESTATION, key_description)],
                    valid_now().unwrap(),
                )
                .unwrap();
            AttestationStatement::AndroidKey {
                alg: COSEAlgorithm::ES256,
                sig: sign(&self.credential_key, &signed_data(auth_data, cdh)),
                x5c: self.ca.path(&cred_cert),
            }
        })
    }

    /// android-safetynet attestation with an ES256 signed response issued to
    /// attest.android.com.
    pub(crate) fn safetynet_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
        cts_profile_match: bool,
    ) -> (Vec<u8>, Vec<u8>) {
        let auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, self.aaguid, 0, None);
        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            let nonce = compute_sha256(&signed_data(auth_data, cdh));
            AttestationStatement::AndroidSafetyNet {
                ver: "14366018".to_string(),
                response: self.safetynet_response(&nonce, cts_profile_match),
            }
        })
    }

    fn safetynet_response(&self, nonce: &[u8; 32], cts_profile_match: bool) -> Vec<u8> {
        let leaf = self
            .ca
            .issue(
                &self.attestation_key,
                &[("O", "Google LLC"), ("CN", SAFETYNET_HOSTNAME)],
                &[],
                valid_now().unwrap(),
            )
            .unwrap();
        // x5c entries are standard base64, the rest of the token is base64url.
        let x5c: Vec<String> = [&leaf, &self.ca.cert]
            .iter()
            .map(|c| general_purpose::STANDARD.encode(c.to_der().unwrap()))
            .collect();
        let header = serde_json::json!({ "alg": "ES256", "x5c": x5c });

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let claims = SafetyNetAttestResponse {
            timestamp_ms,
            nonce: Base64UrlSafeData::from(nonce.to_vec()),
            apk_package_name: Some("com.example.authenticator".to_string()),
            cts_profile_match,
            basic_integrity: true,
            evaluation_type: Some("BASIC".to_string()),
        };

        let signing_input = format!(
            "{}.{}",
            general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
            general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap())
        );

        // JWS ES256 signatures are the fixed width r || s.
        let digest = compute_sha256(signing_input.as_bytes());
        let sig = EcdsaSig::sign(&digest, &self.attestation_key.ec_key().unwrap()).unwrap();
        let mut raw = sig.r().to_vec_padded(32).unwrap();
        raw.extend_from_slice(&sig.s().to_vec_padded(32).unwrap());

        format!(
            "{signing_input}.{}",
            general_purpose::URL_SAFE_NO_PAD.encode(raw)
        )
        .into_bytes()
    }

    /// apple-appattest attestation. The credential id is the key id of the credential key and
    /// the leaf certificate carries the nonce.
    pub(crate) fn apple_appattest_registration(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
        aaguid: Aaguid,
        counter: u32,
    ) -> (Vec<u8>, Vec<u8>) {
        let key_id = compute_sha256(
            &self
                .credential_public_key()
                .get_alg_key_ecc_x962_raw()
                .unwrap(),
        );
        let mut auth_data = self.authenticator_data(rp_id, FLAGS_USER_PRESENT, aaguid, counter, None);
        if let Some(acd) = auth_data.acd.as_mut() {
            acd.credential_id = key_id.to_vec();
        }

        self.register(challenge, origin, auth_data, |auth_data, cdh| {
            let nonce = compute_sha256(&signed_data(auth_data, cdh));
            // SEQUENCE { [1] { OCTET STRING nonce } }
            let mut nonce_der = hex_literal::hex!("30 24 a1 22 04 20").to_vec();
            nonce_der.extend_from_slice(&nonce);
            let cred_cert = self
                .ca
                .issue(
                    &self.credential_key,
                    &[("CN", "App Attest Key")],
                    &[(OID_APPLE_NONCE, nonce_der)],
                    valid_now().unwrap(),
                )
                .unwrap();
            AttestationStatement::AppleAppAttest {
                x5c: self.ca.path(&cred_cert),
                receipt: b"app attest receipt".to_vec(),
            }
        })
    }

    /// An assertion by the credential: (authenticator data, client data json, signature).
    pub(crate) fn assertion(
        &self,
        challenge: &[u8],
        rp_id: &str,
        origin: &str,
        counter: u32,
    ) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let cdj = client_data_json(CLIENT_DATA_TYPE_GET, challenge, origin, None);
        let auth_data = AuthenticatorData::new(
            compute_sha256(rp_id.as_bytes()),
            FLAGS_USER_PRESENT,
            counter,
            None,
            None,
        );
        let signature = sign(
            &self.credential_key,
            &signed_data(&auth_data, &compute_sha256(&cdj)),
        );
        (auth_data.to_bytes().unwrap(), cdj, signature)
    }
}

fn signed_data(auth_data: &AuthenticatorData, client_data_hash: &[u8; 32]) -> Vec<u8> {
    let mut data = auth_data.to_bytes().unwrap();
    data.extend_from_slice(client_data_hash);
    data
}
