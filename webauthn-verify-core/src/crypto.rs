//! Cryptographic operation wrapper for Webauthn. This module exists to
//! allow ease of auditing, safe operation wrappers for the webauthn library,
//! and cryptographic provider abstraction. This module currently uses OpenSSL
//! as the cryptographic primitive provider.

#![allow(non_camel_case_types)]

use std::collections::BTreeMap;

use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Verifier};
use openssl::{sha, x509};
use serde_cbor_2::Value;
use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry::Oid;

use crate::asn1;
use crate::constants::*;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;

// Why OpenSSL over another rust crate?
// - The openssl crate allows us to reconstruct a public key from the
//   x/y group coords, where most others want a pkcs formatted structure, and
//   it gives us x509 chain validation against an explicit store for the trust
//   path checks.

impl ECDSACurve {
    fn to_openssl_nid(self) -> Nid {
        match self {
            ECDSACurve::SECP256R1 => Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => Nid::SECP384R1,
            ECDSACurve::SECP521R1 => Nid::SECP521R1,
        }
    }

    fn from_openssl_nid(nid: Nid) -> WebauthnResult<Self> {
        match nid {
            Nid::X9_62_PRIME256V1 => Ok(ECDSACurve::SECP256R1),
            Nid::SECP384R1 => Ok(ECDSACurve::SECP384R1),
            Nid::SECP521R1 => Ok(ECDSACurve::SECP521R1),
            _ => Err(WebauthnError::Certificate(
                "unsupported certificate curve".to_string(),
            )),
        }
    }
}

impl EDDSACurve {
    fn to_openssl_id(self) -> Id {
        match self {
            EDDSACurve::ED25519 => Id::ED25519,
            EDDSACurve::ED448 => Id::ED448,
        }
    }
}

impl COSEAlgorithm {
    fn is_ecdsa(self) -> bool {
        matches!(
            self,
            COSEAlgorithm::ES256 | COSEAlgorithm::ES384 | COSEAlgorithm::ES512
        )
    }

    fn is_rsa(self) -> bool {
        matches!(
            self,
            COSEAlgorithm::RS256
                | COSEAlgorithm::RS384
                | COSEAlgorithm::RS512
                | COSEAlgorithm::PS256
                | COSEAlgorithm::PS384
                | COSEAlgorithm::PS512
                | COSEAlgorithm::INSECURE_RS1
        )
    }

    /// The curve an ECDSA algorithm signs with.
    pub(crate) fn ecdsa_curve(self) -> Option<ECDSACurve> {
        match self {
            COSEAlgorithm::ES256 => Some(ECDSACurve::SECP256R1),
            COSEAlgorithm::ES384 => Some(ECDSACurve::SECP384R1),
            COSEAlgorithm::ES512 => Some(ECDSACurve::SECP521R1),
            _ => None,
        }
    }

    fn is_pss(self) -> bool {
        matches!(
            self,
            COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512
        )
    }

    fn message_digest(self) -> Option<MessageDigest> {
        match self {
            COSEAlgorithm::ES256 | COSEAlgorithm::RS256 | COSEAlgorithm::PS256 => {
                Some(MessageDigest::sha256())
            }
            COSEAlgorithm::ES384 | COSEAlgorithm::RS384 | COSEAlgorithm::PS384 => {
                Some(MessageDigest::sha384())
            }
            COSEAlgorithm::ES512 | COSEAlgorithm::RS512 | COSEAlgorithm::PS512 => {
                Some(MessageDigest::sha512())
            }
            COSEAlgorithm::INSECURE_RS1 => {
                warn!("INSECURE SHA1 USAGE DETECTED");
                Some(MessageDigest::sha1())
            }
            COSEAlgorithm::EDDSA => None,
        }
    }
}

/// Hash `input` with the digest that `alg` signs with.
pub(crate) fn only_hash_from_type(alg: COSEAlgorithm, input: &[u8]) -> WebauthnResult<Vec<u8>> {
    let md = alg.message_digest().ok_or_else(|| {
        WebauthnError::BadAttestationStatement(format!("{alg:?} has no associated digest"))
    })?;
    Ok(openssl::hash::hash(md, input)?.to_vec())
}

/// Verify `signature` over `data` with `pkey` using `alg`. A malformed signature is reported
/// as an invalid signature rather than a provider error.
fn verify_with_pkey(
    alg: COSEAlgorithm,
    pkey: &PKeyRef<Public>,
    signature: &[u8],
    data: &[u8],
) -> WebauthnResult<bool> {
    let key_matches_alg = match pkey.id() {
        Id::EC => alg.is_ecdsa(),
        Id::RSA => alg.is_rsa(),
        Id::ED25519 | Id::ED448 => alg == COSEAlgorithm::EDDSA,
        _ => false,
    };
    if !key_matches_alg {
        debug!(?alg, key_id = ?pkey.id(), "algorithm does not match key type");
        return Err(WebauthnError::Certificate(format!(
            "algorithm {alg:?} does not match the key type"
        )));
    }

    let res = match alg.message_digest() {
        None => {
            let mut verifier = Verifier::new_without_digest(pkey)?;
            verifier.verify_oneshot(signature, data)
        }
        Some(md) => {
            let mut verifier = Verifier::new(md, pkey)?;
            if alg.is_pss() {
                verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
                verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
            }
            verifier.update(data)?;
            verifier.verify(signature)
        }
    };

    match res {
        Ok(valid) => Ok(valid),
        Err(e) => {
            debug!(?e, "signature could not be processed");
            Ok(false)
        }
    }
}

/// Validate an x509 signature is valid for the supplied data
pub fn verify_signature(
    alg: COSEAlgorithm,
    certificate: &x509::X509Ref,
    signature: &[u8],
    verification_data: &[u8],
) -> WebauthnResult<bool> {
    let pkey = certificate.public_key()?;
    verify_with_pkey(alg, &pkey, signature, verification_data)
}

/// Compute the sha256 of a slice of data.
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    sha::sha256(data)
}

/// The key identifier of a certificate: the SHA-1 of its subjectPublicKey bits, as used to
/// identify u2f attestation certificates in metadata.
pub fn certificate_key_identifier(certificate: &x509::X509Ref) -> WebauthnResult<[u8; 20]> {
    let spki = certificate.public_key()?.public_key_to_der()?;
    let bits = asn1::subject_public_key_bits(&spki)?;
    Ok(sha::sha1(bits))
}

/// The curve of the certificate key, or `None` when it is not an EC key.
pub(crate) fn certificate_curve(
    certificate: &x509::X509Ref,
) -> WebauthnResult<Option<ECDSACurve>> {
    let pkey = certificate.public_key()?;
    if pkey.id() != Id::EC {
        return Ok(None);
    }
    let nid = pkey.ec_key()?.group().curve_name().ok_or_else(|| {
        WebauthnError::Certificate("certificate curve is not a named curve".to_string())
    })?;
    ECDSACurve::from_openssl_nid(nid).map(Some)
}

/// The first value of a subject name entry.
#[allow(deprecated)] // openssl 0.10.7x deprecates as_utf8; behavior kept as written
pub(crate) fn subject_entry(certificate: &x509::X509Ref, nid: Nid) -> Option<String> {
    certificate
        .subject_name()
        .entries_by_nid(nid)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
}

/// Parse certificate DER for the extensions openssl does not expose.
pub(crate) fn parse_certificate(cert_der: &[u8]) -> WebauthnResult<X509Certificate<'_>> {
    x509_parser::parse_x509_certificate(cert_der)
        .map(|(_, cert)| cert)
        .map_err(|e| {
            debug!(?e, "unable to parse certificate");
            WebauthnError::Certificate(format!("unable to parse certificate: {e}"))
        })
}

/// The DER value of the extension `oid` in the DER encoding of an X.509 certificate.
pub(crate) fn certificate_extension<'a>(
    cert_der: &'a [u8],
    oid: &Oid<'_>,
) -> WebauthnResult<Option<&'a [u8]>> {
    let cert = parse_certificate(cert_der)?;
    Ok(cert
        .extensions()
        .iter()
        .find(|extension| extension.oid == *oid)
        .map(|extension| extension.value))
}

fn basic_constraints_is_ca(cert: &X509Certificate<'_>) -> WebauthnResult<bool> {
    let bc = cert.basic_constraints().map_err(|e| {
        WebauthnError::Certificate(format!("invalid basic constraints: {e}"))
    })?;
    Ok(bc.map(|bc| bc.value.ca).unwrap_or(false))
}

/// Verify that attestnCert meets the requirements in § 8.2.1 Packed Attestation
/// Statement Certificate Requirements.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation-cert-requirements>
pub(crate) fn assert_packed_attest_req(certificate: &x509::X509Ref) -> WebauthnResult<()> {
    // Version MUST be set to 3 (which is indicated by an ASN.1 INTEGER with value 2).
    if certificate.version() != 2 {
        return Err(WebauthnError::Certificate(
            "packed attestation certificate must be x509 v3".to_string(),
        ));
    }

    // Subject-C, Subject-O and Subject-CN are required, Subject-OU must be the literal
    // "Authenticator Attestation".
    let subject_c = subject_entry(certificate, Nid::COUNTRYNAME);
    let subject_o = subject_entry(certificate, Nid::ORGANIZATIONNAME);
    let subject_cn = subject_entry(certificate, Nid::COMMONNAME);
    if subject_c.is_none() || subject_o.is_none() || subject_cn.is_none() {
        return Err(WebauthnError::Certificate(
            "packed attestation certificate subject is incomplete".to_string(),
        ));
    }

    match subject_entry(certificate, Nid::ORGANIZATIONALUNITNAME) {
        Some(ou) if ou == PACKED_ATTESTATION_OU => {}
        ou => {
            debug!(?ou, "invalid packed attestation subject ou");
            return Err(WebauthnError::Certificate(
                "packed attestation certificate subject ou is invalid".to_string(),
            ));
        }
    }

    // The Basic Constraints extension MUST have the CA component set to false.
    let der = certificate.to_der()?;
    if basic_constraints_is_ca(&parse_certificate(&der)?)? {
        return Err(WebauthnError::Certificate(
            "packed attestation certificate must not be a ca".to_string(),
        ));
    }

    Ok(())
}

/// Verify that aikCert meets the requirements in § 8.3.1 TPM Attestation Statement
/// Certificate Requirements.
pub(crate) fn assert_tpm_attest_req(certificate: &x509::X509Ref) -> WebauthnResult<()> {
    if certificate.version() != 2 {
        return Err(WebauthnError::Certificate(
            "tpm aik certificate must be x509 v3".to_string(),
        ));
    }

    // Subject field MUST be set to empty.
    if certificate.subject_name().entries().count() != 0 {
        return Err(WebauthnError::Certificate(
            "tpm aik certificate subject must be empty".to_string(),
        ));
    }

    let der = certificate.to_der()?;

    // The Extended Key Usage extension MUST contain the OID 2.23.133.8.3
    // ("joint-iso-itu-t(2) international-organizations(23) 133 tcg-kp(8)
    // tcg-kp-AIKCertificate(3)").
    let cert = parse_certificate(&der)?;
    let eku = cert
        .extended_key_usage()
        .map_err(|e| WebauthnError::Certificate(format!("invalid extended key usage: {e}")))?
        .ok_or_else(|| {
            WebauthnError::Certificate(
                "tpm aik certificate is missing extended key usage".to_string(),
            )
        })?;
    let has_aik_usage = eku.value.other.contains(&OID_TCG_KP_AIK_CERTIFICATE);
    if !has_aik_usage {
        return Err(WebauthnError::Certificate(
            "tpm aik certificate is not valid for aik usage".to_string(),
        ));
    }

    // The Basic Constraints extension MUST have the CA component set to false.
    if basic_constraints_is_ca(&cert)? {
        return Err(WebauthnError::Certificate(
            "tpm aik certificate must not be a ca".to_string(),
        ));
    }

    Ok(())
}

impl TryFrom<&Value> for COSEKey {
    type Error = WebauthnError;

    fn try_from(d: &Value) -> Result<COSEKey, Self::Error> {
        let m = cbor_try_map!(d)?;

        // See also https://tools.ietf.org/html/rfc8152#section-3.1
        // These values look like:
        // Object({
        //     // negative (-) values are per-algo specific
        //     Integer(-3): Bytes([48, 185, ...]),
        //     Integer(-2): Bytes([158, 212, ...]),
        //     Integer(-1): U64(1),
        //     Integer(1): U64(2), // key type
        //     Integer(3): I64(-7) // algorithm, -7 being ES256 + SHA256
        // })
        let get = |k: i128| {
            m.get(&Value::Integer(k)).ok_or_else(|| {
                WebauthnError::DataConversion(format!("cose key is missing label {k}"))
            })
        };

        let key_type = cbor_try_i128!(get(1)?)?;
        let type_ = COSEAlgorithm::try_from(cbor_try_i128!(get(3)?)?)?;

        let cose_key = if key_type == COSEKeyTypeId::EC_EC2 as i128 && type_.is_ecdsa() {
            // This indicates this is an EC2 key consisting of crv, x, y, which are stored in
            // crv (-1), x (-2) and y (-3)
            let curve = ECDSACurve::try_from(cbor_try_i128!(get(-1)?)?)?;
            let x = cbor_try_bytes!(get(-2)?)?;
            let y = cbor_try_bytes!(get(-3)?)?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                return Err(WebauthnError::DataConversion(
                    "cose ec2 coordinates have an invalid length".to_string(),
                ));
            }

            COSEKey {
                type_,
                key: COSEKeyType::EC_EC2(COSEEC2Key {
                    curve,
                    x: x.clone(),
                    y: y.clone(),
                }),
            }
        } else if key_type == COSEKeyTypeId::EC_RSA as i128 && type_.is_rsa() {
            // -1 -> n, -2 -> e
            let n = cbor_try_bytes!(get(-1)?)?;
            let e = cbor_try_bytes!(get(-2)?)?;

            if n.is_empty() || e.is_empty() {
                return Err(WebauthnError::DataConversion(
                    "cose rsa key is missing n or e".to_string(),
                ));
            }

            COSEKey {
                type_,
                key: COSEKeyType::RSA(COSERSAKey {
                    n: n.clone(),
                    e: e.clone(),
                }),
            }
        } else if key_type == COSEKeyTypeId::EC_OKP as i128 && type_ == COSEAlgorithm::EDDSA {
            // https://datatracker.ietf.org/doc/html/rfc8152#section-13.2
            let curve = EDDSACurve::try_from(cbor_try_i128!(get(-1)?)?)?;
            let x = cbor_try_bytes!(get(-2)?)?;

            if x.len() != curve.coordinate_size() {
                return Err(WebauthnError::DataConversion(
                    "cose okp key has an invalid length".to_string(),
                ));
            }

            COSEKey {
                type_,
                key: COSEKeyType::EC_OKP(COSEOKPKey {
                    curve,
                    x: x.clone(),
                }),
            }
        } else {
            debug!(?key_type, ?type_, "unsupported cose key type");
            return Err(WebauthnError::DataConversion(format!(
                "unsupported cose key type {key_type} with {type_:?}"
            )));
        };

        // The rfc additionally states:
        //   "   Applications MUST check that the curve and the key type are
        //     consistent and reject a key if they are not."
        // this means feeding the values to openssl to validate them for us!
        cose_key.validate()?;
        Ok(cose_key)
    }
}

impl TryFrom<(COSEAlgorithm, &x509::X509Ref)> for COSEKey {
    type Error = WebauthnError;

    fn try_from((alg, certificate): (COSEAlgorithm, &x509::X509Ref)) -> Result<COSEKey, Self::Error> {
        let pkey = certificate.public_key()?;

        let key = match pkey.id() {
            Id::EC => {
                let ec_key = pkey.ec_key()?;
                let group = ec_key.group();
                let curve = group
                    .curve_name()
                    .ok_or_else(|| WebauthnError::Certificate("unnamed curve".to_string()))
                    .and_then(ECDSACurve::from_openssl_nid)?;

                let mut ctx = BigNumContext::new()?;
                let mut x = BigNum::new()?;
                let mut y = BigNum::new()?;
                ec_key
                    .public_key()
                    .affine_coordinates(group, &mut x, &mut y, &mut ctx)?;

                let coord_len = curve.coordinate_size() as i32;
                COSEKeyType::EC_EC2(COSEEC2Key {
                    curve,
                    x: x.to_vec_padded(coord_len)?,
                    y: y.to_vec_padded(coord_len)?,
                })
            }
            Id::RSA => {
                let rsa = pkey.rsa()?;
                COSEKeyType::RSA(COSERSAKey {
                    n: rsa.n().to_vec(),
                    e: rsa.e().to_vec(),
                })
            }
            Id::ED25519 => COSEKeyType::EC_OKP(COSEOKPKey {
                curve: EDDSACurve::ED25519,
                x: pkey.raw_public_key()?,
            }),
            Id::ED448 => COSEKeyType::EC_OKP(COSEOKPKey {
                curve: EDDSACurve::ED448,
                x: pkey.raw_public_key()?,
            }),
            other => {
                debug!(?other, "unsupported certificate key type");
                return Err(WebauthnError::Certificate(
                    "unsupported certificate key type".to_string(),
                ));
            }
        };

        Ok(COSEKey { type_: alg, key })
    }
}

impl COSEKey {
    /// Let publicKeyU2F be the concatenation 0x04 || x || y.
    /// Note: This signifies uncompressed ECC key format.
    pub fn get_alg_key_ecc_x962_raw(&self) -> WebauthnResult<Vec<u8>> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => Ok([0x04]
                .iter()
                .chain(ecpk.x.iter())
                .chain(ecpk.y.iter())
                .copied()
                .collect()),
            _ => Err(WebauthnError::Certificate(
                "key is not an ec2 key".to_string(),
            )),
        }
    }

    /// If this key and `other` are the same public key, regardless of the algorithm label.
    pub fn same_public_key(&self, other: &COSEKey) -> bool {
        self.key == other.key
    }

    pub(crate) fn validate(&self) -> WebauthnResult<()> {
        self.get_openssl_pkey().map(|_| ()).map_err(|e| {
            debug!(?e, "cose key failed validation");
            WebauthnError::DataConversion("cose key is not a valid public key".to_string())
        })
    }

    fn get_openssl_pkey(&self) -> WebauthnResult<PKey<Public>> {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => {
                let ec_group = EcGroup::from_curve_name(ec2k.curve.to_openssl_nid())?;
                let xbn = BigNum::from_slice(&ec2k.x)?;
                let ybn = BigNum::from_slice(&ec2k.y)?;
                let ec_key = EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)?;
                // Validate the key is sound. This checks the point is on the curve.
                ec_key.check_key()?;
                Ok(PKey::from_ec_key(ec_key)?)
            }
            COSEKeyType::RSA(rsak) => {
                let nbn = BigNum::from_slice(&rsak.n)?;
                let ebn = BigNum::from_slice(&rsak.e)?;
                let rsa_key = Rsa::from_public_components(nbn, ebn)?;
                Ok(PKey::from_rsa(rsa_key)?)
            }
            COSEKeyType::EC_OKP(okpk) => Ok(PKey::public_key_from_raw_bytes(
                &okpk.x,
                okpk.curve.to_openssl_id(),
            )?),
        }
    }

    /// Verify `signature` over `verification_data` with this key.
    pub fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> WebauthnResult<bool> {
        let pkey = self.get_openssl_pkey()?;
        verify_with_pkey(self.type_, &pkey, signature, verification_data)
    }

    /// Encode this key as a COSE_Key cbor map.
    pub fn to_cbor_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert(Value::Integer(3), Value::Integer(i128::from(self.type_)));
        match &self.key {
            COSEKeyType::EC_EC2(k) => {
                m.insert(Value::Integer(1), Value::Integer(COSEKeyTypeId::EC_EC2 as i128));
                m.insert(Value::Integer(-1), Value::Integer(k.curve as i128));
                m.insert(Value::Integer(-2), Value::Bytes(k.x.clone()));
                m.insert(Value::Integer(-3), Value::Bytes(k.y.clone()));
            }
            COSEKeyType::RSA(k) => {
                m.insert(Value::Integer(1), Value::Integer(COSEKeyTypeId::EC_RSA as i128));
                m.insert(Value::Integer(-1), Value::Bytes(k.n.clone()));
                m.insert(Value::Integer(-2), Value::Bytes(k.e.clone()));
            }
            COSEKeyType::EC_OKP(k) => {
                m.insert(Value::Integer(1), Value::Integer(COSEKeyTypeId::EC_OKP as i128));
                m.insert(Value::Integer(-1), Value::Integer(k.curve as i128));
                m.insert(Value::Integer(-2), Value::Bytes(k.x.clone()));
            }
        }
        Value::Map(m)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use hex_literal::hex;
    use openssl::ec::EcKey;
    use openssl::sign::Signer;

    #[test]
    fn cbor_es256() {
        let hex_data = hex!(
                "A5"         // Map - 5 elements
                "01 02"      //   1:   2,  ; kty: EC2 key type
                "03 26"      //   3:  -7,  ; alg: ES256 signature algorithm
                "20 01"      //  -1:   1,  ; crv: P-256 curve
                "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d" // -2:   x,  ; x-coordinate
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c" // -3:   y,  ; y-coordinate
        );

        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES256);
        match &key.key {
            COSEKeyType::EC_EC2(pkey) => {
                assert_eq!(
                    pkey.x,
                    hex!("65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d")
                );
                assert_eq!(
                    pkey.y,
                    hex!("1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c")
                );
                assert_eq!(pkey.curve, ECDSACurve::SECP256R1);
            }
            _ => panic!("Key should be parsed EC2 key"),
        }

        // Encoding the key again gives back the same cbor.
        assert_eq!(serde_cbor_2::to_vec(&key.to_cbor_value()).unwrap(), hex_data);
        assert_eq!(
            key.get_alg_key_ecc_x962_raw().unwrap().first().copied(),
            Some(0x04)
        );
    }

    #[test]
    fn cbor_es384() {
        let hex_data = hex!(
                "A5"         // Map - 5 elements
                "01 02"      //   1:   2,  ; kty: EC2 key type
                "03 38 22"   //   3:  -35,  ; alg: ES384 signature algorithm
                "20 02"      //  -1:   2,  ; crv: P-384 curve
                "21 58 30   ceeaf818731db7af2d02e029854823d71bdbf65fb0c6ff69" // -2: x, ; x-coordinate
                           "42c9cf891efe18ea81430517d777f5c43550da801be5bf2f"
                "22 58 30   dda1d0ead72e042efb7c36a38cc021abb2ca1a2e38159edd" // -3: y ; y-coordinate
                           "a8c25f391e9a38d79dd56b9427d1c7c70cfa778ab849b087"
        );

        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES384);
        match key.key {
            COSEKeyType::EC_EC2(pkey) => assert_eq!(pkey.curve, ECDSACurve::SECP384R1),
            _ => panic!("Key should be parsed EC2 key"),
        }
    }

    #[test]
    fn cbor_ec2_invalid() {
        // x coordinate is one byte short.
        let hex_data = hex!(
                "A5"
                "01 02"
                "03 26"
                "20 01"
                "21 58 1f   eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert!(matches!(
            COSEKey::try_from(&val),
            Err(WebauthnError::DataConversion(_))
        ));

        // The point is not on the curve.
        let hex_data = hex!(
                "A5"
                "01 02"
                "03 26"
                "20 01"
                "21 58 20   0000000000000000000000000000000000000000000000000000000000000001"
                "22 58 20   0000000000000000000000000000000000000000000000000000000000000001"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert!(COSEKey::try_from(&val).is_err());

        // An ec2 key type with an rsa algorithm.
        let hex_data = hex!(
                "A5"
                "01 02"
                "03 39 0100" //   3:  -257, ; alg: RS256
                "20 01"
                "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert!(COSEKey::try_from(&val).is_err());
    }

    #[test]
    fn cose_key_signature() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let eckey = EcKey::generate(&group).unwrap();
        let mut ctx = BigNumContext::new().unwrap();
        let mut x = BigNum::new().unwrap();
        let mut y = BigNum::new().unwrap();
        eckey
            .public_key()
            .affine_coordinates(&group, &mut x, &mut y, &mut ctx)
            .unwrap();
        let key = COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: x.to_vec_padded(32).unwrap(),
                y: y.to_vec_padded(32).unwrap(),
            }),
        };

        let pkey = PKey::from_ec_key(eckey).unwrap();
        let mut signer = Signer::new(MessageDigest::sha256(), &pkey).unwrap();
        signer.update(b"signed data").unwrap();
        let sig = signer.sign_to_vec().unwrap();

        assert!(key.verify_signature(&sig, b"signed data").unwrap());
        assert!(!key.verify_signature(&sig, b"signed dat4").unwrap());
        // Garbage signatures are invalid, not provider errors.
        assert!(!key.verify_signature(&[0x30, 0x01], b"signed data").unwrap());

        // Round trip through cbor.
        let decoded = COSEKey::try_from(&key.to_cbor_value()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn hash_from_type() {
        assert_eq!(
            only_hash_from_type(COSEAlgorithm::RS256, b"abc").unwrap(),
            compute_sha256(b"abc").to_vec()
        );
        assert_eq!(
            only_hash_from_type(COSEAlgorithm::ES384, b"abc").unwrap().len(),
            48
        );
        assert!(only_hash_from_type(COSEAlgorithm::EDDSA, b"abc").is_err());
    }
}
