//! Binary codecs for the structures authenticators return: authenticator data and the TPM 2.0
//! structures carried in a `tpm` attestation statement.

use std::collections::BTreeMap;

use nom::bytes::complete::take;
use nom::combinator::{cond, map_res, rest};
use nom::error::ParseError;
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u32, be_u64, be_u8};
use serde_cbor_2::Value;

use crate::constants::*;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;

fn nom_failure(i: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Failure(nom::error::Error::from_error_kind(
        i,
        nom::error::ErrorKind::Fail,
    ))
}

// Decode one cbor item from the front of the input, leaving whatever follows it.
fn cbor_parser(i: &[u8]) -> nom::IResult<&[u8], Value> {
    let mut deserializer = serde_cbor_2::Deserializer::from_slice(i);
    let v = serde::de::Deserialize::deserialize(&mut deserializer).map_err(|e| {
        debug!(?e, "cbor item is invalid");
        nom_failure(i)
    })?;

    let len = deserializer.byte_offset();
    let rem = i.get(len..).ok_or_else(|| nom_failure(i))?;
    Ok((rem, v))
}

fn acd_parser(i: &[u8]) -> nom::IResult<&[u8], AttestedCredentialData> {
    let (i, aaguid) = map_res(take(AAGUID_LEN), |b: &[u8]| Aaguid::try_from(b))(i)?;
    let (i, credential_id) = length_data(be_u16)(i)?;
    let (rem, cose_value) = cbor_parser(i)?;

    let credential_pk = COSEKey::try_from(&cose_value).map_err(|e| {
        debug!(?e, "credential public key is invalid");
        nom_failure(i)
    })?;

    Ok((
        rem,
        AttestedCredentialData {
            aaguid,
            credential_id: credential_id.to_vec(),
            credential_pk,
        },
    ))
}

fn extensions_parser(i: &[u8]) -> nom::IResult<&[u8], AuthenticatorExtensions> {
    let (rem, v) = cbor_parser(i)?;

    let m = match v {
        Value::Map(m) if !m.is_empty() => m,
        _ => {
            debug!("extension data must be a non-empty map");
            return Err(nom_failure(i));
        }
    };

    let extensions = m
        .into_iter()
        .map(|(k, v)| match k {
            Value::Text(k) => Ok((k, v)),
            _ => Err(nom_failure(i)),
        })
        .collect::<Result<AuthenticatorExtensions, _>>()?;

    Ok((rem, extensions))
}

fn authenticator_data_parser(i: &[u8]) -> nom::IResult<&[u8], AuthenticatorData> {
    let (i, rp_id_hash) = map_res(take(RP_ID_HASH_LEN), |b: &[u8]| {
        <[u8; RP_ID_HASH_LEN]>::try_from(b)
    })(i)?;
    let (i, flags) = be_u8(i)?;
    let (i, counter) = be_u32(i)?;
    let (i, acd) = cond(flags & FLAG_ATTESTED_CREDENTIAL_DATA != 0, acd_parser)(i)?;
    let (i, extensions) = cond(flags & FLAG_EXTENSION_DATA != 0, extensions_parser)(i)?;

    Ok((
        i,
        AuthenticatorData {
            rp_id_hash,
            flags,
            counter,
            acd,
            extensions,
        },
    ))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<AuthenticatorData, WebauthnError> {
        let (rem, auth_data) = authenticator_data_parser(data).map_err(|e| {
            debug!(?e, "authenticator data is invalid");
            WebauthnError::DataConversion("invalid authenticator data".to_string())
        })?;

        if !rem.is_empty() {
            debug!(trailing = rem.len(), "trailing bytes after authenticator data");
            return Err(WebauthnError::DataConversion(
                "trailing bytes after authenticator data".to_string(),
            ));
        }

        Ok(auth_data)
    }
}

impl AuthenticatorData {
    /// Encode to the authenticator data byte layout. The attested credential data and
    /// extension flags are written to agree with the content.
    pub fn to_bytes(&self) -> WebauthnResult<Vec<u8>> {
        let extensions = self.extensions.as_ref().filter(|e| !e.is_empty());

        let mut flags = self.flags & !(FLAG_ATTESTED_CREDENTIAL_DATA | FLAG_EXTENSION_DATA);
        if self.acd.is_some() {
            flags |= FLAG_ATTESTED_CREDENTIAL_DATA;
        }
        if extensions.is_some() {
            flags |= FLAG_EXTENSION_DATA;
        }

        let mut out = Vec::with_capacity(RP_ID_HASH_LEN + 5);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(flags);
        out.extend_from_slice(&self.counter.to_be_bytes());

        if let Some(acd) = &self.acd {
            let cred_id_len = u16::try_from(acd.credential_id.len()).map_err(|_| {
                WebauthnError::DataConversion("credential id is too long".to_string())
            })?;
            out.extend_from_slice(&acd.aaguid);
            out.extend_from_slice(&cred_id_len.to_be_bytes());
            out.extend_from_slice(&acd.credential_id);
            out.extend(cbor_to_vec(&acd.credential_pk.to_cbor_value())?);
        }

        if let Some(extensions) = extensions {
            let m: BTreeMap<Value, Value> = extensions
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
                .collect();
            out.extend(cbor_to_vec(&Value::Map(m))?);
        }

        Ok(out)
    }
}

pub(crate) fn cbor_to_vec(v: &Value) -> WebauthnResult<Vec<u8>> {
    serde_cbor_2::to_vec(v).map_err(|e| {
        debug!(?e, "cbor encoding failed");
        WebauthnError::DataConversion("unable to encode cbor".to_string())
    })
}

/// Decode exactly one cbor item, rejecting trailing bytes.
pub(crate) fn cbor_from_slice(data: &[u8]) -> WebauthnResult<Value> {
    let (rem, v) = cbor_parser(data).map_err(|e| {
        debug!(?e, "invalid cbor");
        WebauthnError::DataConversion("invalid cbor".to_string())
    })?;
    if !rem.is_empty() {
        return Err(WebauthnError::DataConversion(
            "trailing bytes after cbor item".to_string(),
        ));
    }
    Ok(v)
}

/// A TPM2B sized buffer: a big endian u16 length followed by that many bytes.
fn tpm2b_parser(i: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    length_data(be_u16)(i)
}

/// TPMS_CERTIFY_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCertifyInfo {
    /// Name of the certified object.
    pub name: Vec<u8>,
    /// Qualified Name of the certified object.
    pub qualified_name: Vec<u8>,
}

/// TPMS_ATTEST, the structure signed by the attestation key of a TPM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    /// Must be TPM_GENERATED_VALUE.
    pub magic: u32,
    /// The attestation structure type.
    pub type_: u16,
    /// Qualified name of the signing key.
    pub qualified_signer: Vec<u8>,
    /// Caller provided data, the hash of the data to be attested.
    pub extra_data: Vec<u8>,
    /// The TPM firmware version.
    pub firmware_version: u64,
    /// The certify information, present when the type is TPM_ST_ATTEST_CERTIFY.
    pub attested: Option<TpmsCertifyInfo>,
}

fn tpms_certify_info_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsCertifyInfo> {
    let (i, name) = tpm2b_parser(i)?;
    let (i, qualified_name) = tpm2b_parser(i)?;
    Ok((
        i,
        TpmsCertifyInfo {
            name: name.to_vec(),
            qualified_name: qualified_name.to_vec(),
        },
    ))
}

fn tpms_attest_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsAttest> {
    let (i, magic) = be_u32(i)?;
    let (i, type_) = be_u16(i)?;
    let (i, qualified_signer) = tpm2b_parser(i)?;
    let (i, extra_data) = tpm2b_parser(i)?;
    // clockInfo: clock, resetCount, restartCount and safe are not used.
    let (i, _clock_info) = take(17usize)(i)?;
    let (i, firmware_version) = be_u64(i)?;

    let (i, attested) = cond(type_ == TPM_ST_ATTEST_CERTIFY, tpms_certify_info_parser)(i)?;

    // Other attestation types carry a body this verifier never reads.
    let (i, _) = rest(i)?;

    Ok((
        i,
        TpmsAttest {
            magic,
            type_,
            qualified_signer: qualified_signer.to_vec(),
            extra_data: extra_data.to_vec(),
            firmware_version,
            attested,
        },
    ))
}

impl TryFrom<&[u8]> for TpmsAttest {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<TpmsAttest, WebauthnError> {
        tpms_attest_parser(data)
            .map_err(|e| {
                debug!(?e, "tpm certInfo is invalid");
                WebauthnError::DataConversion("invalid tpm certInfo".to_string())
            })
            .map(|(_, v)| v)
    }
}

/// The key parameters of a TPMT_PUBLIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicParms {
    /// RSA parameters.
    Rsa {
        /// Modulus size in bits.
        key_bits: u16,
        /// Public exponent, where 0 means 2^16 + 1.
        exponent: u32,
    },
    /// ECC parameters.
    Ecc {
        /// The TPM curve id.
        curve_id: u16,
    },
}

/// The unique (public key) field of a TPMT_PUBLIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicId {
    /// RSA modulus.
    Rsa(Vec<u8>),
    /// ECC point.
    Ecc {
        /// x coordinate
        x: Vec<u8>,
        /// y coordinate
        y: Vec<u8>,
    },
}

/// TPMT_PUBLIC, the TPM representation of the credential public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    /// The algorithm used for computing the Name of the object.
    pub name_alg: u16,
    /// Object attributes.
    pub object_attributes: u32,
    /// Authorisation policy digest.
    pub auth_policy: Vec<u8>,
    /// Key parameters.
    pub parameters: TpmuPublicParms,
    /// Public key.
    pub unique: TpmuPublicId,
}

// A TPMT_*_SCHEME: an algorithm id followed by a hash algorithm unless it is TPM_ALG_NULL.
fn tpm_scheme_parser(i: &[u8]) -> nom::IResult<&[u8], u16> {
    let (i, scheme) = be_u16(i)?;
    let (i, _details) = cond(scheme != TPM_ALG_NULL, be_u16)(i)?;
    Ok((i, scheme))
}

fn tpmt_public_parser(i: &[u8]) -> nom::IResult<&[u8], TpmtPublic> {
    let (i, type_) = be_u16(i)?;
    let (i, name_alg) = be_u16(i)?;
    let (i, object_attributes) = be_u32(i)?;
    let (i, auth_policy) = tpm2b_parser(i)?;

    // Storage keys carry a symmetric definition, signing keys must not.
    let (i, _symmetric) = nom::combinator::verify(be_u16, |s: &u16| *s == TPM_ALG_NULL)(i)?;
    let (i, _scheme) = tpm_scheme_parser(i)?;

    let (i, parameters, unique) = match type_ {
        TPM_ALG_RSA => {
            let (i, key_bits) = be_u16(i)?;
            let (i, exponent) = be_u32(i)?;
            let (i, n) = tpm2b_parser(i)?;
            (
                i,
                TpmuPublicParms::Rsa { key_bits, exponent },
                TpmuPublicId::Rsa(n.to_vec()),
            )
        }
        TPM_ALG_ECC => {
            let (i, curve_id) = be_u16(i)?;
            let (i, _kdf) = tpm_scheme_parser(i)?;
            let (i, x) = tpm2b_parser(i)?;
            let (i, y) = tpm2b_parser(i)?;
            (
                i,
                TpmuPublicParms::Ecc { curve_id },
                TpmuPublicId::Ecc {
                    x: x.to_vec(),
                    y: y.to_vec(),
                },
            )
        }
        _ => return Err(nom_failure(i)),
    };

    Ok((
        i,
        TpmtPublic {
            name_alg,
            object_attributes,
            auth_policy: auth_policy.to_vec(),
            parameters,
            unique,
        },
    ))
}

impl TryFrom<&[u8]> for TpmtPublic {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<TpmtPublic, WebauthnError> {
        match tpmt_public_parser(data) {
            Ok((rem, v)) if rem.is_empty() => Ok(v),
            Ok(_) => Err(WebauthnError::DataConversion(
                "trailing bytes after tpm pubArea".to_string(),
            )),
            Err(e) => {
                debug!(?e, "tpm pubArea is invalid");
                Err(WebauthnError::DataConversion(
                    "invalid tpm pubArea".to_string(),
                ))
            }
        }
    }
}

impl TpmtPublic {
    /// If this public area holds the same public key as `key`.
    pub fn matches_key(&self, key: &COSEKey) -> bool {
        match (&key.key, &self.parameters, &self.unique) {
            (COSEKeyType::RSA(rsa), TpmuPublicParms::Rsa { .. }, TpmuPublicId::Rsa(n)) => {
                // The exponent is not compared, TPMs report it inconsistently.
                rsa.n == *n
            }
            (
                COSEKeyType::EC_EC2(ec2),
                TpmuPublicParms::Ecc { curve_id },
                TpmuPublicId::Ecc { x, y },
            ) => {
                let curve_matches = matches!(
                    (ec2.curve, *curve_id),
                    (ECDSACurve::SECP256R1, TPM_ECC_NIST_P256)
                        | (ECDSACurve::SECP384R1, TPM_ECC_NIST_P384)
                        | (ECDSACurve::SECP521R1, TPM_ECC_NIST_P521)
                );
                curve_matches && ec2.x == *x && ec2.y == *y
            }
            ex => {
                debug!(?ex, "unrecognised tpm key combination");
                false
            }
        }
    }
}

/// Compute the TPM Name of a public area: the nameAlg identifier followed by the digest of the
/// public area under that algorithm.
pub(crate) fn tpm_name(name_alg: u16, pub_area: &[u8]) -> WebauthnResult<Vec<u8>> {
    let md = match name_alg {
        TPM_ALG_SHA1 => openssl::hash::MessageDigest::sha1(),
        TPM_ALG_SHA256 => openssl::hash::MessageDigest::sha256(),
        TPM_ALG_SHA384 => openssl::hash::MessageDigest::sha384(),
        TPM_ALG_SHA512 => openssl::hash::MessageDigest::sha512(),
        _ => {
            return Err(WebauthnError::BadAttestationStatement(format!(
                "unsupported tpm name algorithm {name_alg:#06x}"
            )))
        }
    };
    let digest = openssl::hash::hash(md, pub_area)?;
    Ok(name_alg
        .to_be_bytes()
        .iter()
        .chain(digest.iter())
        .copied()
        .collect())
}
