//! Trust anchors for webauthn attestation verification.
//!
//! A relying party decides which authenticators it trusts by supplying the root certificates
//! their attestation certificates chain to. This crate defines the [`TrustAnchorRepository`]
//! seam the verifier looks anchors up through, an in-memory [`TrustAnchorStore`] and a
//! repository built from a FIDO metadata payload.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

#[macro_use]
extern crate tracing;

mod metadata;

pub use crate::metadata::{
    needs_refresh, AuthenticatorStatus, MetadataBlobCache, MetadataBlobPayload,
    MetadataBlobPayloadEntry, MetadataError, MetadataPolicy, MetadataStatement,
    MetadataTrustAnchorRepository, StatusReport,
};

use base64urlsafedata::Base64UrlSafeData;
use openssl::error::ErrorStack as OpenSSLErrorStack;
use openssl::{hash, x509};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use uuid::Uuid;

/// The source of trust anchors for certificate path validation.
///
/// Anchors are looked up by the AAGUID of the authenticator first, and then by the key
/// identifier of the attestation certificate, which is the SHA-1 of its subject public key
/// bits. Implementations are shared between concurrent verifications and must be read-only
/// during a lookup.
pub trait TrustAnchorRepository: Send + Sync + fmt::Debug {
    /// The anchors trusted for authenticators with this AAGUID.
    fn find_by_aaguid(&self, aaguid: &Uuid) -> Vec<x509::X509>;

    /// The anchors trusted for attestation certificates with this key identifier.
    fn find_by_key_identifier(&self, key_identifier: &[u8]) -> Vec<x509::X509>;

    /// Certificate revocation lists to consult when revocation checking is enabled.
    fn find_crls(&self) -> Vec<x509::X509Crl> {
        Vec::new()
    }
}

/// A serialised trust anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialisableTrustAnchor {
    pub(crate) ca: Base64UrlSafeData,
    pub(crate) aaguids: BTreeSet<Uuid>,
    #[serde(default)]
    pub(crate) key_identifiers: BTreeSet<String>,
}

/// A root certificate and the authenticators it is trusted to attest.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "SerialisableTrustAnchor")]
pub struct TrustAnchor {
    /// The x509 root CA of the attestation chain.
    pub ca: x509::X509,
    /// The AAGUIDs this anchor is trusted for.
    pub aaguids: BTreeSet<Uuid>,
    /// The attestation certificate key identifiers this anchor is trusted for. Used by
    /// authenticators, such as U2F devices, that report no AAGUID.
    pub key_identifiers: BTreeSet<Vec<u8>>,
}

impl TryFrom<&TrustAnchor> for SerialisableTrustAnchor {
    type Error = OpenSSLErrorStack;

    fn try_from(anchor: &TrustAnchor) -> Result<Self, Self::Error> {
        Ok(SerialisableTrustAnchor {
            ca: Base64UrlSafeData::from(anchor.ca.to_der()?),
            aaguids: anchor.aaguids.clone(),
            key_identifiers: anchor.key_identifiers.iter().map(hex::encode).collect(),
        })
    }
}

impl Serialize for TrustAnchor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        SerialisableTrustAnchor::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl TryFrom<SerialisableTrustAnchor> for TrustAnchor {
    type Error = String;

    fn try_from(data: SerialisableTrustAnchor) -> Result<Self, Self::Error> {
        let key_identifiers = data
            .key_identifiers
            .iter()
            .map(hex::decode)
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid key identifier: {e}"))?;
        Ok(TrustAnchor {
            ca: x509::X509::from_der(data.ca.as_ref()).map_err(|e| e.to_string())?,
            aaguids: data.aaguids,
            key_identifiers,
        })
    }
}

impl TryFrom<&[u8]> for TrustAnchor {
    type Error = OpenSSLErrorStack;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        Ok(TrustAnchor {
            ca: x509::X509::from_pem(data)?,
            aaguids: Default::default(),
            key_identifiers: Default::default(),
        })
    }
}

impl TrustAnchor {
    /// Create a trust anchor from a DER certificate.
    pub fn new_from_der(data: &[u8]) -> Result<Self, OpenSSLErrorStack> {
        Ok(TrustAnchor {
            ca: x509::X509::from_der(data)?,
            aaguids: BTreeSet::default(),
            key_identifiers: BTreeSet::default(),
        })
    }

    /// The SHA-256 digest of the anchor certificate, used to deduplicate anchors.
    pub fn get_kid(&self) -> Result<Vec<u8>, OpenSSLErrorStack> {
        self.ca
            .digest(hash::MessageDigest::sha256())
            .map(|bytes| bytes.to_vec())
    }

    /// Trust this anchor for an additional AAGUID.
    pub fn insert_aaguid(&mut self, aaguid: Uuid) {
        self.aaguids.insert(aaguid);
    }

    /// Trust this anchor for an additional attestation certificate key identifier.
    pub fn insert_key_identifier(&mut self, key_identifier: Vec<u8>) {
        self.key_identifiers.insert(key_identifier);
    }
}

/// An in-memory set of trust anchors, and optionally revocation lists.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct TrustAnchorStore {
    /// The anchors, keyed by the digest of their certificate.
    pub anchors: BTreeMap<Base64UrlSafeData, TrustAnchor>,
    #[serde(skip)]
    crls: Vec<Vec<u8>>,
}

impl fmt::Debug for TrustAnchorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchorStore")
            .field("anchors", &self.anchors)
            .field("crls", &self.crls.len())
            .finish()
    }
}

impl TryFrom<TrustAnchor> for TrustAnchorStore {
    type Error = OpenSSLErrorStack;

    fn try_from(anchor: TrustAnchor) -> Result<Self, Self::Error> {
        let mut new = Self::default();
        new.insert(anchor)?;
        Ok(new)
    }
}

impl TryFrom<&[(&[u8], Uuid)]> for TrustAnchorStore {
    type Error = OpenSSLErrorStack;

    fn try_from(iter: &[(&[u8], Uuid)]) -> Result<Self, Self::Error> {
        let mut store = Self::default();
        for (der, aaguid) in iter {
            store.insert_for_aaguid(x509::X509::from_der(der)?, *aaguid)?;
        }
        Ok(store)
    }
}

impl TrustAnchorStore {
    /// Determine if this store contains any anchors.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Insert an anchor, replacing any anchor for the same certificate.
    pub fn insert(&mut self, anchor: TrustAnchor) -> Result<Option<TrustAnchor>, OpenSSLErrorStack> {
        let kid = anchor.get_kid()?;
        Ok(self.anchors.insert(kid.into(), anchor))
    }

    /// Trust `ca` for `aaguid`, merging with an existing anchor for the same certificate.
    pub fn insert_for_aaguid(&mut self, ca: x509::X509, aaguid: Uuid) -> Result<(), OpenSSLErrorStack> {
        let kid = ca.digest(hash::MessageDigest::sha256())?;
        self.anchors
            .entry(kid.to_vec().into())
            .or_insert_with(|| TrustAnchor {
                ca,
                aaguids: BTreeSet::default(),
                key_identifiers: BTreeSet::default(),
            })
            .insert_aaguid(aaguid);
        Ok(())
    }

    /// Trust `ca` for attestation certificates with `key_identifier`, merging with an existing
    /// anchor for the same certificate.
    pub fn insert_for_key_identifier(
        &mut self,
        ca: x509::X509,
        key_identifier: &[u8],
    ) -> Result<(), OpenSSLErrorStack> {
        let kid = ca.digest(hash::MessageDigest::sha256())?;
        self.anchors
            .entry(kid.to_vec().into())
            .or_insert_with(|| TrustAnchor {
                ca,
                aaguids: BTreeSet::default(),
                key_identifiers: BTreeSet::default(),
            })
            .insert_key_identifier(key_identifier.to_vec());
        Ok(())
    }

    /// Add a DER encoded certificate revocation list.
    pub fn add_crl_der(&mut self, der: &[u8]) -> Result<(), OpenSSLErrorStack> {
        x509::X509Crl::from_der(der)?;
        self.crls.push(der.to_vec());
        Ok(())
    }
}

impl TrustAnchorRepository for TrustAnchorStore {
    fn find_by_aaguid(&self, aaguid: &Uuid) -> Vec<x509::X509> {
        self.anchors
            .values()
            .filter(|anchor| anchor.aaguids.contains(aaguid))
            .map(|anchor| anchor.ca.clone())
            .collect()
    }

    fn find_by_key_identifier(&self, key_identifier: &[u8]) -> Vec<x509::X509> {
        self.anchors
            .values()
            .filter(|anchor| anchor.key_identifiers.contains(key_identifier))
            .map(|anchor| anchor.ca.clone())
            .collect()
    }

    fn find_crls(&self) -> Vec<x509::X509Crl> {
        self.crls
            .iter()
            .filter_map(|der| {
                x509::X509Crl::from_der(der)
                    .map_err(|e| warn!(?e, "skipping unparseable crl"))
                    .ok()
            })
            .collect()
    }
}
