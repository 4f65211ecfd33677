//! Trust anchors derived from a FIDO metadata BLOB payload.
//!
//! Fetching the BLOB and checking its JWS signature is left to the caller. This module takes
//! the decoded payload, turns it into a [`TrustAnchorRepository`] and tracks when it should be
//! fetched again.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use openssl::x509;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::TrustAnchorRepository;

/// Errors from decoding a metadata payload.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The payload is not valid metadata JSON.
    #[error("Invalid metadata payload: {0}")]
    Json(#[from] serde_json::Error),
    /// A root certificate could not be decoded.
    #[error("Invalid attestation root certificate: {0}")]
    Certificate(String),
    /// An attestation certificate key identifier is not hex.
    #[error("Invalid attestation certificate key identifier: {0}")]
    KeyIdentifier(String),
    /// A date field is not an ISO-8601 date.
    #[error("Invalid date: {0}")]
    Date(String),
}

/// The status of an authenticator, as reported by the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticatorStatus {
    /// The device is not FIDO certified.
    #[serde(rename = "NOT_FIDO_CERTIFIED")]
    NotFidoCertified,
    /// The device is FIDO certified.
    #[serde(rename = "FIDO_CERTIFIED")]
    FidoCertified,
    /// Malware is able to bypass user verification.
    #[serde(rename = "USER_VERIFICATION_BYPASS")]
    UserVerificationBypass,
    /// An attestation key of this authenticator is known to be compromised.
    #[serde(rename = "ATTESTATION_KEY_COMPROMISE")]
    AttestationKeyCompromise,
    /// Registered keys can be compromised remotely.
    #[serde(rename = "USER_KEY_REMOTE_COMPROMISE")]
    UserKeyRemoteCompromise,
    /// Registered keys can be extracted with physical access.
    #[serde(rename = "USER_KEY_PHYSICAL_COMPROMISE")]
    UserKeyPhysicalCompromise,
    /// A firmware update is available.
    #[serde(rename = "UPDATE_AVAILABLE")]
    UpdateAvailable,
    /// The certification has been revoked.
    #[serde(rename = "REVOKED")]
    Revoked,
    /// The vendor submitted a self assertion.
    #[serde(rename = "SELF_ASSERTION_SUBMITTED")]
    SelfAssertionSubmitted,
    /// Certified at level 1.
    #[serde(rename = "FIDO_CERTIFIED_L1")]
    FidoCertifiedL1,
    /// Certified at level 1+.
    #[serde(rename = "FIDO_CERTIFIED_L1plus")]
    FidoCertifiedL1Plus,
    /// Certified at level 2.
    #[serde(rename = "FIDO_CERTIFIED_L2")]
    FidoCertifiedL2,
    /// Certified at level 2+.
    #[serde(rename = "FIDO_CERTIFIED_L2plus")]
    FidoCertifiedL2Plus,
    /// Certified at level 3.
    #[serde(rename = "FIDO_CERTIFIED_L3")]
    FidoCertifiedL3,
    /// Certified at level 3+.
    #[serde(rename = "FIDO_CERTIFIED_L3plus")]
    FidoCertifiedL3Plus,
}

impl AuthenticatorStatus {
    /// Whether attestations from an authenticator in this status must never be trusted.
    pub fn is_compromised(self) -> bool {
        matches!(
            self,
            AuthenticatorStatus::UserVerificationBypass
                | AuthenticatorStatus::AttestationKeyCompromise
                | AuthenticatorStatus::UserKeyRemoteCompromise
                | AuthenticatorStatus::UserKeyPhysicalCompromise
                | AuthenticatorStatus::Revoked
        )
    }
}

/// A status report of a metadata entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// The reported status.
    pub status: AuthenticatorStatus,
    /// ISO-8601 date since when the status applies.
    pub effective_date: Option<String>,
}

/// The part of a metadata statement used to derive trust anchors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    /// Human readable description of the authenticator.
    #[serde(default)]
    pub description: Option<String>,
    /// Standard base64 DER root certificates of the attestation chain.
    #[serde(default)]
    pub attestation_root_certificates: Vec<String>,
}

/// One authenticator model in a metadata payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlobPayloadEntry {
    /// The AAGUID of a FIDO2 authenticator.
    #[serde(default)]
    pub aaguid: Option<Uuid>,
    /// Hex key identifiers of the attestation certificates of a U2F authenticator.
    #[serde(default)]
    pub attestation_certificate_key_identifiers: Option<Vec<String>>,
    /// The metadata statement.
    #[serde(default)]
    pub metadata_statement: Option<MetadataStatement>,
    /// The status history, latest last.
    #[serde(default)]
    pub status_reports: Vec<StatusReport>,
    /// ISO-8601 date of the last status change.
    #[serde(default)]
    pub time_of_last_status_change: Option<String>,
}

impl MetadataBlobPayloadEntry {
    /// The current status of this entry.
    pub fn latest_status(&self) -> Option<AuthenticatorStatus> {
        self.status_reports.last().map(|report| report.status)
    }
}

/// A decoded metadata BLOB payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlobPayload {
    /// The legal header.
    #[serde(default)]
    pub legal_header: Option<String>,
    /// The serial number of this payload.
    pub no: u32,
    /// ISO-8601 date when the next payload will be published at the latest.
    pub next_update: String,
    /// The authenticator entries.
    pub entries: Vec<MetadataBlobPayloadEntry>,
}

impl MetadataBlobPayload {
    /// Decode a payload from its JSON form.
    pub fn from_json(s: &str) -> Result<Self, MetadataError> {
        serde_json::from_str(s).map_err(|e| {
            error!(?e, "invalid metadata payload");
            MetadataError::Json(e)
        })
    }

    /// The next update date as the start of that day in UTC.
    pub fn next_update(&self) -> Result<DateTime<Utc>, MetadataError> {
        let date = NaiveDate::parse_from_str(&self.next_update, "%Y-%m-%d")
            .map_err(|e| MetadataError::Date(format!("{}: {e}", self.next_update)))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| MetadataError::Date(self.next_update.clone()))?;
        Ok(Utc.from_utc_datetime(&midnight))
    }
}

/// A cached payload together with its refresh timestamps.
#[derive(Debug, Clone)]
pub struct MetadataBlobCache {
    /// The cached payload.
    pub payload: MetadataBlobPayload,
    /// When the publisher promised the next payload.
    pub next_update: DateTime<Utc>,
    /// When this payload was fetched.
    pub last_refresh: DateTime<Utc>,
}

impl MetadataBlobCache {
    /// Cache `payload`, fetched at `now`.
    pub fn new(payload: MetadataBlobPayload, now: DateTime<Utc>) -> Result<Self, MetadataError> {
        let next_update = payload.next_update()?;
        Ok(MetadataBlobCache {
            payload,
            next_update,
            last_refresh: now,
        })
    }

    /// The payload is due once its next update date has passed, but at most once an hour so
    /// a publisher that is late does not cause a fetch on every call.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.next_update < now && self.last_refresh < now - Duration::hours(1)
    }
}

/// Whether metadata must be fetched at `now`. With nothing cached it always must.
pub fn needs_refresh(cache: Option<&MetadataBlobCache>, now: DateTime<Utc>) -> bool {
    cache.map(|c| c.needs_refresh(now)).unwrap_or(true)
}

/// Which entries of a payload contribute trust anchors.
///
/// Entries whose latest status is a compromise are always excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataPolicy {
    /// Include entries whose latest status is `NOT_FIDO_CERTIFIED`.
    pub not_fido_certified_allowed: bool,
    /// Include entries whose latest status is `SELF_ASSERTION_SUBMITTED`.
    pub self_assertion_submitted_allowed: bool,
}

impl MetadataPolicy {
    fn allows(&self, status: Option<AuthenticatorStatus>) -> bool {
        match status {
            Some(s) if s.is_compromised() => false,
            Some(AuthenticatorStatus::NotFidoCertified) => self.not_fido_certified_allowed,
            Some(AuthenticatorStatus::SelfAssertionSubmitted) => {
                self.self_assertion_submitted_allowed
            }
            _ => true,
        }
    }
}

/// A trust anchor repository built from a metadata payload.
#[derive(Debug, Clone, Default)]
pub struct MetadataTrustAnchorRepository {
    by_aaguid: BTreeMap<Uuid, Vec<x509::X509>>,
    by_key_identifier: BTreeMap<Vec<u8>, Vec<x509::X509>>,
}

impl MetadataTrustAnchorRepository {
    /// Index the root certificates of every entry `policy` allows.
    pub fn new(payload: &MetadataBlobPayload, policy: MetadataPolicy) -> Result<Self, MetadataError> {
        let mut repo = MetadataTrustAnchorRepository::default();

        for entry in payload.entries.iter() {
            if !policy.allows(entry.latest_status()) {
                debug!(aaguid = ?entry.aaguid, status = ?entry.latest_status(), "excluding metadata entry");
                continue;
            }

            let roots = entry
                .metadata_statement
                .as_ref()
                .map(|ms| ms.attestation_root_certificates.as_slice())
                .unwrap_or_default()
                .iter()
                .map(|b64| {
                    let der = STANDARD
                        .decode(b64)
                        .map_err(|e| MetadataError::Certificate(e.to_string()))?;
                    x509::X509::from_der(&der).map_err(|e| MetadataError::Certificate(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            if roots.is_empty() {
                continue;
            }

            if let Some(aaguid) = entry.aaguid {
                repo.by_aaguid
                    .entry(aaguid)
                    .or_default()
                    .extend(roots.iter().cloned());
            }

            for kid in entry
                .attestation_certificate_key_identifiers
                .iter()
                .flatten()
            {
                let kid = hex::decode(kid).map_err(|e| MetadataError::KeyIdentifier(e.to_string()))?;
                repo.by_key_identifier
                    .entry(kid)
                    .or_default()
                    .extend(roots.iter().cloned());
            }
        }

        trace!(
            aaguids = repo.by_aaguid.len(),
            key_identifiers = repo.by_key_identifier.len(),
            "indexed metadata"
        );
        Ok(repo)
    }
}

impl TrustAnchorRepository for MetadataTrustAnchorRepository {
    fn find_by_aaguid(&self, aaguid: &Uuid) -> Vec<x509::X509> {
        self.by_aaguid.get(aaguid).cloned().unwrap_or_default()
    }

    fn find_by_key_identifier(&self, key_identifier: &[u8]) -> Vec<x509::X509> {
        self.by_key_identifier
            .get(key_identifier)
            .cloned()
            .unwrap_or_default()
    }
}
