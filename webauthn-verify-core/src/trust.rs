//! Trustworthiness of a classified attestation.
//!
//! Once a statement verifier has checked the signature and classified the attestation, the
//! verifiers here decide whether the attestation can be trusted: certificate paths are chained
//! to anchors from the [`TrustAnchorRepository`], self attestation is checked against policy,
//! and ECDAA is refused.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::{stack, x509};
use uuid::Uuid;
use webauthn_attestation_ca::TrustAnchorRepository;

use crate::attestation::{AttestationStatement, CertificatePath};
use crate::config::VerifierPolicy;
use crate::crypto::certificate_key_identifier;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::{Aaguid, AttestationType, TrustOutcome};

/// Chains attestation certificate paths to trust anchors.
#[derive(Debug, Clone)]
pub struct CertPathTrustworthinessVerifier {
    repository: Arc<dyn TrustAnchorRepository>,
    full_chain_prohibited: bool,
    revocation_check_enabled: bool,
}

impl CertPathTrustworthinessVerifier {
    /// Create a verifier using anchors from `repository` and the path options of `policy`.
    pub fn new(repository: Arc<dyn TrustAnchorRepository>, policy: &VerifierPolicy) -> Self {
        CertPathTrustworthinessVerifier {
            repository,
            full_chain_prohibited: policy.full_chain_prohibited,
            revocation_check_enabled: policy.revocation_check_enabled,
        }
    }

    fn find_anchors(&self, aaguid: &Aaguid, leaf: &x509::X509Ref) -> WebauthnResult<Vec<x509::X509>> {
        let anchors = self.repository.find_by_aaguid(&Uuid::from_bytes(*aaguid));
        if !anchors.is_empty() {
            return Ok(anchors);
        }
        let key_identifier = certificate_key_identifier(leaf)?;
        Ok(self.repository.find_by_key_identifier(&key_identifier))
    }

    /// Validate `path` at `timestamp` against the anchors known for `aaguid` or for the key
    /// identifier of the leaf certificate.
    ///
    /// When no anchors are known the outcome is [`TrustOutcome::Uncertain`] rather than an
    /// error, so deployments without metadata can still register credentials.
    pub fn verify(
        &self,
        aaguid: &Aaguid,
        path: &CertificatePath,
        timestamp: SystemTime,
    ) -> WebauthnResult<TrustOutcome> {
        let fullchain = path.to_x509()?;
        let (leaf, chain) = fullchain.split_first().ok_or_else(|| {
            WebauthnError::BadAttestationStatement("x5c must not be empty".to_string())
        })?;

        let secs = timestamp
            .duration_since(UNIX_EPOCH)
            .map_err(|e| WebauthnError::Certificate(format!("invalid verification time: {e}")))?
            .as_secs();

        // Expired or not yet valid certificates are rejected even when no anchor is known.
        check_validity(&fullchain, &Asn1Time::from_unix(secs as _)?)?;

        let anchors = self.find_anchors(aaguid, leaf)?;
        if anchors.is_empty() {
            debug!(aaguid = %Uuid::from_bytes(*aaguid), "no trust anchors for authenticator");
            return Ok(TrustOutcome::Uncertain);
        }

        let anchor_ders = anchors
            .iter()
            .map(|anchor| anchor.to_der())
            .collect::<Result<Vec<_>, _>>()?;

        // A bare certificate that is itself an anchor.
        if chain.is_empty() && anchor_ders.contains(&leaf.to_der()?) {
            trace!("attestation certificate is a trust anchor");
            return Ok(TrustOutcome::Trusted);
        }

        let mut chain_stack = stack::Stack::new()?;
        for crt in chain.iter() {
            chain_stack.push(crt.clone())?;
        }

        let mut param = x509::verify::X509VerifyParam::new()?;
        // Anchors may be intermediates rather than self signed roots.
        param.set_flags(x509::verify::X509VerifyFlags::PARTIAL_CHAIN)?;
        param.set_time(secs as _);

        if self.full_chain_prohibited {
            for crt in chain.iter() {
                if anchor_ders.contains(&crt.to_der()?) {
                    debug!(sn = ?crt.subject_name(), "certificate path includes its trust anchor");
                    return Err(WebauthnError::Certificate(
                        "x5c must not contain the full chain".to_string(),
                    ));
                }
            }
        }

        let mut ca_store = x509::store::X509StoreBuilder::new()?;
        ca_store.set_param(&param)?;
        for anchor in anchors.into_iter() {
            ca_store.add_cert(anchor)?;
        }
        let ca_store = ca_store.build();

        let mut ca_ctx = x509::X509StoreContext::new()?;
        let res = ca_ctx.init(&ca_store, leaf, &chain_stack, |ca_ctx_ref| {
            ca_ctx_ref.verify_cert().map(|_| {
                let res = ca_ctx_ref.error();
                if res == x509::X509VerifyResult::OK {
                    Ok(())
                } else {
                    debug!(
                        "ca_ctx_ref verify cert - error depth={}, sn={:?}",
                        ca_ctx_ref.error_depth(),
                        ca_ctx_ref.current_cert().map(|crt| crt.subject_name())
                    );
                    Err(WebauthnError::Certificate(res.to_string()))
                }
            })
        })?;
        res?;

        if self.revocation_check_enabled {
            self.check_revocation(&fullchain)?;
        }

        Ok(TrustOutcome::Trusted)
    }

    fn check_revocation(&self, fullchain: &[x509::X509]) -> WebauthnResult<()> {
        let crls = self.repository.find_crls();
        for crt in fullchain.iter() {
            for crl in crls.iter() {
                if matches!(crl.get_by_cert(crt), x509::CrlStatus::Revoked(_)) {
                    debug!(sn = ?crt.subject_name(), "certificate is revoked");
                    return Err(WebauthnError::Certificate(
                        "certificate has been revoked".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn check_validity(fullchain: &[x509::X509], now: &Asn1Time) -> WebauthnResult<()> {
    for crt in fullchain.iter() {
        let not_yet_valid = crt.not_before().compare(now)? == Ordering::Greater;
        let expired = crt.not_after().compare(now)? == Ordering::Less;
        if not_yet_valid || expired {
            debug!(sn = ?crt.subject_name(), %not_yet_valid, %expired, "certificate is outside its validity period");
            return Err(WebauthnError::Certificate(
                "certificate is not valid at the verification time".to_string(),
            ));
        }
    }
    Ok(())
}

/// Decides whether a self attested statement is acceptable.
#[derive(Debug, Clone, Copy)]
pub struct SelfAttestationTrustworthinessVerifier {
    allowed: bool,
}

impl SelfAttestationTrustworthinessVerifier {
    /// Create a verifier that accepts self attestation only when `allowed`.
    pub fn new(allowed: bool) -> Self {
        SelfAttestationTrustworthinessVerifier { allowed }
    }

    /// A self attested statement must not present a certificate path.
    pub fn verify(&self, stmt: &AttestationStatement) -> WebauthnResult<TrustOutcome> {
        if stmt.trust_path()?.is_some() {
            debug!(fmt = %stmt.format(), "self attestation presented a certificate path");
            return Err(WebauthnError::BadAttestationStatement(
                "self attestation must not include x5c".to_string(),
            ));
        }
        if !self.allowed {
            debug!("self attestation is prohibited");
            return Err(WebauthnError::SelfAttestationProhibited);
        }
        Ok(TrustOutcome::NotApplicable)
    }
}

/// ECDAA trust evaluation. There is no implementation: every call fails with
/// [`WebauthnError::NotImplemented`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdaaTrustworthinessVerifier;

impl EcdaaTrustworthinessVerifier {
    /// Always [`WebauthnError::NotImplemented`].
    pub fn verify(&self, _stmt: &AttestationStatement) -> WebauthnResult<TrustOutcome> {
        warn!("ecdaa attestation is not supported");
        Err(WebauthnError::NotImplemented)
    }
}

/// Routes a classified attestation to the trustworthiness verifier for its type.
#[derive(Debug, Clone)]
pub(crate) struct TrustEvaluator {
    pub(crate) cert_path: CertPathTrustworthinessVerifier,
    pub(crate) self_attestation: SelfAttestationTrustworthinessVerifier,
    pub(crate) ecdaa: EcdaaTrustworthinessVerifier,
}

impl TrustEvaluator {
    pub(crate) fn new(repository: Arc<dyn TrustAnchorRepository>, policy: &VerifierPolicy) -> Self {
        TrustEvaluator {
            cert_path: CertPathTrustworthinessVerifier::new(repository, policy),
            self_attestation: SelfAttestationTrustworthinessVerifier::new(
                policy.self_attestation_allowed,
            ),
            ecdaa: EcdaaTrustworthinessVerifier,
        }
    }

    pub(crate) fn evaluate(
        &self,
        attestation_type: AttestationType,
        stmt: &AttestationStatement,
        aaguid: &Aaguid,
        timestamp: SystemTime,
    ) -> WebauthnResult<TrustOutcome> {
        match attestation_type {
            AttestationType::Basic | AttestationType::AttCa | AttestationType::AnonCa => {
                let path = stmt.trust_path()?.ok_or_else(|| {
                    WebauthnError::BadAttestationStatement(
                        "attestation has no certificate path".to_string(),
                    )
                })?;
                self.cert_path.verify(aaguid, &path, timestamp)
            }
            AttestationType::Self_ => self.self_attestation.verify(stmt),
            AttestationType::ECDAA => self.ecdaa.verify(stmt),
            AttestationType::None => Ok(TrustOutcome::NotApplicable),
            AttestationType::Uncertain => Ok(TrustOutcome::Uncertain),
        }
    }
}
