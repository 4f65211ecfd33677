//! Registration ceremony verification.
//!
//! <https://w3c.github.io/webauthn/#sctn-registering-a-new-credential>

use std::time::SystemTime;

use uuid::Uuid;

use crate::attestation::AttestationObject;
use crate::constants::CLIENT_DATA_TYPE_CREATE;
use crate::core::WebauthnVerifier;
use crate::crypto::compute_sha256;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;

/// A decoded registration response together with the context of its ceremony. This is what
/// attestation statement verifiers and custom registration verifiers inspect.
#[derive(Debug, Clone)]
pub struct RegistrationObject {
    client_data: CollectedClientData,
    client_data_json: Vec<u8>,
    client_data_hash: [u8; 32],
    attestation_object: AttestationObject,
    server_property: ServerProperty,
    timestamp: SystemTime,
}

impl RegistrationObject {
    /// Decode the raw client data json and attestation object of a registration response.
    pub fn new(
        client_data_json: &[u8],
        attestation_object: &[u8],
        server_property: &ServerProperty,
    ) -> WebauthnResult<Self> {
        let client_data = CollectedClientData::try_from(client_data_json)?;
        let attestation_object = AttestationObject::try_from(attestation_object)?;
        trace!(?client_data, ?attestation_object);

        Ok(RegistrationObject {
            client_data,
            client_data_json: client_data_json.to_vec(),
            client_data_hash: compute_sha256(client_data_json),
            attestation_object,
            server_property: server_property.clone(),
            timestamp: SystemTime::now(),
        })
    }

    /// Verify as of `timestamp` rather than the time of decoding.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The parsed client data.
    pub fn client_data(&self) -> &CollectedClientData {
        &self.client_data
    }

    /// The client data json exactly as the client sent it.
    pub fn client_data_json(&self) -> &[u8] {
        &self.client_data_json
    }

    /// SHA-256 of the client data json.
    pub fn client_data_hash(&self) -> &[u8; 32] {
        &self.client_data_hash
    }

    /// The decoded attestation object.
    pub fn attestation_object(&self) -> &AttestationObject {
        &self.attestation_object
    }

    /// The context of this ceremony.
    pub fn server_property(&self) -> &ServerProperty {
        &self.server_property
    }

    /// When this registration is being verified. Certificates are validated at this time.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// The attested credential data, which every registration must carry.
    pub fn attested_credential_data(&self) -> WebauthnResult<&AttestedCredentialData> {
        self.attestation_object.auth_data().acd.as_ref().ok_or_else(|| {
            debug!("registration is missing attested credential data");
            WebauthnError::BadAttestationStatement(
                "attested credential data is missing".to_string(),
            )
        })
    }

    /// The data an attestation signature covers: `authData ‖ clientDataHash`.
    pub fn signed_data(&self) -> Vec<u8> {
        let auth_data = self.attestation_object.auth_data_bytes();
        let mut data = Vec::with_capacity(auth_data.len() + self.client_data_hash.len());
        data.extend_from_slice(auth_data);
        data.extend_from_slice(&self.client_data_hash);
        data
    }
}

/// An additional registration check supplied by the relying party. It runs after every built
/// in stage has passed, so it only ever sees a fully verified registration.
pub trait CustomRegistrationVerifier: Send + Sync {
    /// Reject the registration by returning an error.
    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<()>;
}

impl WebauthnVerifier {
    /// Verify a registration response.
    ///
    /// On success the caller persists the credential of the returned [`RegistrationResult`].
    /// Every failure is final for this ceremony; the caller decides whether to start a new one
    /// with a fresh challenge.
    pub fn verify_registration(
        &self,
        client_data_json: &[u8],
        attestation_object: &[u8],
        server_property: &ServerProperty,
    ) -> WebauthnResult<RegistrationResult> {
        let registration =
            RegistrationObject::new(client_data_json, attestation_object, server_property)?;
        self.verify_registration_object(&registration)
    }

    /// Verify an already decoded registration.
    pub fn verify_registration_object(
        &self,
        registration: &RegistrationObject,
    ) -> WebauthnResult<RegistrationResult> {
        let auth_data = registration.attestation_object().auth_data();
        let server_property = registration.server_property();

        // Verify the type, challenge, origin and token binding of the client data.
        self.verify_client_data(
            registration.client_data(),
            CLIENT_DATA_TYPE_CREATE,
            server_property,
        )?;

        // Verify the rpIdHash and the user present, user verified and backup flags.
        self.verify_authenticator_data(auth_data, server_property)?;

        let acd = registration.attested_credential_data()?;

        // Verify that the "alg" parameter in the credential public key in authData is one the
        // relying party accepts.
        if !self.policy.algorithm_allowed(acd.credential_pk.type_) {
            debug!(alg = ?acd.credential_pk.type_, "credential algorithm is not allowed");
            return Err(WebauthnError::NotAllowedAlgorithm);
        }

        // Determine the attestation statement format by an exact match on fmt, and verify that
        // attStmt is a correct attestation statement conveying a valid attestation signature.
        let attestation_type = self.registry.verify(registration)?;

        // Assess the attestation trustworthiness using the outputs of the statement
        // verification.
        let trust = self.trust.evaluate(
            attestation_type,
            registration.attestation_object().att_stmt(),
            &acd.aaguid,
            registration.timestamp(),
        )?;

        // Verify that the authenticator extension outputs are as expected.
        self.verify_extensions(auth_data.extensions.as_ref())?;

        for custom in self.custom_registration_verifiers.iter() {
            custom.verify(registration)?;
        }

        let format = registration.attestation_object().format();
        debug!(%format, ?attestation_type, ?trust, "registration verified");

        Ok(RegistrationResult {
            format: format.to_string(),
            attestation_type,
            trust,
            aaguid: Uuid::from_bytes(acd.aaguid),
            credential_id: acd.credential_id.clone(),
            public_key: acd.credential_pk.clone(),
            counter: auth_data.counter,
            user_verified: auth_data.user_verified(),
            backup_eligible: auth_data.backup_eligible(),
            backup_state: auth_data.backup_state(),
            extensions: auth_data.extensions.clone(),
        })
    }
}
