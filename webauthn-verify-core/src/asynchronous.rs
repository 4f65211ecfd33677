//! Async verification. The ceremonies are CPU bound, so they run unchanged on the tokio
//! blocking pool and the futures only await their completion.

use crate::core::WebauthnVerifier;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;

/// Run `op` against a clone of `verifier` on the blocking pool.
pub async fn run_blocking<F, T>(verifier: &WebauthnVerifier, op: F) -> WebauthnResult<T>
where
    F: FnOnce(&WebauthnVerifier) -> WebauthnResult<T> + Send + 'static,
    T: Send + 'static,
{
    let verifier = verifier.clone();
    tokio::task::spawn_blocking(move || op(&verifier))
        .await
        .map_err(|e| {
            error!(?e, "verification task did not complete");
            WebauthnError::AsyncJoin(e.to_string())
        })?
}

/// An owned assertion, for moving onto another thread.
#[derive(Debug, Clone)]
pub struct AuthenticationResponse {
    /// The credential id the client used.
    pub credential_id: CredentialID,
    /// The raw authenticator data.
    pub authenticator_data: Vec<u8>,
    /// The raw client data json.
    pub client_data_json: Vec<u8>,
    /// The assertion signature.
    pub signature: Vec<u8>,
}

impl AuthenticationResponse {
    fn as_request(&self) -> AuthenticationRequest<'_> {
        AuthenticationRequest {
            credential_id: &self.credential_id,
            authenticator_data: &self.authenticator_data,
            client_data_json: &self.client_data_json,
            signature: &self.signature,
        }
    }
}

/// The async face of a [`WebauthnVerifier`].
#[derive(Debug, Clone)]
pub struct AsyncWebauthnVerifier {
    inner: WebauthnVerifier,
}

impl From<WebauthnVerifier> for AsyncWebauthnVerifier {
    fn from(inner: WebauthnVerifier) -> Self {
        AsyncWebauthnVerifier { inner }
    }
}

impl AsyncWebauthnVerifier {
    /// See [`WebauthnVerifier::verify_registration`].
    pub async fn verify_registration(
        &self,
        client_data_json: Vec<u8>,
        attestation_object: Vec<u8>,
        server_property: ServerProperty,
    ) -> WebauthnResult<RegistrationResult> {
        run_blocking(&self.inner, move |verifier| {
            verifier.verify_registration(&client_data_json, &attestation_object, &server_property)
        })
        .await
    }

    /// See [`WebauthnVerifier::verify_authentication`].
    pub async fn verify_authentication(
        &self,
        response: AuthenticationResponse,
        server_property: ServerProperty,
        credential: StoredCredential,
        allow_credentials: Option<Vec<CredentialID>>,
    ) -> WebauthnResult<AuthenticationResult> {
        run_blocking(&self.inner, move |verifier| {
            verifier.verify_authentication(
                &response.as_request(),
                &server_property,
                &credential,
                allow_credentials.as_deref(),
            )
        })
        .await
    }
}
