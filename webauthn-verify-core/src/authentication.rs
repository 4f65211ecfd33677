//! Authentication ceremony verification.
//!
//! <https://w3c.github.io/webauthn/#sctn-verifying-assertion>

use openssl::memcmp;

use crate::constants::CLIENT_DATA_TYPE_GET;
use crate::core::WebauthnVerifier;
use crate::crypto::compute_sha256;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;

/// A decoded authentication response together with the context of its ceremony.
#[derive(Debug, Clone)]
pub struct AuthenticationObject {
    credential_id: Vec<u8>,
    client_data: CollectedClientData,
    client_data_hash: [u8; 32],
    authenticator_data: AuthenticatorData,
    authenticator_data_bytes: Vec<u8>,
    signature: Vec<u8>,
    server_property: ServerProperty,
}

impl AuthenticationObject {
    /// Decode the raw values of an assertion.
    pub fn new(
        request: &AuthenticationRequest<'_>,
        server_property: &ServerProperty,
    ) -> WebauthnResult<Self> {
        let client_data = CollectedClientData::try_from(request.client_data_json)?;
        let authenticator_data = AuthenticatorData::try_from(request.authenticator_data)?;

        // An assertion never carries attested credential data.
        if authenticator_data.acd.is_some() {
            debug!("assertion authenticator data carries attested credential data");
            return Err(WebauthnError::DataConversion(
                "assertion must not contain attested credential data".to_string(),
            ));
        }

        Ok(AuthenticationObject {
            credential_id: request.credential_id.to_vec(),
            client_data,
            client_data_hash: compute_sha256(request.client_data_json),
            authenticator_data,
            authenticator_data_bytes: request.authenticator_data.to_vec(),
            signature: request.signature.to_vec(),
            server_property: server_property.clone(),
        })
    }

    /// The credential id the client asserted with.
    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    /// The parsed client data.
    pub fn client_data(&self) -> &CollectedClientData {
        &self.client_data
    }

    /// SHA-256 of the client data json.
    pub fn client_data_hash(&self) -> &[u8; 32] {
        &self.client_data_hash
    }

    /// The parsed authenticator data.
    pub fn authenticator_data(&self) -> &AuthenticatorData {
        &self.authenticator_data
    }

    /// The assertion signature.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The context of this ceremony.
    pub fn server_property(&self) -> &ServerProperty {
        &self.server_property
    }

    /// The data the assertion signature covers: `authData ‖ clientDataHash`.
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = self.authenticator_data_bytes.clone();
        data.extend_from_slice(&self.client_data_hash);
        data
    }
}

/// An additional authentication check supplied by the relying party, run after every built in
/// stage has passed.
pub trait CustomAuthenticationVerifier: Send + Sync {
    /// Reject the authentication by returning an error.
    fn verify(
        &self,
        authentication: &AuthenticationObject,
        credential: &StoredCredential,
    ) -> WebauthnResult<()>;
}

impl WebauthnVerifier {
    /// Verify an authentication assertion against a stored credential.
    ///
    /// When `allow_credentials` is given, the asserted credential id must be one of them. The
    /// stored counter is never modified; see [`AuthenticationResult::needs_update`].
    pub fn verify_authentication(
        &self,
        request: &AuthenticationRequest<'_>,
        server_property: &ServerProperty,
        credential: &StoredCredential,
        allow_credentials: Option<&[CredentialID]>,
    ) -> WebauthnResult<AuthenticationResult> {
        let authentication = AuthenticationObject::new(request, server_property)?;
        self.verify_authentication_object(&authentication, credential, allow_credentials)
    }

    /// Verify an already decoded assertion.
    pub fn verify_authentication_object(
        &self,
        authentication: &AuthenticationObject,
        credential: &StoredCredential,
        allow_credentials: Option<&[CredentialID]>,
    ) -> WebauthnResult<AuthenticationResult> {
        let credential_id = authentication.credential_id();

        // If allowCredentials was given, verify that the credential is one of them.
        if let Some(allowed) = allow_credentials {
            if !allowed.iter().any(|id| id.as_slice() == credential_id) {
                debug!("asserted credential id was not in allow credentials");
                return Err(WebauthnError::NotAllowedCredentialId);
            }
        }

        // The stored credential must be the one that was asserted.
        if credential.credential_id.len() != credential_id.len()
            || !memcmp::eq(&credential.credential_id, credential_id)
        {
            debug!("asserted credential id does not match the stored credential");
            return Err(WebauthnError::NotAllowedCredentialId);
        }

        // Verify the type, challenge, origin and token binding of the client data.
        self.verify_client_data(
            authentication.client_data(),
            CLIENT_DATA_TYPE_GET,
            authentication.server_property(),
        )?;

        let auth_data = authentication.authenticator_data();

        // Verify the rpIdHash and the user present, user verified and backup flags.
        self.verify_authenticator_data(auth_data, authentication.server_property())?;

        // Using the credential public key, verify that sig is a valid signature over the
        // binary concatenation of authData and hash.
        if !credential
            .public_key
            .verify_signature(authentication.signature(), &authentication.signed_data())?
        {
            debug!("assertion signature verification failed");
            return Err(WebauthnError::BadSignature);
        }

        // If either counter is nonzero the presented counter must be greater than the stored
        // one. Otherwise the authenticator may have been cloned.
        let presented = auth_data.counter;
        let stored = credential.counter;
        if (presented > 0 || stored > 0) && presented <= stored {
            warn!(presented, stored, "signature counter did not increase");
            return Err(WebauthnError::MaliciousCounterValue { presented, stored });
        }

        self.verify_extensions(auth_data.extensions.as_ref())?;

        for custom in self.custom_authentication_verifiers.iter() {
            custom.verify(authentication, credential)?;
        }

        debug!(counter = presented, "authentication verified");

        Ok(AuthenticationResult {
            credential_id: credential.credential_id.clone(),
            counter: presented,
            needs_update: presented > stored,
            user_verified: auth_data.user_verified(),
            backup_eligible: auth_data.backup_eligible(),
            backup_state: auth_data.backup_state(),
            extensions: auth_data.extensions.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierPolicy;
    use crate::softtoken::{client_data_json, SoftToken};
    use crate::WebauthnVerifierBuilder;
    use std::sync::Arc;
    use url::Url;
    use webauthn_attestation_ca::TrustAnchorStore;

    const RP_ID: &str = "example.com";
    const ORIGIN: &str = "https://example.com";
    const CHALLENGE: &[u8] = b"authentication challenge";

    fn server_property() -> ServerProperty {
        ServerProperty::new(
            &Url::parse(ORIGIN).unwrap(),
            RP_ID,
            Some(CHALLENGE.to_vec()),
        )
        .unwrap()
    }

    fn verifier() -> WebauthnVerifier {
        WebauthnVerifierBuilder::new(Arc::new(TrustAnchorStore::default())).build()
    }

    fn stored(token: &SoftToken, counter: u32) -> StoredCredential {
        StoredCredential {
            credential_id: token.credential_id(),
            public_key: token.credential_public_key(),
            counter,
        }
    }

    fn authenticate(
        v: &WebauthnVerifier,
        token: &SoftToken,
        auth_data: &[u8],
        cdj: &[u8],
        signature: &[u8],
        credential: &StoredCredential,
    ) -> WebauthnResult<AuthenticationResult> {
        let credential_id = token.credential_id();
        let request = AuthenticationRequest {
            credential_id: &credential_id,
            authenticator_data: auth_data,
            client_data_json: cdj,
            signature,
        };
        v.verify_authentication(&request, &server_property(), credential, None)
    }

    #[test]
    fn registration_then_authentication() {
        let _ = tracing_subscriber::fmt::try_init();
        let token = SoftToken::new();
        let v = verifier();

        let (att_obj, cdj) = token.packed_self_registration(CHALLENGE, RP_ID, ORIGIN);
        let registered = v
            .verify_registration(&cdj, &att_obj, &server_property())
            .unwrap();
        let credential = registered.to_stored_credential();

        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 1);
        let result =
            authenticate(&v, &token, &auth_data, &cdj, &signature, &credential).unwrap();
        assert_eq!(result.credential_id, token.credential_id());
        assert_eq!(result.counter, 1);
        assert!(result.needs_update);
        assert!(!result.user_verified);
    }

    #[test]
    fn modified_assertion() {
        let token = SoftToken::new();
        let v = verifier();
        let credential = stored(&token, 0);
        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 1);

        // Flip a bit of the counter.
        let mut tampered = auth_data.clone();
        tampered[36] ^= 0x01;
        assert!(matches!(
            authenticate(&v, &token, &tampered, &cdj, &signature, &credential),
            Err(WebauthnError::BadSignature)
        ));

        let mut signature = signature;
        let last = signature.len() - 1;
        signature[last] ^= 0x01;
        assert!(matches!(
            authenticate(&v, &token, &auth_data, &cdj, &signature, &credential),
            Err(WebauthnError::BadSignature)
        ));

        // A key that did not make the signature.
        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 1);
        let other = StoredCredential {
            public_key: SoftToken::new().credential_public_key(),
            ..credential
        };
        assert!(matches!(
            authenticate(&v, &token, &auth_data, &cdj, &signature, &other),
            Err(WebauthnError::BadSignature)
        ));
    }

    #[test]
    fn counter_checks() {
        let token = SoftToken::new();
        let v = verifier();

        for presented in [0, 4, 5] {
            let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, presented);
            match authenticate(&v, &token, &auth_data, &cdj, &signature, &stored(&token, 5)) {
                Err(WebauthnError::MaliciousCounterValue {
                    presented: p,
                    stored: 5,
                }) => assert_eq!(p, presented),
                other => panic!("unexpected result {other:?}"),
            }
        }

        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 6);
        let result =
            authenticate(&v, &token, &auth_data, &cdj, &signature, &stored(&token, 5)).unwrap();
        assert_eq!(result.counter, 6);
        assert!(result.needs_update);

        // Authenticators without a counter always report zero.
        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 0);
        let result =
            authenticate(&v, &token, &auth_data, &cdj, &signature, &stored(&token, 0)).unwrap();
        assert_eq!(result.counter, 0);
        assert!(!result.needs_update);
    }

    #[test]
    fn attested_credential_data_is_rejected() {
        let token = SoftToken::new();
        let (att_obj, _) = token.packed_self_registration(CHALLENGE, RP_ID, ORIGIN);
        let decoded =
            crate::attestation::AttestationObject::try_from(att_obj.as_slice()).unwrap();
        let cdj = client_data_json("webauthn.get", CHALLENGE, ORIGIN, None);

        assert!(matches!(
            authenticate(
                &verifier(),
                &token,
                decoded.auth_data_bytes(),
                &cdj,
                &[0u8; 8],
                &stored(&token, 0)
            ),
            Err(WebauthnError::DataConversion(_))
        ));
    }

    #[test]
    fn credential_id_checks() {
        let token = SoftToken::new();
        let v = verifier();
        let credential = stored(&token, 0);
        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 1);
        let credential_id = token.credential_id();
        let request = AuthenticationRequest {
            credential_id: &credential_id,
            authenticator_data: &auth_data,
            client_data_json: &cdj,
            signature: &signature,
        };

        let allowed = vec![vec![0x01; 32], credential_id.clone()];
        assert!(v
            .verify_authentication(&request, &server_property(), &credential, Some(allowed.as_slice()))
            .is_ok());

        let others = vec![vec![0x01; 32]];
        assert!(matches!(
            v.verify_authentication(&request, &server_property(), &credential, Some(others.as_slice())),
            Err(WebauthnError::NotAllowedCredentialId)
        ));

        // The stored credential must be the one asserted.
        let mismatched = StoredCredential {
            credential_id: vec![0x02; 32],
            ..credential
        };
        assert!(matches!(
            v.verify_authentication(&request, &server_property(), &mismatched, None),
            Err(WebauthnError::NotAllowedCredentialId)
        ));
    }

    #[test]
    fn client_data_checks() {
        let token = SoftToken::new();
        let v = verifier();
        let credential = stored(&token, 0);

        let (auth_data, _, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 1);
        let create = client_data_json("webauthn.create", CHALLENGE, ORIGIN, None);
        assert!(matches!(
            authenticate(&v, &token, &auth_data, &create, &signature, &credential),
            Err(WebauthnError::InvalidClientDataType)
        ));

        let (auth_data, cdj, signature) = token.assertion(b"stale challenge", RP_ID, ORIGIN, 1);
        assert!(matches!(
            authenticate(&v, &token, &auth_data, &cdj, &signature, &credential),
            Err(WebauthnError::BadChallenge)
        ));

        let (auth_data, cdj, signature) =
            token.assertion(CHALLENGE, RP_ID, "https://evil.example", 1);
        assert!(matches!(
            authenticate(&v, &token, &auth_data, &cdj, &signature, &credential),
            Err(WebauthnError::BadOrigin)
        ));

        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, "evil.example", ORIGIN, 1);
        assert!(matches!(
            authenticate(&v, &token, &auth_data, &cdj, &signature, &credential),
            Err(WebauthnError::BadRpId)
        ));

        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 1);
        let policy = VerifierPolicy {
            user_verification_required: true,
            ..Default::default()
        };
        let strict = WebauthnVerifierBuilder::new(Arc::new(TrustAnchorStore::default()))
            .policy(policy)
            .build();
        assert!(matches!(
            authenticate(&strict, &token, &auth_data, &cdj, &signature, &credential),
            Err(WebauthnError::UserNotVerified)
        ));
    }

    struct MinimumCounter(u32);

    impl CustomAuthenticationVerifier for MinimumCounter {
        fn verify(
            &self,
            authentication: &AuthenticationObject,
            _credential: &StoredCredential,
        ) -> WebauthnResult<()> {
            if authentication.authenticator_data().counter < self.0 {
                return Err(WebauthnError::IllegalArgument("counter too low".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn custom_verifier() {
        let token = SoftToken::new();
        let v = WebauthnVerifierBuilder::new(Arc::new(TrustAnchorStore::default()))
            .custom_authentication_verifier(Arc::new(MinimumCounter(10)))
            .build();
        let credential = stored(&token, 0);

        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 3);
        assert!(matches!(
            authenticate(&v, &token, &auth_data, &cdj, &signature, &credential),
            Err(WebauthnError::IllegalArgument(_))
        ));

        let (auth_data, cdj, signature) = token.assertion(CHALLENGE, RP_ID, ORIGIN, 11);
        assert!(authenticate(&v, &token, &auth_data, &cdj, &signature, &credential).is_ok());
    }
}
