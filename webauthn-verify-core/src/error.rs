//! Possible errors that may occur during Webauthn verification

use thiserror::Error;

/// A wrapper for `Result<T, WebauthnError>`
pub type WebauthnResult<T> = core::result::Result<T, WebauthnError>;

/// Possible errors that may occur during Webauthn verification.
///
/// Each variant is a distinct rejection cause so that callers can branch on it for logging,
/// metrics and user messaging. None of these are retried internally.
#[derive(Debug, Error)]
pub enum WebauthnError {
    /// Malformed CBOR, ASN.1, JSON or binary input.
    #[error("Unable to decode the supplied data: {0}")]
    DataConversion(String),

    /// The attestation statement format is not known, or no verifier is configured for it.
    #[error("Unsupported attestation statement format: {0}")]
    UnsupportedAttestationFormat(String),

    /// The attestation statement is missing required fields, or is inconsistent.
    #[error("Invalid attestation statement: {0}")]
    BadAttestationStatement(String),

    /// A signature failed to verify.
    #[error("Signature verification failed")]
    BadSignature,

    /// A certificate was malformed, did not meet the format requirements, used a disallowed
    /// algorithm or could not be chained to a trust anchor.
    #[error("Certificate rejected: {0}")]
    Certificate(String),

    /// The challenge in the client data does not match the issued challenge.
    #[error("The challenge does not match the issued challenge")]
    BadChallenge,

    /// No challenge was issued for this ceremony.
    #[error("No challenge was issued for this ceremony")]
    MissingChallenge,

    /// The client data origin is not an allowed origin.
    #[error("The origin is not allowed")]
    BadOrigin,

    /// The rpIdHash in the authenticator data does not match the relying party id.
    #[error("The relying party id hash does not match")]
    BadRpId,

    /// The client data type is not the one expected for this ceremony.
    #[error("The client data type is invalid for this ceremony")]
    InvalidClientDataType,

    /// The token binding id in the client data does not match the connection.
    #[error("The token binding does not match")]
    BadTokenBinding,

    /// The user present flag was not set.
    #[error("User was not present")]
    UserNotPresent,

    /// The user verified flag was not set while verification was required.
    #[error("User was not verified")]
    UserNotVerified,

    /// The backup state flag is set while the credential is not backup eligible.
    #[error("Backup state is set on a credential that is not backup eligible")]
    InconsistentBackupState,

    /// Self attestation was presented but is disabled by policy.
    #[error("Self attestation is prohibited by policy")]
    SelfAttestationProhibited,

    /// The AAGUID is not acceptable for this statement, or disagrees with the certificate.
    #[error("The AAGUID is invalid for this attestation")]
    BadAaguid,

    /// The credential public key algorithm is not in the allowed set.
    #[error("The credential algorithm is not allowed")]
    NotAllowedAlgorithm,

    /// The asserted credential id was not allowed for this ceremony.
    #[error("The credential id is not allowed")]
    NotAllowedCredentialId,

    /// The authenticator returned an extension output that was not expected.
    #[error("Unexpected extension output: {0}")]
    UnexpectedExtension(String),

    /// The signature counter did not increase, which may indicate a cloned authenticator.
    #[error("Malicious counter value: presented {presented}, stored {stored}")]
    MaliciousCounterValue {
        /// The counter reported by the authenticator.
        presented: u32,
        /// The counter previously stored for the credential.
        stored: u32,
    },

    /// The requested operation has no implementation, for example ECDAA trust evaluation.
    #[error("Not implemented")]
    NotImplemented,

    /// A verifier was invoked with a statement it does not support. This is a dispatch bug,
    /// not a property of the input.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// The verification task was cancelled or panicked on the worker pool.
    #[error("Async verification task failed: {0}")]
    AsyncJoin(String),

    /// The cryptographic provider failed.
    #[error("OpenSSL Error: {0}")]
    OpenSSLError(#[from] openssl::error::ErrorStack),
}

impl WebauthnError {
    pub(crate) fn certificate<E: std::fmt::Display>(e: E) -> Self {
        WebauthnError::Certificate(e.to_string())
    }
}
