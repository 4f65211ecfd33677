use super::{wrong_statement, AttestationStatement, AttestationStatementVerifier};
use crate::constants::FMT_NONE;
use crate::error::WebauthnResult;
use crate::interface::AttestationType;
use crate::registration::RegistrationObject;

/// Accepts the `none` format. There is nothing to check, so the credential is unattested.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneAttestationVerifier;

impl AttestationStatementVerifier for NoneAttestationVerifier {
    fn format(&self) -> &'static str {
        FMT_NONE
    }

    fn verify(&self, registration: &RegistrationObject) -> WebauthnResult<AttestationType> {
        match registration.attestation_object().att_stmt() {
            AttestationStatement::None => Ok(AttestationType::None),
            other => Err(wrong_statement(FMT_NONE, other)),
        }
    }
}
