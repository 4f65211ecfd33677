//! Webauthn-verify-core - Webauthn attestation and assertion verification
//!
//! Webauthn is a standard allowing communication between servers, browsers and authenticators
//! to allow strong, passwordless, cryptographic authentication to be performed. This crate
//! contains the verification half of a relying party: given the bytes that a browser and
//! authenticator return, it decides whether a newly registered credential can be trusted and
//! whether a later authentication assertion is genuine and unreplayed.
//!
//! The main entry point is [`WebauthnVerifier`], created with a [`WebauthnVerifierBuilder`]
//! from a [`VerifierPolicy`] and a trust anchor repository. Each ceremony is described by a
//! [`ServerProperty`](interface::ServerProperty) holding the allowed origins, the relying party
//! id and the challenge that was issued.
//!
//! This crate never persists anything. Challenge issuance, credential storage and the
//! counter update after an authentication are the responsibility of the caller.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod constants;

pub mod asn1;
pub mod attestation;
pub mod authentication;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod interface;
pub mod internals;
pub mod registration;
pub mod trust;

#[cfg(feature = "async")]
pub mod asynchronous;

#[cfg(test)]
mod softtoken;

pub use crate::config::VerifierPolicy;
pub use crate::core::{WebauthnVerifier, WebauthnVerifierBuilder};
pub use crate::error::{WebauthnError, WebauthnResult};
pub use webauthn_attestation_ca::{TrustAnchorRepository, TrustAnchorStore};
