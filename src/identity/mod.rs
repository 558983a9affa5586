//! Certificate chain-of-trust for tag values
//!
//! This module provides the optional provenance layer of a bot document:
//! - `CertificateKeys`: Ed25519 keypairs whose secret half travels sealed under a password
//! - `certificate`: single-hop sign/verify primitives for certificates, value signatures
//!   and revocations
//!
//! Walking a chain from a signature up to a trusted root is left to the caller.

pub mod certificate;
pub mod keys;

pub use certificate::{
    create_revocation, create_self_signed_certificate, create_signed_certificate,
    create_value_signature, validate_certificate_signature, validate_revocation,
    validate_value_signature, value_hash_in_graph,
};
pub use keys::CertificateKeys;

use crate::convergent::NodeId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Wrong password for sealed key material")]
    WrongPassword,

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Node {0} is not a certificate")]
    NotACertificate(NodeId),

    #[error("Node {0} cannot be signed or revoked this way")]
    InvalidTarget(NodeId),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}
