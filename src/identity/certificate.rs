//! Single-hop sign/verify primitives for certificates, value signatures and
//! revocations.
//!
//! Every signature covers the canonical serialization of
//! `[signing certificate hash or null, payload]`. Constructors return the
//! operation to append; the caller decides where it goes in the graph
//! (conventionally under the signing certificate). Validators never fail
//! loudly: anything malformed or forged is simply `false`.

use serde::Serialize;

use super::keys::{verify, CertificateKeys};
use super::SigningError;
use crate::convergent::{
    canonical_bytes, field_value_hash, CausalGraph, KeypairMaterial, Node, NodeId, Operation,
};

/// What a value signature or revocation points at
#[derive(Serialize)]
struct Target<'a> {
    id: &'a NodeId,
    hash: &'a str,
}

fn signing_bytes<T: Serialize>(parent_hash: Option<&str>, payload: &T) -> Result<Vec<u8>, SigningError> {
    canonical_bytes(&(parent_hash, payload)).map_err(|e| SigningError::SerializationError(e.to_string()))
}

fn certificate_keypair(cert: &Node) -> Result<&KeypairMaterial, SigningError> {
    match &cert.op {
        Operation::CreateCertificate { keypair, .. } => Ok(keypair),
        _ => Err(SigningError::NotACertificate(cert.id.clone())),
    }
}

fn sign_with(keys: &CertificateKeys, bytes: &[u8]) -> String {
    hex::encode(keys.sign(bytes).to_bytes())
}

/// A fresh keypair sealed under `password`, signed by itself
pub fn create_self_signed_certificate(password: &str) -> Result<Operation, SigningError> {
    let keypair = CertificateKeys::generate().seal(password)?;
    create_signed_certificate(None, password, keypair)
}

/// Certify `keypair`.
///
/// With a signing certificate, `password` must open that certificate's key
/// and the parent's hash is bound into the signature. Without one, the
/// certificate signs itself and `password` must open `keypair`.
pub fn create_signed_certificate(
    signing_cert: Option<&Node>,
    password: &str,
    keypair: KeypairMaterial,
) -> Result<Operation, SigningError> {
    let (signer, parent_hash) = match signing_cert {
        Some(cert) => (
            CertificateKeys::unseal(certificate_keypair(cert)?, password)?,
            Some(cert.hash.as_str()),
        ),
        None => (CertificateKeys::unseal(&keypair, password)?, None),
    };

    let bytes = signing_bytes(parent_hash, &keypair)?;
    let signature = sign_with(&signer, &bytes);
    log::debug!("certified key {}", keypair.public_key);
    Ok(Operation::CreateCertificate { keypair, signature })
}

/// Check that `candidate` was signed by `signing_cert` (or by itself when
/// `None`).
pub fn validate_certificate_signature(signing_cert: Option<&Node>, candidate: &Node) -> bool {
    let Operation::CreateCertificate { keypair, signature } = &candidate.op else {
        return false;
    };
    let (signer, parent_hash) = match signing_cert {
        Some(cert) => match certificate_keypair(cert) {
            Ok(material) => (material, Some(cert.hash.as_str())),
            Err(_) => return false,
        },
        None => (keypair, None),
    };

    match signing_bytes(parent_hash, keypair) {
        Ok(bytes) => verify(signer, &bytes, signature),
        Err(_) => false,
    }
}

/// Sign the value held by `value_node` as the value of `field_name` on
/// `entity_id`.
pub fn create_value_signature(
    cert: &Node,
    password: &str,
    value_node: &Node,
    entity_id: &str,
    field_name: &str,
) -> Result<Operation, SigningError> {
    let Operation::SetValue { value } = &value_node.op else {
        return Err(SigningError::InvalidTarget(value_node.id.clone()));
    };
    if !value.is_finite() {
        return Err(SigningError::InvalidTarget(value_node.id.clone()));
    }
    let signer = CertificateKeys::unseal(certificate_keypair(cert)?, password)?;

    let target_hash = field_value_hash(entity_id, field_name, value);
    let bytes = signing_bytes(
        Some(&cert.hash),
        &Target {
            id: &value_node.id,
            hash: &target_hash,
        },
    )?;

    Ok(Operation::CreateSignature {
        target_id: value_node.id.clone(),
        target_hash,
        signature: sign_with(&signer, &bytes),
    })
}

/// Check that `signature` binds `cert` to the value of `value_node` as the
/// value of `field_name` on `entity_id`.
pub fn validate_value_signature(
    cert: &Node,
    signature: &Node,
    value_node: &Node,
    entity_id: &str,
    field_name: &str,
) -> bool {
    let Operation::CreateSignature {
        target_id,
        target_hash,
        signature,
    } = &signature.op
    else {
        return false;
    };
    let Operation::SetValue { value } = &value_node.op else {
        return false;
    };
    let Ok(signer) = certificate_keypair(cert) else {
        return false;
    };
    if *target_id != value_node.id || *target_hash != field_value_hash(entity_id, field_name, value) {
        return false;
    }

    match signing_bytes(
        Some(&cert.hash),
        &Target {
            id: target_id,
            hash: target_hash,
        },
    ) {
        Ok(bytes) => verify(signer, &bytes, signature),
        Err(_) => false,
    }
}

/// Field value hash of a `SetValue` node, with the entity id and field name
/// read from its place in the graph. `None` when the node is not a value
/// under a field under an entity.
pub fn value_hash_in_graph<G: CausalGraph + ?Sized>(graph: &G, value_node: &Node) -> Option<String> {
    let Operation::SetValue { value } = &value_node.op else {
        return None;
    };
    let chain = graph.reference_chain(&value_node.id, 3);
    let field = chain.get(1).copied().flatten()?;
    let root = chain.get(2).copied().flatten()?;

    let Operation::CreateField { name } = &field.op else {
        return None;
    };
    let entity_id = crate::convergent::entity_id_for(root)?;
    Some(field_value_hash(&entity_id, name, value))
}

/// Revoke a certificate or a value signature
pub fn create_revocation(cert: &Node, password: &str, target: &Node) -> Result<Operation, SigningError> {
    if !matches!(
        target.op,
        Operation::CreateCertificate { .. } | Operation::CreateSignature { .. }
    ) {
        return Err(SigningError::InvalidTarget(target.id.clone()));
    }
    let signer = CertificateKeys::unseal(certificate_keypair(cert)?, password)?;

    let bytes = signing_bytes(
        Some(&cert.hash),
        &Target {
            id: &target.id,
            hash: &target.hash,
        },
    )?;

    Ok(Operation::CreateRevocation {
        target_id: target.id.clone(),
        target_hash: target.hash.clone(),
        signature: sign_with(&signer, &bytes),
    })
}

/// Check that `revocation` was issued by `cert` against `target`
pub fn validate_revocation(cert: &Node, revocation: &Node, target: &Node) -> bool {
    let Operation::CreateRevocation {
        target_id,
        target_hash,
        signature,
    } = &revocation.op
    else {
        return false;
    };
    let Ok(signer) = certificate_keypair(cert) else {
        return false;
    };
    if *target_id != target.id || *target_hash != target.hash {
        return false;
    }

    match signing_bytes(
        Some(&cert.hash),
        &Target {
            id: target_id,
            hash: target_hash,
        },
    ) {
        Ok(bytes) => verify(signer, &bytes, signature),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergent::Value;

    fn node(seq: u64, cause: Option<&Node>, op: Operation) -> Node {
        Node::new(NodeId::new("A", seq), cause.map(|c| c.id.clone()), 0, op)
    }

    #[test]
    fn test_self_signed_certificate() {
        let cert = node(1, None, create_self_signed_certificate("password").unwrap());
        assert!(validate_certificate_signature(None, &cert));
    }

    #[test]
    fn test_signed_certificate_chain() {
        let root = node(1, None, create_self_signed_certificate("root-pass").unwrap());

        let keypair = CertificateKeys::generate().seal("child-pass").unwrap();
        let child_op = create_signed_certificate(Some(&root), "root-pass", keypair).unwrap();
        let child = node(2, Some(&root), child_op);

        assert!(validate_certificate_signature(Some(&root), &child));
        // Not self-signed
        assert!(!validate_certificate_signature(None, &child));

        let stranger = node(3, None, create_self_signed_certificate("other").unwrap());
        assert!(!validate_certificate_signature(Some(&stranger), &child));
    }

    #[test]
    fn test_wrong_password_is_a_signing_error() {
        let root = node(1, None, create_self_signed_certificate("root-pass").unwrap());
        let keypair = CertificateKeys::generate().seal("child-pass").unwrap();

        assert_eq!(
            create_signed_certificate(Some(&root), "child-pass", keypair.clone()).err(),
            Some(SigningError::WrongPassword)
        );
        assert_eq!(
            create_signed_certificate(None, "root-pass", keypair).err(),
            Some(SigningError::WrongPassword)
        );
    }

    #[test]
    fn test_tampered_certificate_fails() {
        let mut cert = node(1, None, create_self_signed_certificate("password").unwrap());
        if let Operation::CreateCertificate { keypair, .. } = &mut cert.op {
            keypair.salt = "00".repeat(16);
        }
        assert!(!validate_certificate_signature(None, &cert));
    }

    #[test]
    fn test_signing_with_a_non_certificate() {
        let bogus = node(1, None, Operation::entity("bot"));
        let keypair = CertificateKeys::generate().seal("pass").unwrap();
        assert_eq!(
            create_signed_certificate(Some(&bogus), "pass", keypair).err(),
            Some(SigningError::NotACertificate(bogus.id.clone()))
        );

        let cert = node(2, None, create_self_signed_certificate("pass").unwrap());
        assert!(!validate_certificate_signature(Some(&bogus), &cert));
        assert!(!validate_certificate_signature(None, &bogus));
    }

    #[test]
    fn test_value_signature() {
        let cert = node(1, None, create_self_signed_certificate("password").unwrap());
        let value = node(5, None, Operation::value(Value::string("def")));

        let op = create_value_signature(&cert, "password", &value, "bot", "abc").unwrap();
        let signature = node(6, Some(&cert), op);

        assert!(validate_value_signature(&cert, &signature, &value, "bot", "abc"));
        assert!(!validate_value_signature(&cert, &signature, &value, "bot", "other"));
        assert!(!validate_value_signature(&cert, &signature, &value, "other", "abc"));

        let changed = node(5, None, Operation::value(Value::string("evil")));
        assert!(!validate_value_signature(&cert, &signature, &changed, "bot", "abc"));

        let stranger = node(7, None, create_self_signed_certificate("x").unwrap());
        assert!(!validate_value_signature(&stranger, &signature, &value, "bot", "abc"));
    }

    #[test]
    fn test_value_signature_requires_value_node() {
        let cert = node(1, None, create_self_signed_certificate("password").unwrap());
        let field = node(2, None, Operation::field("abc"));
        assert_eq!(
            create_value_signature(&cert, "password", &field, "bot", "abc").err(),
            Some(SigningError::InvalidTarget(field.id.clone()))
        );

        let nan = node(3, None, Operation::value(Value::Float(f64::NAN)));
        assert_eq!(
            create_value_signature(&cert, "password", &nan, "bot", "abc").err(),
            Some(SigningError::InvalidTarget(nan.id.clone()))
        );
    }

    #[test]
    fn test_revocations() {
        let root = node(1, None, create_self_signed_certificate("password").unwrap());
        let keypair = CertificateKeys::generate().seal("child").unwrap();
        let child = node(
            2,
            Some(&root),
            create_signed_certificate(Some(&root), "password", keypair).unwrap(),
        );
        let value = node(3, None, Operation::value(Value::int(0)));
        let signature = node(
            4,
            Some(&child),
            create_value_signature(&child, "child", &value, "bot", "n").unwrap(),
        );

        let revoke_child = node(5, Some(&root), create_revocation(&root, "password", &child).unwrap());
        assert!(validate_revocation(&root, &revoke_child, &child));
        assert!(!validate_revocation(&root, &revoke_child, &signature));
        assert!(!validate_revocation(&child, &revoke_child, &child));

        let revoke_sig = node(6, Some(&child), create_revocation(&child, "child", &signature).unwrap());
        assert!(validate_revocation(&child, &revoke_sig, &signature));

        assert_eq!(
            create_revocation(&root, "password", &value).err(),
            Some(SigningError::InvalidTarget(value.id.clone()))
        );
        assert_eq!(
            create_revocation(&root, "wrong", &child).err(),
            Some(SigningError::WrongPassword)
        );
    }
}
