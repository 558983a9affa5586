//! Certificate chain tests against a live document
//!
//! Certificates, signatures and revocations live in the same causal graph as
//! the bots they vouch for but never change projected state.

use bottree::convergent::{
    field_value_hash, find_entity_node, find_field_node, find_value_node, CausalGraph, Document,
    Node, NodeBatch, NodeId, Operation, Value,
};
use bottree::identity::{
    create_revocation, create_self_signed_certificate, create_signed_certificate,
    create_value_signature, validate_certificate_signature, validate_revocation,
    validate_value_signature, value_hash_in_graph, CertificateKeys,
};
use bottree::SigningError;

/// Walk from `leaf` up through signing certificates to a self-signed root,
/// checking each hop and that nothing on the way was revoked.
fn chain_is_trusted(doc: &Document, leaf: &Node, revocations: &[&Node]) -> bool {
    let mut current = leaf.clone();
    loop {
        let parent = current.cause.as_ref().and_then(|id| node_in(doc, id));
        let revoked = revocations.iter().any(|r| match &parent {
            Some(p) => validate_revocation(p, r, &current),
            None => validate_revocation(&current, r, &current),
        });
        if revoked {
            return false;
        }
        match parent {
            Some(p) => {
                if !validate_certificate_signature(Some(&p), &current) {
                    return false;
                }
                current = p;
            }
            None => return validate_certificate_signature(None, &current),
        }
    }
}

fn node_in(doc: &Document, id: &NodeId) -> Option<Node> {
    doc.graph().get_node(id).cloned()
}

#[test]
fn test_certificates_do_not_touch_state() {
    let mut doc = Document::new("A");
    let root = doc
        .apply_local(None, create_self_signed_certificate("root").unwrap())
        .unwrap();
    let keypair = CertificateKeys::generate().seal("leaf").unwrap();
    doc.apply_local(
        Some(&root.id),
        create_signed_certificate(Some(&root), "root", keypair).unwrap(),
    )
    .unwrap();

    assert!(doc.state().is_empty());
    assert_eq!(doc.version(), 0);
    assert_eq!(doc.rebuild(), *doc.state());
}

#[test]
fn test_signed_value_in_document() {
    let mut doc = Document::new("A");
    let bot = doc.apply_local(None, Operation::entity("E")).unwrap();
    let field = doc.apply_local(Some(&bot.id), Operation::field("abc")).unwrap();
    doc.apply_local(Some(&field.id), Operation::value(Value::string("def")))
        .unwrap();

    let root = doc
        .apply_local(None, create_self_signed_certificate("root").unwrap())
        .unwrap();
    let keypair = CertificateKeys::generate().seal("leaf").unwrap();
    let leaf = doc
        .apply_local(
            Some(&root.id),
            create_signed_certificate(Some(&root), "root", keypair).unwrap(),
        )
        .unwrap();

    // Sign whatever value currently wins
    let entity_node = find_entity_node(doc.graph(), "E").unwrap().clone();
    let field_node = find_field_node(doc.graph(), &entity_node, "abc").unwrap().clone();
    let value_node = find_value_node(doc.graph(), &field_node).unwrap().clone();

    let signature = doc
        .apply_local(
            Some(&leaf.id),
            create_value_signature(&leaf, "leaf", &value_node, "E", "abc").unwrap(),
        )
        .unwrap();

    assert!(validate_value_signature(&leaf, &signature, &value_node, "E", "abc"));
    assert_eq!(
        value_hash_in_graph(doc.graph(), &value_node),
        Some(field_value_hash("E", "abc", &Value::string("def")))
    );
    assert!(chain_is_trusted(&doc, &leaf, &[]));

    // A newer value is not covered by the old signature
    let newer = doc
        .apply_local(Some(&field.id), Operation::value(Value::string("ghi")))
        .unwrap();
    assert!(!validate_value_signature(&leaf, &signature, &newer, "E", "abc"));
    assert_eq!(doc.entity("E").unwrap().get("abc"), Some(&Value::string("ghi")));
}

#[test]
fn test_revoked_certificate_breaks_the_chain() {
    let mut doc = Document::new("A");
    let root = doc
        .apply_local(None, create_self_signed_certificate("root").unwrap())
        .unwrap();
    let keypair = CertificateKeys::generate().seal("leaf").unwrap();
    let leaf = doc
        .apply_local(
            Some(&root.id),
            create_signed_certificate(Some(&root), "root", keypair).unwrap(),
        )
        .unwrap();
    assert!(chain_is_trusted(&doc, &leaf, &[]));

    let revocation = doc
        .apply_local(Some(&root.id), create_revocation(&root, "root", &leaf).unwrap())
        .unwrap();
    assert!(!chain_is_trusted(&doc, &leaf, &[&revocation]));
    // The root itself is still fine
    assert!(chain_is_trusted(&doc, &root, &[&revocation]));
}

#[test]
fn test_certificates_survive_sync() {
    let mut a = Document::new("A");
    let root = a
        .apply_local(None, create_self_signed_certificate("root").unwrap())
        .unwrap();

    let mut b = Document::new("B");
    let batch = NodeBatch::since(&a, 0);
    let bytes = batch.to_cbor().unwrap();
    NodeBatch::from_cbor(&bytes)
        .unwrap()
        .apply_to(&mut b)
        .unwrap();

    let copy = node_in(&b, &root.id).unwrap();
    assert_eq!(copy, root);
    assert!(validate_certificate_signature(None, &copy));
}

#[test]
fn test_wrong_password_propagates() {
    let root = Node::new(
        NodeId::new("A", 1),
        None,
        0,
        create_self_signed_certificate("root").unwrap(),
    );
    let keypair = CertificateKeys::generate().seal("leaf").unwrap();

    let err = create_signed_certificate(Some(&root), "guess", keypair).unwrap_err();
    assert_eq!(err, SigningError::WrongPassword);
}
