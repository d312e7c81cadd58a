//
// wire_message_tests.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Tests for signing and framing messages

use bgkernel::session_identity::SessionIdentity;
use bgkernel::wire_message::{decode, WireMessage, DELIMITER};
use bgshared::jupyter_message::{JupyterChannel, JupyterMessage};
use bytes::Bytes;
use serde_json::json;
use zeromq::ZmqMessage;

#[test]
fn test_messages_are_signed_multipart() {
    let identity = SessionIdentity::generate("tester").unwrap();
    let request = JupyterMessage::new(
        JupyterChannel::Shell,
        "execute_request",
        json!({ "code": "x = 1\nprint x" }),
    );

    let wire = WireMessage::new(request.clone(), &identity).unwrap();
    assert_eq!(wire.signature().len(), 64);
    let header: serde_json::Value = serde_json::from_slice(&wire.parts[1]).unwrap();
    assert_eq!(header["session"], identity.session_id.as_str());
    assert_eq!(header["username"], "tester");

    // Delimiter, signature, header, parent, metadata, content
    let msg: ZmqMessage = wire.into();
    assert_eq!(msg.len(), 6);
    assert_eq!(&msg.get(0).unwrap()[..], DELIMITER);

    let (identities, decoded) = decode(msg, JupyterChannel::Shell, &identity).unwrap();
    assert!(identities.is_empty());
    assert_eq!(decoded.header, request.header);
    assert_eq!(decoded.content, request.content);
    assert!(decoded.parent_header.is_none());
}

#[test]
fn test_parent_header_and_routing_survive() {
    let identity = SessionIdentity::generate("tester").unwrap();
    let request = JupyterMessage::new(JupyterChannel::Shell, "kernel_info_request", json!({}));
    let reply = JupyterMessage::reply_to(&request, "kernel_info_reply", json!({}));

    let peer = vec![Bytes::from_static(b"peer-1")];
    let wire = WireMessage::new(reply, &identity)
        .unwrap()
        .with_identities(peer.clone());
    let (identities, decoded) = decode(wire.into(), JupyterChannel::Shell, &identity).unwrap();
    assert_eq!(identities, peer);
    assert!(decoded.is_child_of(&request.header.msg_id));
}

#[test]
fn test_foreign_or_tampered_messages_are_rejected() {
    let identity = SessionIdentity::generate("tester").unwrap();
    let stranger = SessionIdentity::generate("tester").unwrap();
    let msg = JupyterMessage::new(JupyterChannel::Shell, "execute_request", json!({ "code": "1" }));

    // Signed with another key
    let wire = WireMessage::new(msg.clone(), &stranger).unwrap();
    assert!(decode(wire.into(), JupyterChannel::Shell, &identity).is_err());

    // Content changed after signing
    let mut wire = WireMessage::new(msg, &identity).unwrap();
    wire.parts[4] = serde_json::to_vec(&json!({ "code": "2" })).unwrap();
    assert!(wire.verify(&identity).is_err());
    assert!(decode(wire.into(), JupyterChannel::Shell, &identity).is_err());

    // No delimiter
    assert!(WireMessage::from_zmq(ZmqMessage::from("hello")).is_err());
}

#[test]
fn test_empty_key_disables_signing() {
    let identity = SessionIdentity::with_key("tester", String::new()).unwrap();
    let msg = JupyterMessage::new(JupyterChannel::Control, "shutdown_request", json!({}));

    let wire = WireMessage::new(msg, &identity).unwrap();
    assert_eq!(wire.signature(), "");
    assert!(wire.verify(&identity).is_ok());
    assert!(decode(wire.into(), JupyterChannel::Control, &identity).is_ok());
}
