//
// endpoint_tests.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Tests for endpoint binding and the heartbeat responder

#[path = "common/mod.rs"]
mod common;

use std::collections::HashSet;
use std::net::TcpListener;
use std::time::Duration;

use bgkernel::connection_file::ConnectionInfo;
use bgkernel::endpoint_set::{select_bind_address, EndpointSet, SystemResolver, LOOPBACK};
use bgkernel::heartbeat;
use bgkernel::session_identity::SessionIdentity;
use bgkernel::BKError;
use common::FakeResolver;

#[test]
fn test_four_distinct_ports() {
    let endpoints = EndpointSet::bind(LOOPBACK).unwrap();
    let ports: HashSet<u16> = endpoints.ports().into_iter().collect();

    assert_eq!(ports.len(), 4);
    assert!(!ports.contains(&0));
    assert_eq!(endpoints.bind_address, "127.0.0.1");
}

#[test]
fn test_ports_are_really_bound() {
    let mut endpoints = EndpointSet::bind(LOOPBACK).unwrap();
    let listeners = endpoints.take_listeners().unwrap();

    assert_eq!(
        listeners.shell.local_addr().unwrap().port(),
        endpoints.shell_port
    );
    assert_eq!(
        listeners.iopub.local_addr().unwrap().port(),
        endpoints.iopub_port
    );

    // While the listener is alive nobody else gets the port
    assert!(TcpListener::bind((LOOPBACK, endpoints.shell_port)).is_err());
}

#[test]
fn test_listeners_are_taken_once() {
    let mut endpoints = EndpointSet::bind(LOOPBACK).unwrap();
    assert!(endpoints.take_listeners().is_some());
    assert!(endpoints.take_listeners().is_none());
}

#[test]
fn test_two_sets_bind_independently() {
    let first = EndpointSet::bind(LOOPBACK).unwrap();
    let second = EndpointSet::bind(LOOPBACK).unwrap();

    let first: HashSet<u16> = first.ports().into_iter().collect();
    let second: HashSet<u16> = second.ports().into_iter().collect();
    assert!(first.is_disjoint(&second));
}

#[test]
fn test_loopback_unless_remote_allowed() {
    // The resolver is not consulted for loopback
    let address = select_bind_address(false, &FakeResolver::unresolvable()).unwrap();
    assert_eq!(address, LOOPBACK);

    let address = select_bind_address(false, &SystemResolver).unwrap();
    assert_eq!(address, LOOPBACK);
}

#[test]
fn test_remote_uses_the_host_address() {
    let address = select_bind_address(true, &FakeResolver::worker()).unwrap();
    assert_eq!(address, "10.0.0.5");
}

#[test]
fn test_unresolvable_host_is_a_bind_error() {
    let err = select_bind_address(true, &FakeResolver::unresolvable()).unwrap_err();
    assert!(matches!(err, BKError::Resolve(ref host, _) if host == "nowhere"));
    assert!(err.is_bind_error());

    let err = match EndpointSet::bind_for(true, &FakeResolver::unresolvable()) {
        Ok(_) => panic!("binding should fail"),
        Err(err) => err,
    };
    assert!(err.is_bind_error());
}

#[test]
fn test_unusable_address_is_a_bind_error() {
    // TEST-NET-1 is never assigned to a local interface
    let err = match EndpointSet::bind("192.0.2.1") {
        Ok(_) => panic!("binding should fail"),
        Err(err) => err,
    };
    assert!(matches!(err, BKError::Bind(..)));
}

#[test]
fn test_remote_endpoints_bind_the_resolved_address() {
    let endpoints = EndpointSet::bind_for(true, &FakeResolver::loopback()).unwrap();
    assert_eq!(endpoints.bind_address, "127.0.0.1");
    let ports: HashSet<u16> = endpoints.ports().into_iter().collect();
    assert_eq!(ports.len(), 4);
}

#[test]
fn test_connection_info_carries_the_resolved_address() {
    let identity = SessionIdentity::generate("tester").unwrap();
    let address = select_bind_address(true, &FakeResolver::worker()).unwrap();
    let info = ConnectionInfo::new(&address, [5001, 5002, 5003, 5004], &identity);

    assert_eq!(info.ip, "10.0.0.5");
    assert_eq!(info.shell_port, 5001);
    assert_eq!(info.control_port, 5002);
    assert_eq!(info.iopub_port, 5003);
    assert_eq!(info.hb_port, 5004);
    assert_eq!(info.endpoint(info.shell_port), "tcp://10.0.0.5:5001");
}

#[tokio::test]
async fn test_heartbeat_echoes() {
    let endpoints = EndpointSet::bind(LOOPBACK).unwrap();
    let endpoint = format!("tcp://{}:{}", LOOPBACK, endpoints.hb_port);

    assert!(heartbeat::ping(&endpoint, Duration::from_secs(5)).await);

    // Several clients in a row are all answered
    assert!(heartbeat::ping(&endpoint, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_heartbeat_without_responder() {
    // Bind and drop to find a port nobody listens on
    let port = TcpListener::bind((LOOPBACK, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let endpoint = format!("tcp://{}:{}", LOOPBACK, port);

    assert!(!heartbeat::ping(&endpoint, Duration::from_millis(500)).await);
}
