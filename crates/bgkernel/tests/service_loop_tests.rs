//
// service_loop_tests.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Tests for loop units and loop-bound construction

#[path = "common/mod.rs"]
mod common;

use std::net::TcpListener;
use std::rc::Rc;
use std::sync::Arc;

use bgkernel::endpoint_set::LOOPBACK;
use bgkernel::iopub::IopubPublisher;
use bgkernel::router_stream::RouterStream;
use bgkernel::service_loop::{panic_message, run_caught, spawn_local_logged, spawn_logged};
use bgkernel::session_identity::SessionIdentity;
use bgkernel::BKError;
use bgshared::jupyter_message::JupyterChannel;
use futures::executor::block_on;
use tokio::sync::oneshot;

async fn fail() -> Result<(), anyhow::Error> {
    Err(anyhow::anyhow!("disk on fire"))
}

async fn explode() -> Result<(), anyhow::Error> {
    panic!("unit exploded")
}

#[tokio::test]
async fn test_failed_units_are_logged_and_the_loop_keeps_running() {
    let logger = common::global_logger();

    let failed = spawn_logged("failing unit", fail());
    let panicked = spawn_logged("panicking unit", explode());
    let (tx, rx) = oneshot::channel();
    let good = spawn_logged("good unit", async move {
        tx.send(7)
            .map_err(|_| anyhow::anyhow!("the receiver went away"))
    });

    // The reporting wrappers themselves always complete
    failed.await.unwrap();
    panicked.await.unwrap();
    good.await.unwrap();
    assert_eq!(rx.await.unwrap(), 7);

    assert!(logger.contains("Loop unit 'failing unit' failed: disk on fire"));
    assert!(logger.contains("Loop unit 'panicking unit' panicked: unit exploded"));
}

#[tokio::test]
async fn test_local_units_run_on_the_local_set() {
    let local = tokio::task::LocalSet::new();
    let shared = Rc::new(5);

    local
        .run_until(async move {
            let (tx, rx) = oneshot::channel();
            let value = shared.clone();
            spawn_local_logged("local unit", async move {
                tx.send(*value)
                    .map_err(|_| anyhow::anyhow!("the receiver went away"))
            })
            .await
            .unwrap();
            assert_eq!(rx.await.unwrap(), 5);
        })
        .await;
}

#[test]
fn test_streams_need_a_running_loop() {
    let identity = Arc::new(SessionIdentity::generate("tester").unwrap());

    // A plain executor, not a tokio loop
    let listener = TcpListener::bind((LOOPBACK, 0)).unwrap();
    match block_on(RouterStream::bind(listener, JupyterChannel::Shell, identity.clone())) {
        Err(BKError::NoServiceLoop(what)) => assert_eq!(what, "RouterStream"),
        Err(err) => panic!("unexpected error: {}", err),
        Ok(_) => panic!("bound a stream without a loop"),
    }

    let listener = TcpListener::bind((LOOPBACK, 0)).unwrap();
    assert!(matches!(
        block_on(IopubPublisher::bind(listener, identity)),
        Err(BKError::NoServiceLoop(_))
    ));
}

#[test]
fn test_caught_work_reports_panics() {
    let logger = common::global_logger();

    assert_eq!(run_caught("adding", || 2 + 3), Some(5));

    let mut served = Vec::new();
    for request in ["first", "broken", "third"] {
        let outcome = run_caught(&format!("{} handler", request), || {
            if request == "broken" {
                panic!("cannot handle {}", request);
            }
            request.len()
        });
        served.push(outcome);
    }
    assert_eq!(served, vec![Some(5), None, Some(5)]);
    assert!(logger.contains("Loop unit 'broken handler' panicked: cannot handle broken"));
}

#[test]
fn test_panic_messages() {
    let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned message"));
    assert_eq!(panic_message(payload.as_ref()), "owned message");

    let payload: Box<dyn std::any::Any + Send> = Box::new("static message");
    assert_eq!(panic_message(payload.as_ref()), "static message");

    let payload: Box<dyn std::any::Any + Send> = Box::new(17u32);
    assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
}
