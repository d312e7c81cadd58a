//
// output_proxy_tests.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Tests for per-thread output redirection

#[path = "common/mod.rs"]
mod common;

use std::io::Write;
use std::thread;

use bgkernel::output_proxy::{OutputProxy, Route};
use bgkernel::BKError;
use common::SharedBuffer;

#[test]
fn test_writes_follow_the_calling_thread() {
    let original = SharedBuffer::new();
    let session = SharedBuffer::new();
    let mut proxy = OutputProxy::new(original.clone());

    // Before any redirection everything reaches the original stream
    assert_eq!(proxy.route(), Route::Process);
    write!(proxy, "before ").unwrap();

    let guard = proxy.install(session.clone()).unwrap();
    assert_eq!(guard.owner(), thread::current().id());
    assert_eq!(proxy.route(), Route::Session);
    write!(proxy, "mine").unwrap();

    // Another thread writing at the same time still reaches the original
    let mut other = proxy.clone();
    thread::spawn(move || {
        assert_eq!(other.route(), Route::Process);
        write!(other, "theirs ").unwrap();
    })
    .join()
    .unwrap();

    drop(guard);
    assert!(!proxy.is_redirected());
    assert_eq!(proxy.route(), Route::Process);
    write!(proxy, "after").unwrap();

    assert_eq!(session.contents(), "mine");
    assert_eq!(original.contents(), "before theirs after");
}

#[test]
fn test_only_one_redirection_at_a_time() {
    let proxy = OutputProxy::new(SharedBuffer::new());
    let guard = proxy.install(SharedBuffer::new()).unwrap();
    let owner = thread::current().id();

    // A second install from the same thread is refused
    assert!(matches!(
        proxy.install(SharedBuffer::new()),
        Err(BKError::RedirectActive(id)) if id == owner
    ));

    // And so is one from another thread
    let other = proxy.clone();
    let refused = thread::spawn(move || other.install(SharedBuffer::new()).is_err())
        .join()
        .unwrap();
    assert!(refused);
    assert_eq!(proxy.owner(), Some(owner));

    drop(guard);
    assert!(proxy.install(SharedBuffer::new()).is_ok());
}

#[test]
fn test_redirection_removed_when_owner_panics() {
    let original = SharedBuffer::new();
    let session = SharedBuffer::new();
    let proxy = OutputProxy::new(original.clone());

    let worker = {
        let mut proxy = proxy.clone();
        let session = session.clone();
        thread::spawn(move || {
            let _guard = proxy.install(session).unwrap();
            write!(proxy, "last words").unwrap();
            panic!("engine blew up");
        })
    };
    assert!(worker.join().is_err());

    assert!(!proxy.is_redirected());
    assert_eq!(session.contents(), "last words");

    let mut proxy = proxy;
    write!(proxy, "still here").unwrap();
    assert_eq!(original.contents(), "still here");
}
