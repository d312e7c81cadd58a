//
// history_tests.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Tests for the SQLite input history and its thread affinity

use std::thread;

use bgkernel::namespace_engine::history::{HistoryStore, ThreadAffinity};
use bgkernel::BKError;

fn sources(entries: &[bgkernel::namespace_engine::history::HistoryEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.source.as_str()).collect()
}

#[test]
fn test_tail_returns_the_latest_inputs_oldest_first() {
    let store = HistoryStore::open(None, ThreadAffinity::Strict).unwrap();
    store.record(1, "x = 1").unwrap();
    store.record(2, "y = 2").unwrap();
    store.record(3, "print x").unwrap();

    let tail = store.tail(2).unwrap();
    assert_eq!(sources(&tail), vec!["y = 2", "print x"]);
    assert_eq!(tail[0].session, store.session());
    assert_eq!(tail[0].line, 2);

    assert_eq!(store.tail(10).unwrap().len(), 3);
    store.close().unwrap();
}

#[test]
fn test_range_and_search() {
    let store = HistoryStore::open(None, ThreadAffinity::Shared).unwrap();
    for (line, source) in ["a = 1", "b = 2", "print a", "print b"].iter().enumerate() {
        store.record(line as i64 + 1, source).unwrap();
    }

    let range = store.range(0, 2, Some(4)).unwrap();
    assert_eq!(sources(&range), vec!["b = 2", "print a"]);

    let open_ended = store.range(store.session(), 3, None).unwrap();
    assert_eq!(sources(&open_ended), vec!["print a", "print b"]);

    let found = store.search("print*").unwrap();
    assert_eq!(sources(&found), vec!["print a", "print b"]);
    assert!(store.search("del*").unwrap().is_empty());
}

#[test]
fn test_rerecording_a_line_replaces_it() {
    let store = HistoryStore::open(None, ThreadAffinity::Strict).unwrap();
    store.record(1, "first").unwrap();
    store.record(1, "second").unwrap();

    assert_eq!(sources(&store.tail(5).unwrap()), vec!["second"]);
}

#[test]
fn test_strict_store_refuses_other_threads() {
    let store = HistoryStore::open(None, ThreadAffinity::Strict).unwrap();
    store.record(1, "x = 1").unwrap();
    let owner = store.owner();

    let (store, recorded) = thread::spawn(move || {
        let recorded = store.record(2, "y = 2");
        (store, recorded)
    })
    .join()
    .unwrap();
    match recorded {
        Err(BKError::StoreAffinity { owner: o, caller }) => {
            assert_eq!(o, owner);
            assert_ne!(caller, owner);
        }
        other => panic!("expected StoreAffinity, got {:?}", other),
    }

    // Back on the owning thread everything works again
    assert_eq!(store.tail(5).unwrap().len(), 1);
    store.close().unwrap();
}

#[test]
fn test_strict_store_is_only_closed_by_its_owner() {
    let store = HistoryStore::open(None, ThreadAffinity::Strict).unwrap();

    let closed = thread::spawn(move || store.close()).join().unwrap();
    assert!(matches!(closed, Err(BKError::StoreAffinity { .. })));
}

#[test]
fn test_shared_store_crosses_threads() {
    let store = HistoryStore::open(None, ThreadAffinity::Shared).unwrap();
    store.record(1, "built here").unwrap();

    let closed = thread::spawn(move || {
        store.record(2, "used there").unwrap();
        assert_eq!(store.tail(5).unwrap().len(), 2);
        store.close()
    })
    .join()
    .unwrap();
    assert!(closed.is_ok());
}

#[test]
fn test_file_backed_sessions_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.sqlite");

    let first = HistoryStore::open(Some(&path), ThreadAffinity::Strict).unwrap();
    first.record(1, "from the first session").unwrap();
    let first_session = first.session();
    first.close().unwrap();

    let second = HistoryStore::open(Some(&path), ThreadAffinity::Strict).unwrap();
    assert!(second.session() > first_session);
    second.record(1, "from the second session").unwrap();

    assert_eq!(
        sources(&second.tail(5).unwrap()),
        vec!["from the first session", "from the second session"]
    );

    // Session -1 is the one before the current one
    let previous = second.range(-1, 1, None).unwrap();
    assert_eq!(sources(&previous), vec!["from the first session"]);
    second.close().unwrap();
}
