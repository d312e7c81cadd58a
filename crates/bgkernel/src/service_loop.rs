//
// service_loop.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Scheduling units of work on the service loop.
//!
//! A unit that fails or panics is logged with everything known about the
//! failure; the loop itself keeps running and keeps servicing other units.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::task::{JoinError, JoinHandle};

/// Spawn a unit on the current loop. Its error or panic is logged.
pub fn spawn_logged<F>(name: &str, unit: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    let name = name.to_string();
    let task = tokio::spawn(unit);
    tokio::spawn(async move { report(&name, task.await) })
}

/// Spawn a unit that is not `Send` on the current `LocalSet`. Its error or
/// panic is logged.
pub fn spawn_local_logged<F>(name: &str, unit: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), anyhow::Error>> + 'static,
{
    let name = name.to_string();
    let task = tokio::task::spawn_local(unit);
    tokio::task::spawn_local(async move { report(&name, task.await) })
}

fn report(name: &str, outcome: Result<Result<(), anyhow::Error>, JoinError>) {
    match outcome {
        Ok(Ok(())) => log::trace!("Loop unit '{}' finished", name),
        Ok(Err(err)) => log::error!("Loop unit '{}' failed: {:?}", name, err),
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            log::error!(
                "Loop unit '{}' panicked: {}",
                name,
                panic_message(payload.as_ref())
            );
        }
        Err(err) => log::debug!("Loop unit '{}' was cancelled: {}", name, err),
    }
}

/// Run one piece of work inline, catching a panic so the unit running it
/// survives. Returns None when the work panicked; the panic is logged.
pub fn run_caught<T>(name: &str, work: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(value) => Some(value),
        Err(payload) => {
            log::error!(
                "Loop unit '{}' panicked: {}",
                name,
                panic_message(payload.as_ref())
            );
            None
        }
    }
}

/// The message carried by a panic payload, if it has one.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}
