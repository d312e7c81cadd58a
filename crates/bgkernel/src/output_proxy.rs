//
// output_proxy.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Per-thread redirection of the process output streams.
//!
//! The kernel's output must go to the attached client, but only output
//! produced by the service thread; every other thread of the host keeps
//! writing to the real stream. An `OutputProxy` stands in front of one
//! stream and decides on every write, from the calling thread's identity,
//! where the bytes go. The original writer is never replaced, so removing a
//! redirection restores it exactly.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::error::BKError;
use crate::iopub::IopubSink;

/// Where a write from the calling thread goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// To the session sink installed by the calling thread
    Session,

    /// To the original process stream
    Process,
}

struct Redirect {
    owner: ThreadId,
    sink: Box<dyn Write + Send>,
}

struct ProxyState {
    original: Mutex<Box<dyn Write + Send>>,
    redirect: Mutex<Option<Redirect>>,
}

/// A routing front for one output stream. Clones share the same routing.
#[derive(Clone)]
pub struct OutputProxy {
    state: Arc<ProxyState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl OutputProxy {
    pub fn new<W: Write + Send + 'static>(original: W) -> Self {
        Self {
            state: Arc::new(ProxyState {
                original: Mutex::new(Box::new(original)),
                redirect: Mutex::new(None),
            }),
        }
    }

    /// Send everything the calling thread writes through this proxy to
    /// `sink`, until the returned guard is dropped.
    ///
    /// Fails with `BKError::RedirectActive` if any thread already redirects
    /// this proxy.
    pub fn install<W: Write + Send + 'static>(&self, sink: W) -> Result<RedirectGuard, BKError> {
        let owner = thread::current().id();
        let mut redirect = lock(&self.state.redirect);
        if let Some(ref active) = *redirect {
            return Err(BKError::RedirectActive(active.owner));
        }
        *redirect = Some(Redirect {
            owner,
            sink: Box::new(sink),
        });
        log::trace!("Output redirected for thread {:?}", owner);
        Ok(RedirectGuard {
            proxy: self.clone(),
            owner,
        })
    }

    /// The route a write from the calling thread would take right now.
    pub fn route(&self) -> Route {
        match *lock(&self.state.redirect) {
            Some(ref active) if active.owner == thread::current().id() => Route::Session,
            _ => Route::Process,
        }
    }

    /// The thread that currently redirects this proxy, if any.
    pub fn owner(&self) -> Option<ThreadId> {
        lock(&self.state.redirect).as_ref().map(|r| r.owner)
    }

    pub fn is_redirected(&self) -> bool {
        self.owner().is_some()
    }

    fn uninstall(&self, owner: ThreadId) {
        let mut redirect = lock(&self.state.redirect);
        let matches = matches!(*redirect, Some(ref active) if active.owner == owner);
        if matches {
            if let Some(mut active) = redirect.take() {
                let _ = active.sink.flush();
            }
            log::trace!("Output redirection removed for thread {:?}", owner);
        }
    }
}

impl Write for OutputProxy {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Decide and write under one lock so the route can't change midway
        {
            let mut redirect = lock(&self.state.redirect);
            if let Some(ref mut active) = *redirect {
                if active.owner == thread::current().id() {
                    return active.sink.write(buf);
                }
            }
        }
        lock(&self.state.original).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        {
            let mut redirect = lock(&self.state.redirect);
            if let Some(ref mut active) = *redirect {
                if active.owner == thread::current().id() {
                    return active.sink.flush();
                }
            }
        }
        lock(&self.state.original).flush()
    }
}

/// Scopes one redirection. Dropping it, including while unwinding from a
/// panic, removes the redirection.
#[must_use = "the redirection is removed when the guard is dropped"]
pub struct RedirectGuard {
    proxy: OutputProxy,
    owner: ThreadId,
}

impl RedirectGuard {
    /// The thread whose output is redirected.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        self.proxy.uninstall(self.owner);
    }
}

lazy_static::lazy_static! {
    static ref STDOUT: OutputProxy = OutputProxy::new(io::stdout());
    static ref STDERR: OutputProxy = OutputProxy::new(io::stderr());
}

/// The process-wide proxy in front of standard output.
pub fn stdout() -> OutputProxy {
    STDOUT.clone()
}

/// The process-wide proxy in front of standard error.
pub fn stderr() -> OutputProxy {
    STDERR.clone()
}

/// A session sink: every write becomes an iopub `stream` message.
pub struct StreamSink {
    name: String,
    iopub: IopubSink,
}

impl StreamSink {
    /// `name` is the stream name clients see: `stdout` or `stderr`.
    pub fn new(name: &str, iopub: IopubSink) -> Self {
        Self {
            name: name.to_string(),
            iopub,
        }
    }
}

impl Write for StreamSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() {
            self.iopub
                .publish_stream(&self.name, &String::from_utf8_lossy(buf));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
