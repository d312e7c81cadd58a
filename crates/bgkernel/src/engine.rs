//
// engine.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! The boundary between the embedding core and the execution engine it
//! hosts.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use event_listener::{Event, EventListener};

use crate::iopub::IopubSink;
use crate::router_stream::RouterStream;
use crate::session_identity::SessionIdentity;

/// The initial namespace handed to the engine.
pub type Namespace = serde_json::Map<String, serde_json::Value>;

/// Which thread constructs the engine.
///
/// Engines whose persistent store is bound to its creating thread for its
/// whole lifetime (including closing it at exit) must be constructed on the
/// thread that will also close the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineHome {
    /// Built, run and dropped on the service thread
    #[default]
    ServiceThread,

    /// Built on the thread that calls `start`, then run on the service thread
    HostThread,
}

/// The stream layer, constructed on the service loop.
pub struct EngineStreams {
    /// Primary command channel
    pub shell: RouterStream,

    /// Control plane channel
    pub control: RouterStream,

    /// Broadcast sink for output and status
    pub iopub: IopubSink,
}

/// Everything an engine is constructed from.
pub struct EngineContext {
    pub identity: Arc<SessionIdentity>,
    pub streams: EngineStreams,
    pub namespace: Namespace,
    pub banner: String,
}

/// An interactive execution engine.
#[async_trait(?Send)]
pub trait Engine: Send {
    /// A control handle to this engine.
    fn handle(&self) -> EngineHandle;

    /// Serve requests until the engine is asked to exit. Runs on the service
    /// loop.
    async fn run(self: Box<Self>) -> Result<(), anyhow::Error>;
}

/// Builds engines. Called exactly once per service, on the engine's home
/// thread.
pub trait EngineFactory: Send + Sync {
    fn create(&self, context: EngineContext) -> Result<Box<dyn Engine>, anyhow::Error>;
}

struct EngineControl {
    session_id: String,

    /// The pending exit request: Some(keep_host)
    exit_request: Mutex<Option<bool>>,

    /// Set once the engine has stopped serving
    stopped: AtomicBool,

    /// Fires on every exit request
    exit_event: Event,
}

/// A cheap, clonable handle to the one running engine.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineControl>,
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("session_id", &self.inner.session_id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl EngineHandle {
    pub fn new(session_id: &str) -> Self {
        Self {
            inner: Arc::new(EngineControl {
                session_id: session_id.to_string(),
                exit_request: Mutex::new(None),
                stopped: AtomicBool::new(false),
                exit_event: Event::new(),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Ask the engine to exit. With `keep_host` the attached client is told
    /// to go away but the engine keeps serving; without it the engine stops
    /// and the service thread ends.
    pub fn request_exit(&self, keep_host: bool) {
        if let Ok(mut request) = self.inner.exit_request.lock() {
            // A full stop always wins over a keep-host request
            *request = Some(request.map_or(keep_host, |keep| keep && keep_host));
        }
        log::debug!(
            "[session {}] Exit requested (keep_host: {})",
            self.inner.session_id,
            keep_host
        );
        self.inner.exit_event.notify(usize::MAX);
    }

    /// Take the pending exit request, if any. Returns `Some(keep_host)`.
    pub fn take_exit_request(&self) -> Option<bool> {
        match self.inner.exit_request.lock() {
            Ok(mut request) => request.take(),
            Err(_) => None,
        }
    }

    /// A listener that fires on the next exit request. Create it before
    /// checking `take_exit_request` so no request is missed.
    pub fn exit_listener(&self) -> EventListener {
        self.inner.exit_event.listen()
    }

    pub fn mark_stopped(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether the engine has stopped serving.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}
