//
// service_thread.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! The one background thread that owns the service loop.
//!
//! The thread builds its own single-threaded runtime; every loop-bound
//! object (the stream multiplexers, the engine's request handling, the
//! output redirection) is created and used on it. The bootstrap is the first
//! unit scheduled on the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use bgshared::jupyter_message::JupyterChannel;
use event_listener::Event;
use tokio::sync::Notify;

use crate::bootstrap::{BootstrapCoordinator, BootstrapState};
use crate::endpoint_set::BoundListeners;
use crate::engine::{Engine, EngineContext, EngineFactory, EngineStreams, Namespace};
use crate::error::BKError;
use crate::iopub::{IopubPublisher, IopubSink};
use crate::output_proxy::{self, RedirectGuard, StreamSink};
use crate::router_stream::RouterStream;
use crate::service_log::ServiceLog;
use crate::service_loop::spawn_local_logged;
use crate::session_identity::SessionIdentity;

/// How long the loop keeps running after the engine stops, so replies and
/// output already queued still reach the client.
const FLUSH_PERIOD: Duration = Duration::from_millis(200);

/// Why the service loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    /// The engine finished serving
    Stopped,

    /// The interrupt was raised
    Interrupted,
}

/// Held by the bootstrap unit. When the unit ends, fails or panics before
/// the engine is ready, the bootstrap is abandoned and the loop is released.
struct BootstrapWatch {
    coordinator: Arc<Coordinator>,
    stopped: Arc<Notify>,
}

impl Drop for BootstrapWatch {
    fn drop(&mut self) {
        if self.coordinator.state() < BootstrapState::EngineReady {
            self.coordinator.abandon("the bootstrap did not complete");
            self.stopped.notify_one();
        }
    }
}

/// The coordinator shared by the host thread and the service thread.
pub type Coordinator = BootstrapCoordinator<EngineStreams>;

struct InterruptState {
    raised: AtomicBool,
    event: Event,
}

/// The externally delivered interrupt. Raising it stops the service loop;
/// the loop treats it as a normal shutdown.
#[derive(Clone)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            state: Arc::new(InterruptState {
                raised: AtomicBool::new(false),
                event: Event::new(),
            }),
        }
    }

    pub fn raise(&self) {
        self.state.raised.store(true, Ordering::SeqCst);
        self.state.event.notify(usize::MAX);
    }

    pub fn is_raised(&self) -> bool {
        self.state.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the interrupt has been raised.
    pub async fn raised(&self) {
        loop {
            let listener = self.state.event.listen();
            if self.is_raised() {
                return;
            }
            listener.await;
        }
    }
}

/// Where the service thread gets its engine from.
pub enum EngineSource {
    /// Build it on the service thread with the factory
    Build {
        factory: Arc<dyn EngineFactory>,
        namespace: Namespace,
        banner: String,
    },

    /// Take the engine the host thread builds and publishes
    Handoff,
}

/// Everything the service thread needs to bootstrap.
pub struct BootstrapPlan {
    pub listeners: BoundListeners,
    pub identity: Arc<SessionIdentity>,
    pub source: EngineSource,
    pub redirect_stdio: bool,
    pub log: ServiceLog,
    pub interrupt: Interrupt,
}

/// The running service thread.
pub struct ServiceThread {
    join_handle: JoinHandle<()>,
}

impl ServiceThread {
    /// Start the service thread. Returns as soon as the thread exists; the
    /// bootstrap proceeds on it asynchronously.
    pub fn spawn(
        name: &str,
        plan: BootstrapPlan,
        coordinator: Arc<Coordinator>,
    ) -> Result<Self, BKError> {
        let join_handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(plan, coordinator))
            .map_err(BKError::ThreadSpawn)?;
        Ok(Self { join_handle })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.join_handle.thread().id()
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Wait for the thread to end.
    pub fn join(self) -> std::thread::Result<()> {
        self.join_handle.join()
    }

    fn run(plan: BootstrapPlan, coordinator: Arc<Coordinator>) {
        let log = plan.log.clone();
        let interrupt = plan.interrupt.clone();
        let session_id = plan.identity.session_id.clone();

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                log.error(format_args!(
                    "[session {}] Failed to create the service loop: {}",
                    session_id, err
                ));
                coordinator.abandon(&format!("no service loop: {}", err));
                return;
            }
        };

        log.info(format_args!(
            "[session {}] Starting kernel service loop. pid: {}, thread: {:?}",
            session_id,
            std::process::id(),
            std::thread::current().name().unwrap_or("<unnamed>")
        ));

        let local = tokio::task::LocalSet::new();
        let stopped = Arc::new(Notify::new());
        let watch = BootstrapWatch {
            coordinator: coordinator.clone(),
            stopped: stopped.clone(),
        };
        let loop_log = log.clone();
        let loop_session_id = session_id.clone();
        let unit_coordinator = coordinator.clone();
        let end = local.block_on(&runtime, async move {
            let unit_stopped = stopped.clone();
            spawn_local_logged("bootstrap", async move {
                let _watch = watch;
                let coordinator = unit_coordinator;
                let result = Self::bootstrap(plan, coordinator.clone(), unit_stopped).await;
                if let Err(ref err) = result {
                    if coordinator.state() < BootstrapState::EngineReady {
                        coordinator.abandon(&err.to_string());
                    }
                }
                result
            });
            tokio::select! {
                _ = stopped.notified() => LoopEnd::Stopped,
                _ = interrupt.raised() => {
                    loop_log.info(format_args!(
                        "[session {}] Interrupted; stopping the service loop",
                        loop_session_id
                    ));
                    LoopEnd::Interrupted
                }
            }
        });
        if end == LoopEnd::Stopped {
            local.block_on(&runtime, async {
                tokio::time::sleep(FLUSH_PERIOD).await;
            });
        }

        // Drop every remaining unit on this thread, so their guards are
        // released by the thread that took them
        drop(local);
        drop(runtime);

        log.debug(format_args!("[session {}] Service thread exiting", session_id));
    }

    async fn bootstrap(
        plan: BootstrapPlan,
        coordinator: Arc<Coordinator>,
        stopped: Arc<Notify>,
    ) -> anyhow::Result<()> {
        let BootstrapPlan {
            listeners,
            identity,
            source,
            redirect_stdio,
            log,
            interrupt: _,
        } = plan;

        // (a) The stream layer, bound to this loop
        let shell =
            RouterStream::bind(listeners.shell, JupyterChannel::Shell, identity.clone()).await?;
        let control =
            RouterStream::bind(listeners.control, JupyterChannel::Control, identity.clone())
                .await?;
        let iopub = IopubPublisher::bind(listeners.iopub, identity.clone()).await?;
        let sink = iopub.clone();
        coordinator.publish_streams(EngineStreams {
            shell,
            control,
            iopub,
        })?;

        // (b) The engine, built on its home thread
        let engine: Box<dyn Engine> = match source {
            EngineSource::Build {
                factory,
                namespace,
                banner,
            } => {
                let streams = coordinator.take_streams()?;
                let engine = factory
                    .create(EngineContext {
                        identity: identity.clone(),
                        streams,
                        namespace,
                        banner,
                    })
                    .map_err(BKError::EngineCreate)?;
                coordinator.publish_engine(engine.handle(), None)?;
                engine
            }
            EngineSource::Handoff => {
                // Wait off the loop so the socket units keep running
                let waiter = coordinator.clone();
                tokio::task::spawn_blocking(move || waiter.take_pending_engine()).await??
            }
        };

        // (c) Output of this thread goes to the attached client
        let _guards = if redirect_stdio {
            Self::redirect_stdio(sink, &log, &identity.session_id)
        } else {
            Vec::new()
        };

        // (d) Serve until the engine is asked to stop
        log.info(format_args!(
            "[session {}] Kernel ready",
            identity.session_id
        ));
        let handle = engine.handle();
        let result = engine.run().await;
        handle.mark_stopped();
        match result {
            Ok(()) => {
                log.info(format_args!(
                    "[session {}] Kernel stopped",
                    identity.session_id
                ));
                stopped.notify_one();
                Ok(())
            }
            Err(err) => {
                // The loop keeps serving the other units until interrupted
                log.error(format_args!(
                    "[session {}] Kernel failed: {}",
                    identity.session_id, err
                ));
                Err(err)
            }
        }
    }

    fn redirect_stdio(sink: IopubSink, log: &ServiceLog, session_id: &str) -> Vec<RedirectGuard> {
        let mut guards = Vec::new();
        let proxies = [
            ("stdout", output_proxy::stdout()),
            ("stderr", output_proxy::stderr()),
        ];
        for (name, proxy) in proxies {
            match proxy.install(StreamSink::new(name, sink.clone())) {
                Ok(guard) => guards.push(guard),
                Err(err) => log.warn(format_args!(
                    "[session {}] Not redirecting {}: {}",
                    session_id, name, err
                )),
            }
        }
        guards
    }
}
