//
// service.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Starting an embedded kernel from a host thread.

use std::path::Path;
use std::sync::Arc;
use std::thread::ThreadId;

use crate::bootstrap::BootstrapState;
use crate::connection_file::{ConnectionFile, ConnectionInfo, ManifestPath};
use crate::endpoint_set::EndpointSet;
use crate::engine::{EngineContext, EngineFactory, EngineHandle, EngineHome, Namespace};
use crate::error::BKError;
use crate::namespace_engine::NamespaceEngineFactory;
use crate::options::StartOptions;
use crate::service_log::ServiceLog;
use crate::service_thread::{
    BootstrapPlan, Coordinator, EngineSource, Interrupt, ServiceThread,
};
use crate::session_identity::SessionIdentity;

/// Start an embedded kernel.
///
/// Reserves the endpoints and writes the connection file on the calling
/// thread, then starts the service thread. Returns once the service loop has
/// bound the channel sockets (and, with `EngineHome::HostThread`, once the
/// engine has been built on this thread and handed over). A bind or
/// connection file failure is fatal: the file is removed and the error
/// returned.
pub fn start(options: StartOptions) -> Result<ServiceHandle, BKError> {
    let log = ServiceLog::new(options.logger.clone());

    let identity = Arc::new(SessionIdentity::generate(&options.username)?);

    let mut endpoints = EndpointSet::bind_for(
        options.allow_remote_connections,
        options.resolver.as_ref(),
    )
    .inspect_err(|err| log.error(format_args!("{}", err)))?;

    let location = ManifestPath::derive(
        options.connection_file.clone(),
        options.connection_file_with_pid,
        std::process::id(),
        options.runtime_dir.clone(),
    );
    let connection_file = ConnectionFile::new(
        ConnectionInfo::from_endpoints(&endpoints, &identity),
        location,
    );
    connection_file
        .write()
        .inspect_err(|err| log.error(format_args!("{}", err)))?;

    log.info(format_args!(
        "To connect another client to this kernel, use: jupyter console --existing {}",
        connection_file.location.display_name()
    ));

    let listeners = endpoints.take_listeners().ok_or(BKError::StreamsTaken)?;
    let factory: Arc<dyn EngineFactory> = match options.engine_factory {
        Some(factory) => factory,
        None => Arc::new(NamespaceEngineFactory::new(
            options.engine_home,
            options.history_file.clone(),
        )),
    };

    let (source, host_build) = match options.engine_home {
        EngineHome::ServiceThread => (
            EngineSource::Build {
                factory,
                namespace: options.namespace,
                banner: options.banner,
            },
            None,
        ),
        EngineHome::HostThread => (
            EngineSource::Handoff,
            Some((factory, options.namespace, options.banner)),
        ),
    };

    let coordinator = Arc::new(Coordinator::new());
    let interrupt = Interrupt::new();
    let plan = BootstrapPlan {
        listeners,
        identity: identity.clone(),
        source,
        redirect_stdio: options.redirect_stdio,
        log: log.clone(),
        interrupt: interrupt.clone(),
    };
    let thread = match ServiceThread::spawn(&options.thread_name, plan, coordinator.clone()) {
        Ok(thread) => thread,
        Err(err) => {
            log.error(format_args!("{}", err));
            connection_file.remove();
            return Err(err);
        }
    };

    // The sockets are bound on the service loop; clients may connect once
    // the streams exist
    if let Err(err) = coordinator.wait_for(BootstrapState::StreamsReady) {
        log.error(format_args!("{}", err));
        connection_file.remove();
        return Err(err);
    }

    if let Some((factory, namespace, banner)) = host_build {
        if let Err(err) = build_on_host(&coordinator, factory, identity, namespace, banner) {
            log.error(format_args!("{}", err));
            coordinator.abandon(&err.to_string());
            connection_file.remove();
            return Err(err);
        }
    }

    Ok(ServiceHandle {
        connection_file,
        coordinator,
        interrupt,
        thread,
    })
}

/// Build the engine on the calling thread and hand it to the service
/// thread.
fn build_on_host(
    coordinator: &Coordinator,
    factory: Arc<dyn EngineFactory>,
    identity: Arc<SessionIdentity>,
    namespace: Namespace,
    banner: String,
) -> Result<(), BKError> {
    let streams = coordinator.take_streams()?;
    let engine = factory
        .create(EngineContext {
            identity,
            streams,
            namespace,
            banner,
        })
        .map_err(BKError::EngineCreate)?;
    coordinator.publish_engine(engine.handle(), Some(engine))
}

/// The host's handle to a started kernel.
///
/// Dropping the handle detaches the service thread; it keeps running until
/// the engine stops, the kernel is interrupted, or the process exits.
pub struct ServiceHandle {
    connection_file: ConnectionFile,
    coordinator: Arc<Coordinator>,
    interrupt: Interrupt,
    thread: ServiceThread,
}

impl ServiceHandle {
    /// The path of the connection file.
    pub fn connection_file(&self) -> &Path {
        self.connection_file.path()
    }

    /// The record written to the connection file.
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_file.info
    }

    /// The name to pass to `jupyter console --existing`.
    pub fn display_name(&self) -> String {
        self.connection_file.location.display_name()
    }

    pub fn bootstrap_state(&self) -> BootstrapState {
        self.coordinator.state()
    }

    /// Block until the bootstrap has reached at least `state`.
    pub fn wait_for(&self, state: BootstrapState) -> Result<BootstrapState, BKError> {
        self.coordinator.wait_for(state)
    }

    /// Block until the engine exists and return its handle.
    pub fn engine(&self) -> Result<EngineHandle, BKError> {
        self.coordinator.wait_engine()
    }

    /// Stop the service loop, as if the service thread had been
    /// interrupted.
    pub fn interrupt(&self) {
        self.interrupt.raise();
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.thread_id()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the service thread to end.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }
}
