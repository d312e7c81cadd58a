//
// endpoint_set.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::io;
use std::net::{IpAddr, TcpListener, ToSocketAddrs};

use bgshared::jupyter_message::JupyterChannel;

use crate::error::BKError;
use crate::heartbeat::HeartbeatResponder;

/// The address endpoints bind to unless remote connections are allowed.
pub const LOOPBACK: &str = "127.0.0.1";

/// Looks up the machine's name and the address it resolves to.
pub trait HostResolver: Send + Sync {
    /// The name of this machine.
    fn hostname(&self) -> io::Result<String>;

    /// Resolve a host name to an address.
    fn resolve(&self, host: &str) -> io::Result<IpAddr>;
}

/// Resolves names with the operating system's resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn hostname(&self) -> io::Result<String> {
        hostname::get()?.into_string().map_err(|name| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("host name {:?} is not valid UTF-8", name),
            )
        })
    }

    fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        let addrs: Vec<IpAddr> = (host, 0).to_socket_addrs()?.map(|a| a.ip()).collect();

        // Prefer IPv4, the family Jupyter clients expect in `ip`
        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("host '{}' has no addresses", host),
                )
            })
    }
}

/// Choose the interface to bind the endpoints to: loopback by default, or
/// the address this machine's host name resolves to when remote connections
/// are explicitly allowed.
pub fn select_bind_address(
    allow_remote: bool,
    resolver: &dyn HostResolver,
) -> Result<String, BKError> {
    if !allow_remote {
        return Ok(String::from(LOOPBACK));
    }

    let host = resolver
        .hostname()
        .map_err(|err| BKError::Resolve(String::from("<local host name>"), err))?;
    let ip = resolver
        .resolve(&host)
        .map_err(|err| BKError::Resolve(host.clone(), err))?;
    log::debug!("Remote connections allowed; '{}' resolves to {}", host, ip);
    Ok(ip.to_string())
}

/// Placeholder listeners holding the shell, control and iopub ports until
/// the service loop binds the kernel's sockets to them.
#[derive(Debug)]
pub struct BoundListeners {
    pub shell: TcpListener,
    pub control: TcpListener,
    pub iopub: TcpListener,
}

/// Release a placeholder listener and return the endpoint a kernel socket
/// should bind in its place.
pub(crate) fn take_over(reserved: TcpListener, channel: JupyterChannel) -> Result<String, BKError> {
    let addr = reserved
        .local_addr()
        .map_err(|err| BKError::Bind(channel.to_string(), err))?;
    drop(reserved);
    Ok(format!("tcp://{}", addr))
}

/// A socket that could not be bound is a bind error like any other.
pub(crate) fn socket_bind_error(endpoint: &str, err: zeromq::ZmqError) -> BKError {
    log::error!("Failed to bind socket on {}: {}", endpoint, err);
    BKError::Bind(endpoint.to_string(), io::Error::other(err.to_string()))
}

/// The four network endpoints of one embedded kernel.
///
/// Created on the host thread before the service thread exists. The shell,
/// control and iopub ports are held by placeholder listeners that the
/// service thread trades for its sockets; the heartbeat is answered by its
/// own responder thread from the start. Nothing is closed explicitly.
pub struct EndpointSet {
    /// The address all four endpoints are bound to
    pub bind_address: String,

    pub shell_port: u16,
    pub control_port: u16,
    pub iopub_port: u16,
    pub hb_port: u16,

    listeners: Option<BoundListeners>,
}

impl EndpointSet {
    /// Bind four endpoints on OS-chosen ports of `bind_address`.
    pub fn bind(bind_address: &str) -> Result<Self, BKError> {
        let shell = Self::bind_one(bind_address, "shell")?;
        let control = Self::bind_one(bind_address, "control")?;
        let iopub = Self::bind_one(bind_address, "iopub")?;

        let shell_port = Self::port_of(&shell, bind_address)?;
        let control_port = Self::port_of(&control, bind_address)?;
        let iopub_port = Self::port_of(&iopub, bind_address)?;

        let heartbeat = HeartbeatResponder::start(bind_address)?;

        log::debug!(
            "Bound endpoints on {}: shell={}, iopub={}, control={}, hb={}",
            bind_address,
            shell_port,
            iopub_port,
            control_port,
            heartbeat.port
        );

        Ok(Self {
            bind_address: bind_address.to_string(),
            shell_port,
            control_port,
            iopub_port,
            hb_port: heartbeat.port,
            listeners: Some(BoundListeners {
                shell,
                control,
                iopub,
            }),
        })
    }

    /// Select the interface and bind to it in one step.
    pub fn bind_for(allow_remote: bool, resolver: &dyn HostResolver) -> Result<Self, BKError> {
        let address = select_bind_address(allow_remote, resolver)?;
        Self::bind(&address)
    }

    fn bind_one(bind_address: &str, name: &str) -> Result<TcpListener, BKError> {
        TcpListener::bind((bind_address, 0)).map_err(|err| {
            log::error!("Failed to bind {} endpoint on {}: {}", name, bind_address, err);
            BKError::Bind(bind_address.to_string(), err)
        })
    }

    fn port_of(listener: &TcpListener, bind_address: &str) -> Result<u16, BKError> {
        listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|err| BKError::Bind(bind_address.to_string(), err))
    }

    /// Take the placeholder listeners for the service thread. Returns None
    /// once they have been taken.
    pub fn take_listeners(&mut self) -> Option<BoundListeners> {
        self.listeners.take()
    }

    /// The four ports, in shell, control, iopub, heartbeat order.
    pub fn ports(&self) -> [u16; 4] {
        [self.shell_port, self.control_port, self.iopub_port, self.hb_port]
    }
}
