//
// options.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::endpoint_set::{HostResolver, SystemResolver};
use crate::engine::{EngineFactory, EngineHome, Namespace};

/// The banner shown to clients unless the host supplies its own.
pub const DEFAULT_BANNER: &str = "Hello from bgkernel.";

/// The name of the service thread unless the host supplies its own.
pub const DEFAULT_THREAD_NAME: &str = "bgkernel service";

/// How to start an embedded kernel.
pub struct StartOptions {
    /// Where to write the connection file; None means `kernel.json` in the
    /// Jupyter runtime directory
    pub connection_file: Option<PathBuf>,

    /// Insert `-<pid>` before the connection file's extension
    pub connection_file_with_pid: bool,

    /// Overrides the Jupyter runtime directory for the default connection
    /// file location
    pub runtime_dir: Option<PathBuf>,

    /// Receives this instance's operator-facing log records; None means the
    /// global logger
    pub logger: Option<Arc<dyn log::Log>>,

    /// The engine's initial namespace
    pub namespace: Namespace,

    /// Send output written by the service thread to the attached client
    pub redirect_stdio: bool,

    /// The banner reported in `kernel_info_reply`
    pub banner: String,

    /// Bind to the address the host name resolves to instead of loopback
    pub allow_remote_connections: bool,

    /// Which thread builds the engine
    pub engine_home: EngineHome,

    /// Builds the engine; None means the built-in namespace engine
    pub engine_factory: Option<Arc<dyn EngineFactory>>,

    /// Resolves the host name when remote connections are allowed
    pub resolver: Arc<dyn HostResolver>,

    /// The username recorded in message headers
    pub username: String,

    /// The name of the service thread
    pub thread_name: String,

    /// The built-in engine's history database; None keeps history in memory
    pub history_file: Option<PathBuf>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            connection_file: None,
            connection_file_with_pid: true,
            runtime_dir: None,
            logger: None,
            namespace: Namespace::new(),
            redirect_stdio: false,
            banner: String::from(DEFAULT_BANNER),
            allow_remote_connections: false,
            engine_home: EngineHome::default(),
            engine_factory: None,
            resolver: Arc::new(SystemResolver),
            username: default_username(),
            thread_name: String::from(DEFAULT_THREAD_NAME),
            history_file: None,
        }
    }
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOptions")
            .field("connection_file", &self.connection_file)
            .field("connection_file_with_pid", &self.connection_file_with_pid)
            .field("runtime_dir", &self.runtime_dir)
            .field("logger", &self.logger.is_some())
            .field("namespace", &self.namespace)
            .field("redirect_stdio", &self.redirect_stdio)
            .field("banner", &self.banner)
            .field("allow_remote_connections", &self.allow_remote_connections)
            .field("engine_home", &self.engine_home)
            .field("engine_factory", &self.engine_factory.is_some())
            .field("username", &self.username)
            .field("thread_name", &self.thread_name)
            .field("history_file", &self.history_file)
            .finish()
    }
}

fn default_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| String::from("kernel"))
}

impl StartOptions {
    pub fn with_connection_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.connection_file = Some(path.into());
        self
    }

    pub fn with_pid_suffix(mut self, with_pid: bool) -> Self {
        self.connection_file_with_pid = with_pid;
        self
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = Some(dir.into());
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn log::Log>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Add one variable to the initial namespace.
    pub fn with_variable(mut self, name: &str, value: serde_json::Value) -> Self {
        self.namespace.insert(name.to_string(), value);
        self
    }

    pub fn with_redirect_stdio(mut self, redirect: bool) -> Self {
        self.redirect_stdio = redirect;
        self
    }

    pub fn with_banner(mut self, banner: &str) -> Self {
        self.banner = banner.to_string();
        self
    }

    pub fn with_remote_connections(mut self, allow: bool) -> Self {
        self.allow_remote_connections = allow;
        self
    }

    pub fn with_engine_home(mut self, home: EngineHome) -> Self {
        self.engine_home = home;
        self
    }

    pub fn with_engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    pub fn with_thread_name(mut self, name: &str) -> Self {
        self.thread_name = name.to_string();
        self
    }

    pub fn with_history_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_file = Some(path.into());
        self
    }
}
