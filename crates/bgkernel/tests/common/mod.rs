//
// mod.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

#![allow(dead_code)]

use std::io::{self, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use bgkernel::endpoint_set::HostResolver;
use bgkernel::engine::EngineHome;
use bgkernel::StartOptions;

/// A writer whose contents can be read back from another clone.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A resolver with a fixed host name and address table.
pub struct FakeResolver {
    pub hostname: String,
    pub addresses: Vec<(String, IpAddr)>,
}

impl FakeResolver {
    /// A machine called `worker1` at 10.0.0.5.
    pub fn worker() -> Self {
        Self {
            hostname: String::from("worker1"),
            addresses: vec![(String::from("worker1"), "10.0.0.5".parse().unwrap())],
        }
    }

    /// A machine called `worker1` whose name resolves to loopback, so its
    /// endpoints can really be bound.
    pub fn loopback() -> Self {
        Self {
            hostname: String::from("worker1"),
            addresses: vec![(String::from("worker1"), "127.0.0.1".parse().unwrap())],
        }
    }

    /// A machine whose name resolves to nothing.
    pub fn unresolvable() -> Self {
        Self {
            hostname: String::from("nowhere"),
            addresses: Vec::new(),
        }
    }
}

impl HostResolver for FakeResolver {
    fn hostname(&self) -> io::Result<String> {
        Ok(self.hostname.clone())
    }

    fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        self.addresses
            .iter()
            .find(|(name, _)| name == host)
            .map(|(_, ip)| *ip)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown host {}", host)))
    }
}

/// Collects formatted log records.
#[derive(Default)]
pub struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

impl CaptureLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("{} {}", record.level(), record.args()));
    }

    fn flush(&self) {}
}

/// Options for a kernel whose connection file goes to `runtime_dir`.
pub fn test_options(runtime_dir: &Path, home: EngineHome) -> StartOptions {
    StartOptions::default()
        .with_runtime_dir(runtime_dir)
        .with_engine_home(home)
        .with_username("tester")
        .with_banner("Hello from the tests.")
        .with_variable("demo_var", serde_json::json!(42))
}

/// A capture logger installed as the process-wide `log` backend.
pub fn global_logger() -> &'static CaptureLogger {
    static GLOBAL: OnceLock<CaptureLogger> = OnceLock::new();
    let mut installed = false;
    let logger = GLOBAL.get_or_init(|| {
        installed = true;
        CaptureLogger::default()
    });
    if installed {
        let _ = log::set_logger(logger);
        log::set_max_level(log::LevelFilter::Trace);
    }
    logger
}
