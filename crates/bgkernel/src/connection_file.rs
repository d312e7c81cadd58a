//
// connection_file.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;

use crate::endpoint_set::EndpointSet;
use crate::error::BKError;
use crate::exit_cleanup;
use crate::session_identity::SessionIdentity;

/// Default file name of a connection file, before the pid suffix.
pub const DEFAULT_FILE_NAME: &str = "kernel.json";

/// The contents of the Connection File as listed in the Jupyter specification;
/// directly serialized to JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The IP address the endpoints are bound to
    pub ip: String,

    /// The transport; always "tcp"
    pub transport: String,

    /// The signature scheme; always "hmac-sha256"
    pub signature_scheme: String,

    /// The signing key shared with connecting clients
    pub key: String,

    pub shell_port: u16,
    pub iopub_port: u16,
    pub control_port: u16,
    pub hb_port: u16,

    /// The kernel name reported to clients
    #[serde(default)]
    pub kernel_name: String,
}

impl ConnectionInfo {
    /// Describe endpoints bound on `ip`, for clients that share `identity`'s
    /// key. `ports` are the shell, control, iopub and heartbeat ports, in that
    /// order.
    pub fn new(ip: &str, ports: [u16; 4], identity: &SessionIdentity) -> Self {
        let [shell_port, control_port, iopub_port, hb_port] = ports;
        Self {
            ip: ip.to_string(),
            transport: String::from("tcp"),
            signature_scheme: String::from("hmac-sha256"),
            key: identity.key().to_string(),
            shell_port,
            iopub_port,
            control_port,
            hb_port,
            kernel_name: String::from("bgkernel"),
        }
    }

    /// Describe a bound endpoint set.
    pub fn from_endpoints(endpoints: &EndpointSet, identity: &SessionIdentity) -> Self {
        Self::new(
            &endpoints.bind_address,
            [
                endpoints.shell_port,
                endpoints.control_port,
                endpoints.iopub_port,
                endpoints.hb_port,
            ],
            identity,
        )
    }

    /// Given a port, return a URI-like string that can be used to connect to
    /// the port, given the other parameters in the connection file.
    ///
    /// Example: `32` => `"tcp://127.0.0.1:32"`
    pub fn endpoint(&self, port: u16) -> String {
        format!("{}://{}:{}", self.transport, self.ip, port)
    }
}

/// Where a connection file lives, and how to name it in operator-facing logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPath {
    /// The full path of the file
    pub path: PathBuf,

    /// Whether the display form may be reduced to the bare pid
    reduce_for_display: bool,
}

impl ManifestPath {
    /// Derive the connection file path.
    ///
    /// # Arguments
    ///
    /// * `explicit` - A path chosen by the host; None means `kernel.json` in
    ///   the runtime directory.
    /// * `with_pid` - Insert `-<pid>` before the extension, so concurrent
    ///   processes don't overwrite each other's files.
    /// * `pid` - The process ID to insert.
    /// * `runtime_dir` - Overrides the default runtime directory.
    pub fn derive(
        explicit: Option<PathBuf>,
        with_pid: bool,
        pid: u32,
        runtime_dir: Option<PathBuf>,
    ) -> Self {
        let mut reduce_for_display = false;
        let path = match explicit {
            Some(path) => path,
            None => match runtime_dir.or_else(jupyter_runtime_dir) {
                Some(dir) => {
                    reduce_for_display = with_pid;
                    dir.join(DEFAULT_FILE_NAME)
                }
                None => PathBuf::from(DEFAULT_FILE_NAME),
            },
        };

        let path = if with_pid {
            Self::with_pid_suffix(&path, pid)
        } else {
            path
        };

        Self {
            path,
            reduce_for_display,
        }
    }

    fn with_pid_suffix(path: &Path, pid: u32) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match path.extension() {
            Some(ext) => format!("{}-{}.{}", stem, pid, ext.to_string_lossy()),
            None => format!("{}-{}", stem, pid),
        };
        path.with_file_name(name)
    }

    /// The name to show operators. For default paths this is just the pid,
    /// which `jupyter console --existing` resolves in its runtime directory.
    pub fn display_name(&self) -> String {
        let full = self.path.to_string_lossy().to_string();
        if !self.reduce_for_display {
            return full;
        }
        match regex::Regex::new(r".*kernel-([^\-]*).*\.json") {
            Ok(re) => re.replace(&full, "$1").to_string(),
            Err(_) => full,
        }
    }
}

/// The Jupyter runtime directory: `$JUPYTER_RUNTIME_DIR`, else the
/// `runtime` directory under Jupyter's data directory.
pub fn jupyter_runtime_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("JUPYTER_RUNTIME_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    jupyter_data_dir().map(|dir| dir.join("runtime"))
}

#[cfg(target_os = "macos")]
fn jupyter_data_dir() -> Option<PathBuf> {
    // On macOS, Jupyter doesn't follow the XDG Base Directory
    // Specification; it stores its data in `~/Library/Jupyter` instead
    // of the "correct" XDG location in `~/Library/Application Support`.
    let base_dir = directories::BaseDirs::new()?;
    Some(base_dir.home_dir().join("Library").join("Jupyter"))
}

#[cfg(not(target_os = "macos"))]
fn jupyter_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "jupyter")?;
    Some(dir.data_dir().to_path_buf())
}

/// A connection file: the record plus where it is written.
#[derive(Debug, Clone)]
pub struct ConnectionFile {
    pub info: ConnectionInfo,
    pub location: ManifestPath,
}

impl ConnectionFile {
    pub fn new(info: ConnectionInfo, location: ManifestPath) -> Self {
        Self { info, location }
    }

    pub fn path(&self) -> &Path {
        &self.location.path
    }

    /// Write the file, restrict it to its owner, and schedule its removal at
    /// process exit.
    pub fn write(&self) -> Result<(), BKError> {
        let path = self.path();
        let io_err = |err: std::io::Error| BKError::ManifestIo(path.to_path_buf(), err);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let contents = serde_json::to_string_pretty(&self.info)
            .map_err(|err| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        let mut file = Self::create_private(path).map_err(io_err)?;
        file.write_all(contents.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        drop(file);

        // The key is a shared secret; only the owner may read it.
        Self::restrict_to_owner(path).map_err(io_err)?;

        exit_cleanup::remove_at_exit(path);
        log::debug!("Wrote connection file {}", path.display());
        Ok(())
    }

    #[cfg(unix)]
    fn create_private(path: &Path) -> std::io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
    }

    #[cfg(not(unix))]
    fn create_private(path: &Path) -> std::io::Result<File> {
        File::create(path)
    }

    #[cfg(unix)]
    fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o700))
    }

    #[cfg(not(unix))]
    fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
        Ok(())
    }

    /// Remove the file now. Errors are swallowed.
    pub fn remove(&self) {
        exit_cleanup::remove_quietly(self.path());
        exit_cleanup::forget(self.path());
    }

    /// Read a connection file written by a running kernel.
    pub fn from_file<P: AsRef<Path>>(connection_file: P) -> Result<ConnectionInfo, BKError> {
        let path = connection_file.as_ref();
        let file =
            File::open(path).map_err(|e| BKError::ManifestRead(path.to_path_buf(), e.into()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| BKError::ManifestRead(path.to_path_buf(), e.into()))
    }
}

/// Resolve a `--existing` argument the way Jupyter clients do: an existing
/// path, a file name in the runtime directory, or a bare kernel id / pid
/// (`1234` => `kernel-1234.json`).
pub fn find_existing(name: &str, runtime_dir: Option<PathBuf>) -> Option<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Some(direct);
    }

    let dir = runtime_dir.or_else(jupyter_runtime_dir)?;
    let candidates = [
        dir.join(name),
        dir.join(format!("{}.json", name)),
        dir.join(format!("kernel-{}.json", name)),
    ];
    candidates.into_iter().find(|p| p.is_file())
}
