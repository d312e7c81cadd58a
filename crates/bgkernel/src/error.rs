//
// error.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::fmt;
use std::path::PathBuf;
use std::thread::ThreadId;

use log::error;

use crate::bootstrap::BootstrapState;

#[derive(Debug)]
pub enum BKError {
    /// A listener could not be bound on the given address
    Bind(String, std::io::Error),

    /// The host name could not be resolved to an address to bind to
    Resolve(String, std::io::Error),

    /// The connection file could not be written
    ManifestIo(PathBuf, std::io::Error),

    /// The connection file could not be read or parsed
    ManifestRead(PathBuf, anyhow::Error),

    /// A bootstrap transition was attempted out of order
    BootstrapOrder {
        from: BootstrapState,
        to: BootstrapState,
    },

    /// The other side of the bootstrap handoff gave up
    BootstrapAbandoned(String),

    /// Published streams were already taken by another party
    StreamsTaken,

    /// A loop-bound object was constructed outside of a running service loop
    NoServiceLoop(&'static str),

    /// The service thread could not be spawned
    ThreadSpawn(std::io::Error),

    /// The engine factory failed
    EngineCreate(anyhow::Error),

    /// Another thread already redirects this output stream
    RedirectActive(ThreadId),

    /// A thread-affine resource was used from the wrong thread
    StoreAffinity { owner: ThreadId, caller: ThreadId },

    /// The history store reported an error
    Store(rusqlite::Error),

    /// The session key cannot be used for signing
    InvalidKey(String),
}

impl fmt::Display for BKError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error BK-{}: ", self.code())?;
        match self {
            BKError::Bind(address, err) => {
                write!(f, "Failed to bind a listener on {}: {}", address, err)
            }
            BKError::Resolve(host, err) => {
                write!(f, "Failed to resolve host '{}': {}", host, err)
            }
            BKError::ManifestIo(path, err) => {
                write!(
                    f,
                    "Failed to write connection file {}: {}",
                    path.display(),
                    err
                )
            }
            BKError::ManifestRead(path, err) => {
                write!(
                    f,
                    "Failed to read connection file {}: {}",
                    path.display(),
                    err
                )
            }
            BKError::BootstrapOrder { from, to } => {
                write!(f, "Invalid bootstrap transition {:?} => {:?}", from, to)
            }
            BKError::BootstrapAbandoned(reason) => {
                write!(f, "Bootstrap was abandoned: {}", reason)
            }
            BKError::StreamsTaken => {
                write!(f, "The engine streams were already taken")
            }
            BKError::NoServiceLoop(what) => {
                write!(f, "{} must be constructed on the service loop", what)
            }
            BKError::ThreadSpawn(err) => {
                write!(f, "Failed to spawn the service thread: {}", err)
            }
            BKError::EngineCreate(err) => {
                write!(f, "Failed to create the engine: {}", err)
            }
            BKError::RedirectActive(owner) => {
                write!(f, "Output is already redirected by thread {:?}", owner)
            }
            BKError::StoreAffinity { owner, caller } => {
                write!(
                    f,
                    "History store created in thread {:?} cannot be used in thread {:?}",
                    owner, caller
                )
            }
            BKError::Store(err) => {
                write!(f, "History store error: {}", err)
            }
            BKError::InvalidKey(reason) => {
                write!(f, "Invalid session key: {}", reason)
            }
        }
    }
}

impl std::error::Error for BKError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BKError::Bind(_, err) | BKError::Resolve(_, err) | BKError::ManifestIo(_, err) => {
                Some(err)
            }
            BKError::ThreadSpawn(err) => Some(err),
            BKError::Store(err) => Some(err),
            BKError::ManifestRead(_, err) | BKError::EngineCreate(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for BKError {
    fn from(err: rusqlite::Error) -> Self {
        BKError::Store(err)
    }
}

impl BKError {
    fn code(&self) -> u8 {
        match self {
            BKError::Bind(..) => 1,
            BKError::Resolve(..) => 2,
            BKError::ManifestIo(..) => 3,
            BKError::ManifestRead(..) => 4,
            BKError::BootstrapOrder { .. } => 5,
            BKError::BootstrapAbandoned(..) => 6,
            BKError::StreamsTaken => 7,
            BKError::NoServiceLoop(..) => 8,
            BKError::ThreadSpawn(..) => 9,
            BKError::EngineCreate(..) => 10,
            BKError::RedirectActive(..) => 11,
            BKError::StoreAffinity { .. } => 12,
            BKError::Store(..) => 13,
            BKError::InvalidKey(..) => 14,
        }
    }

    /// Whether this error means no endpoint could be bound (bad interface or
    /// no free port).
    pub fn is_bind_error(&self) -> bool {
        matches!(self, BKError::Bind(..) | BKError::Resolve(..))
    }

    pub fn log(&self) {
        error!("{}", self);
    }
}
