//
// exit_cleanup.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Best-effort removal of files when the process exits.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

lazy_static::lazy_static! {
    static ref PENDING: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
}

static REGISTER_HOOK: Once = Once::new();

/// Remove `path` when the process exits normally. Failures (including the
/// file already being gone) are ignored.
pub fn remove_at_exit(path: &Path) {
    if let Ok(mut pending) = PENDING.lock() {
        pending.push(path.to_path_buf());
    }

    REGISTER_HOOK.call_once(|| {
        #[allow(unsafe_code)]
        let rc = unsafe { libc::atexit(run_exit_cleanup) };
        if rc != 0 {
            log::warn!("Failed to register exit hook; connection files will be left behind");
        }
    });
}

/// Forget a path registered with `remove_at_exit`, e.g. after removing it
/// explicitly.
pub fn forget(path: &Path) {
    if let Ok(mut pending) = PENDING.lock() {
        pending.retain(|p| p != path);
    }
}

/// Remove a file, ignoring every error.
pub fn remove_quietly(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        log::trace!("Ignoring failure to remove {}: {}", path.display(), err);
    }
}

extern "C" fn run_exit_cleanup() {
    // Never panic across the FFI boundary; a poisoned lock means skip
    let paths = match PENDING.lock() {
        Ok(mut pending) => std::mem::take(&mut *pending),
        Err(_) => return,
    };
    for path in paths {
        let _ = std::fs::remove_file(&path);
    }
}
