//
// connection_file_tests.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Tests for connection file naming, writing and lookup

use std::path::PathBuf;

use bgkernel::connection_file::{find_existing, ConnectionFile, ConnectionInfo, ManifestPath};

fn sample_info() -> ConnectionInfo {
    ConnectionInfo {
        ip: String::from("127.0.0.1"),
        transport: String::from("tcp"),
        signature_scheme: String::from("hmac-sha256"),
        key: String::from("0123456789abcdef"),
        shell_port: 50001,
        iopub_port: 50002,
        control_port: 50003,
        hb_port: 50004,
        kernel_name: String::from("bgkernel"),
    }
}

#[test]
fn test_default_path_carries_pid() {
    let dir = tempfile::tempdir().unwrap();
    let location = ManifestPath::derive(None, true, 100, Some(dir.path().to_path_buf()));

    assert_eq!(location.path, dir.path().join("kernel-100.json"));
    assert_eq!(location.display_name(), "100");
}

#[test]
fn test_default_path_without_pid() {
    let dir = tempfile::tempdir().unwrap();
    let location = ManifestPath::derive(None, false, 100, Some(dir.path().to_path_buf()));

    assert_eq!(location.path, dir.path().join("kernel.json"));
    assert_eq!(
        location.display_name(),
        dir.path().join("kernel.json").to_string_lossy()
    );
}

#[test]
fn test_explicit_paths() {
    let explicit = PathBuf::from("/srv/kernels/analysis.json");

    let with_pid = ManifestPath::derive(Some(explicit.clone()), true, 4321, None);
    assert_eq!(
        with_pid.path,
        PathBuf::from("/srv/kernels/analysis-4321.json")
    );
    // Explicit paths are always shown in full
    assert_eq!(with_pid.display_name(), "/srv/kernels/analysis-4321.json");

    let without_pid = ManifestPath::derive(Some(explicit.clone()), false, 4321, None);
    assert_eq!(without_pid.path, explicit);
}

#[test]
fn test_files_of_different_processes_coexist() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Some(dir.path().to_path_buf());

    let first = ConnectionFile::new(
        sample_info(),
        ManifestPath::derive(None, true, 100, runtime.clone()),
    );
    let mut second_info = sample_info();
    second_info.shell_port = 60001;
    let second = ConnectionFile::new(second_info, ManifestPath::derive(None, true, 200, runtime));

    first.write().unwrap();
    second.write().unwrap();

    assert_ne!(first.path(), second.path());
    assert_eq!(ConnectionFile::from_file(first.path()).unwrap(), sample_info());
    assert_eq!(
        ConnectionFile::from_file(second.path()).unwrap().shell_port,
        60001
    );
}

#[test]
fn test_written_file_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let file = ConnectionFile::new(
        sample_info(),
        ManifestPath::derive(None, true, 77, Some(dir.path().to_path_buf())),
    );
    file.write().unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
    assert_eq!(raw["ip"], "127.0.0.1");
    assert_eq!(raw["transport"], "tcp");
    assert_eq!(raw["signature_scheme"], "hmac-sha256");
    assert_eq!(raw["key"], "0123456789abcdef");
    assert_eq!(raw["hb_port"], 50004);

    let info = ConnectionFile::from_file(file.path()).unwrap();
    assert_eq!(info.endpoint(info.shell_port), "tcp://127.0.0.1:50001");
}

#[test]
fn test_missing_parent_directories_are_created() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b").join("conn.json");
    let file = ConnectionFile::new(
        sample_info(),
        ManifestPath::derive(Some(nested.clone()), false, 1, None),
    );
    file.write().unwrap();
    assert!(nested.is_file());
}

#[cfg(unix)]
#[test]
fn test_written_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conn.json");

    // An existing world-readable file is tightened on rewrite
    std::fs::write(&path, "{}").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let file = ConnectionFile::new(
        sample_info(),
        ManifestPath::derive(Some(path.clone()), false, 1, None),
    );
    file.write().unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o077, 0);
}

#[test]
fn test_find_existing() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Some(dir.path().to_path_buf());
    let file = ConnectionFile::new(
        sample_info(),
        ManifestPath::derive(None, true, 555, runtime.clone()),
    );
    file.write().unwrap();

    let expected = dir.path().join("kernel-555.json");
    assert_eq!(find_existing("555", runtime.clone()), Some(expected.clone()));
    assert_eq!(
        find_existing("kernel-555.json", runtime.clone()),
        Some(expected.clone())
    );
    assert_eq!(
        find_existing(&expected.to_string_lossy(), None),
        Some(expected)
    );
    assert_eq!(find_existing("556", runtime), None);
}

#[test]
fn test_remove() {
    let dir = tempfile::tempdir().unwrap();
    let file = ConnectionFile::new(
        sample_info(),
        ManifestPath::derive(None, true, 9, Some(dir.path().to_path_buf())),
    );
    file.write().unwrap();
    assert!(file.path().exists());

    file.remove();
    assert!(!file.path().exists());

    // Removing again is harmless
    file.remove();
}

#[test]
fn test_unreadable_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "not json").unwrap();

    let err = ConnectionFile::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("broken.json"));
}
