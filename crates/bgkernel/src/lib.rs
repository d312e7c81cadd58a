//
// lib.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Embeds an interactive kernel on a background thread of a host process.
//!
//! `start` binds the kernel's endpoints, writes a Jupyter connection file,
//! and starts one service thread that runs the kernel's event loop. Clients
//! such as `jupyter console --existing` then attach over the network while
//! the host keeps running.

pub mod bootstrap;
pub mod client;
pub mod connection_file;
pub mod endpoint_set;
pub mod engine;
pub mod error;
pub mod exit_cleanup;
pub mod heartbeat;
pub mod iopub;
pub mod namespace_engine;
pub mod options;
pub mod output_proxy;
pub mod router_stream;
pub mod service;
pub mod service_log;
pub mod service_loop;
pub mod service_thread;
pub mod session_identity;
pub mod wire_message;
pub mod wire_message_header;

pub use error::BKError;
pub use options::StartOptions;
pub use service::{start, ServiceHandle};
