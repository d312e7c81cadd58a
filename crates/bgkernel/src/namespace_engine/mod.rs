//
// mod.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! The built-in engine: evaluates a small line language against the host's
//! namespace and records every input in a history store.

pub mod evaluator;
pub mod history;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bgshared::jupyter_message::JupyterMessage;
use bgshared::kernel_info::KernelInfoReply;
use bgshared::kernel_message::KernelStatus;
use serde_json::{json, Value};

use crate::engine::{Engine, EngineContext, EngineFactory, EngineHandle, EngineHome, Namespace};
use crate::iopub::IopubSink;
use crate::output_proxy;
use crate::router_stream::{Incoming, RouterStream};
use crate::service_loop::run_caught;
use crate::session_identity::SessionIdentity;

use self::evaluator::{EvalError, Outcome};
use self::history::{HistoryEntry, HistoryStore, ThreadAffinity};

/// Builds `NamespaceEngine`s.
#[derive(Debug, Clone)]
pub struct NamespaceEngineFactory {
    home: EngineHome,
    history_file: Option<PathBuf>,
}

impl NamespaceEngineFactory {
    pub fn new(home: EngineHome, history_file: Option<PathBuf>) -> Self {
        Self { home, history_file }
    }

    /// The history store's thread affinity. An engine built and dropped on
    /// the service thread can bind its store to that thread; an engine built
    /// on the host thread is used and dropped elsewhere, so its store can't.
    pub fn affinity(&self) -> ThreadAffinity {
        match self.home {
            EngineHome::ServiceThread => ThreadAffinity::Strict,
            EngineHome::HostThread => ThreadAffinity::Shared,
        }
    }
}

impl EngineFactory for NamespaceEngineFactory {
    fn create(&self, context: EngineContext) -> Result<Box<dyn Engine>, anyhow::Error> {
        let history = HistoryStore::open(self.history_file.as_deref(), self.affinity())?;
        log::debug!(
            "[session {}] Created namespace engine (history session {}, {:?})",
            context.identity.session_id,
            history.session(),
            history.affinity()
        );
        Ok(Box::new(NamespaceEngine::new(context, history)))
    }
}

enum Wake {
    Request(Option<Incoming>, bool),
    Exit,
}

/// An engine over a JSON namespace.
pub struct NamespaceEngine {
    identity: Arc<SessionIdentity>,
    shell: RouterStream,
    control: RouterStream,
    iopub: IopubSink,
    namespace: Namespace,
    banner: String,
    history: HistoryStore,
    execution_count: i64,
    handle: EngineHandle,
}

impl NamespaceEngine {
    pub fn new(context: EngineContext, history: HistoryStore) -> Self {
        let handle = EngineHandle::new(&context.identity.session_id);
        Self {
            identity: context.identity,
            shell: context.streams.shell,
            control: context.streams.control,
            iopub: context.streams.iopub,
            namespace: context.namespace,
            banner: context.banner,
            history,
            execution_count: 0,
            handle,
        }
    }

    fn dispatch(&mut self, incoming: Incoming, control: bool) {
        let Incoming { peer, message } = incoming;
        let msg_type = message.header.msg_type.clone();
        log::debug!(
            "[session {}] Handling {} on {}",
            self.identity.session_id,
            msg_type,
            message.channel
        );

        self.iopub.set_parent(Some(message.header.clone()));
        self.iopub.publish_status(KernelStatus::Busy);

        let reply = match msg_type.as_str() {
            "kernel_info_request" => Some(("kernel_info_reply", self.kernel_info())),
            "execute_request" if !control => Some(("execute_reply", self.execute(&message))),
            "history_request" if !control => Some(("history_reply", self.history(&message))),
            "is_complete_request" if !control => {
                Some(("is_complete_reply", json!({ "status": "complete" })))
            }
            "comm_info_request" if !control => {
                Some(("comm_info_reply", json!({ "status": "ok", "comms": {} })))
            }
            "interrupt_request" if control => {
                // Execution is synchronous; by the time this is handled
                // nothing is running
                Some(("interrupt_reply", json!({ "status": "ok" })))
            }
            "shutdown_request" => {
                let restart = message.content["restart"].as_bool().unwrap_or(false);
                self.handle.request_exit(false);
                Some(("shutdown_reply", json!({ "status": "ok", "restart": restart })))
            }
            other => {
                log::warn!(
                    "[session {}] Ignoring unsupported request '{}' on {}",
                    self.identity.session_id,
                    other,
                    message.channel
                );
                None
            }
        };

        if let Some((reply_type, content)) = reply {
            let stream = if control { &self.control } else { &self.shell };
            let reply = JupyterMessage::reply_to(&message, reply_type, content);
            if let Err(err) = stream.send(&peer, reply) {
                log::warn!(
                    "[session {}] Failed to send {}: {}",
                    self.identity.session_id,
                    reply_type,
                    err
                );
            }
        }

        self.iopub.publish_status(KernelStatus::Idle);
    }

    /// Handle one request. A handler that panics costs that request its
    /// reply; the engine keeps serving.
    fn dispatch_caught(&mut self, incoming: Incoming, control: bool) {
        let header = incoming.message.header.clone();
        let name = format!("{} handler", header.msg_type);
        if run_caught(&name, || self.dispatch(incoming, control)).is_none() {
            self.iopub.set_parent(Some(header));
            self.iopub.publish_status(KernelStatus::Idle);
        }
    }

    fn kernel_info(&self) -> Value {
        let reply =
            KernelInfoReply::for_implementation("bgkernel", env!("CARGO_PKG_VERSION"), &self.banner)
                .with_help_link(
                    "Jupyter messaging",
                    "https://jupyter-client.readthedocs.io/en/latest/messaging.html",
                );
        serde_json::to_value(reply).unwrap_or_else(|err| {
            log::error!("Failed to serialize kernel info: {}", err);
            json!({ "status": "error" })
        })
    }

    /// Where `print` output of an execution goes: the process stdout proxy,
    /// which hands it to the client only while this thread's output is
    /// redirected.
    fn stdout_writer(&self) -> Box<dyn Write> {
        Box::new(output_proxy::stdout())
    }

    fn execute(&mut self, request: &JupyterMessage) -> Value {
        let content = &request.content;
        let code = content["code"].as_str().unwrap_or_default().to_string();
        let silent = content["silent"].as_bool().unwrap_or(false);
        let store_history = content["store_history"].as_bool().unwrap_or(!silent);

        if store_history {
            self.execution_count += 1;
            if let Err(err) = self.history.record(self.execution_count, &code) {
                log::warn!(
                    "[session {}] Failed to record history: {}",
                    self.identity.session_id,
                    err
                );
            }
        }
        let count = self.execution_count;

        if !silent {
            self.iopub.publish(
                "execute_input",
                json!({ "code": code, "execution_count": count }),
            );
        }

        let mut out = self.stdout_writer();
        let outcome = evaluator::evaluate(&code, &mut self.namespace, &mut out);
        drop(out);

        match outcome {
            Ok(Outcome::Value(value)) => {
                if !silent {
                    self.iopub.publish(
                        "execute_result",
                        json!({
                            "execution_count": count,
                            "data": { "text/plain": evaluator::repr(&value) },
                            "metadata": {},
                        }),
                    );
                }
                Self::execute_ok(count, Vec::new())
            }
            Ok(Outcome::Silent) => Self::execute_ok(count, Vec::new()),
            Ok(Outcome::Exit { keep_kernel }) => {
                self.handle.request_exit(keep_kernel);
                Self::execute_ok(
                    count,
                    vec![json!({ "source": "ask_exit", "keepkernel": keep_kernel })],
                )
            }
            Err(err) => self.execute_error(count, err),
        }
    }

    fn execute_ok(count: i64, payload: Vec<Value>) -> Value {
        json!({
            "status": "ok",
            "execution_count": count,
            "payload": payload,
            "user_expressions": {},
        })
    }

    fn execute_error(&self, count: i64, err: EvalError) -> Value {
        let traceback = vec![err.to_string()];
        self.iopub.publish(
            "error",
            json!({
                "ename": err.ename,
                "evalue": err.evalue,
                "traceback": traceback,
            }),
        );
        json!({
            "status": "error",
            "execution_count": count,
            "ename": err.ename,
            "evalue": err.evalue,
            "traceback": traceback,
        })
    }

    fn history(&self, request: &JupyterMessage) -> Value {
        let content = &request.content;
        let access = content["hist_access_type"].as_str().unwrap_or("tail");
        let n = content["n"].as_u64().unwrap_or(10) as usize;
        let entries = match access {
            "range" => self.history.range(
                content["session"].as_i64().unwrap_or(0),
                content["start"].as_i64().unwrap_or(1),
                content["stop"].as_i64(),
            ),
            "search" => self
                .history
                .search(content["pattern"].as_str().unwrap_or("*"))
                .map(|entries| {
                    let skip = entries.len().saturating_sub(n);
                    entries.into_iter().skip(skip).collect()
                }),
            _ => self.history.tail(n),
        };
        match entries {
            Ok(entries) => json!({
                "status": "ok",
                "history": entries.iter().map(Self::history_item).collect::<Vec<_>>(),
            }),
            Err(err) => {
                log::warn!(
                    "[session {}] History lookup failed: {}",
                    self.identity.session_id,
                    err
                );
                json!({
                    "status": "error",
                    "ename": "HistoryError",
                    "evalue": err.to_string(),
                    "traceback": [],
                    "history": [],
                })
            }
        }
    }

    fn history_item(entry: &HistoryEntry) -> Value {
        json!([entry.session, entry.line, entry.source])
    }
}

#[async_trait(?Send)]
impl Engine for NamespaceEngine {
    fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    async fn run(mut self: Box<Self>) -> Result<(), anyhow::Error> {
        self.iopub.set_parent(None);
        self.iopub.publish_status(KernelStatus::Starting);
        self.iopub.publish_status(KernelStatus::Idle);

        loop {
            let exit_listener = self.handle.exit_listener();
            if let Some(false) = self.handle.take_exit_request() {
                break;
            }

            let wake = tokio::select! {
                incoming = self.control.recv() => Wake::Request(incoming, true),
                incoming = self.shell.recv() => Wake::Request(incoming, false),
                _ = exit_listener => Wake::Exit,
            };
            match wake {
                Wake::Request(Some(incoming), control) => self.dispatch_caught(incoming, control),
                Wake::Request(None, control) => {
                    log::warn!(
                        "[session {}] {} stream closed",
                        self.identity.session_id,
                        if control { "Control" } else { "Shell" }
                    );
                    break;
                }
                Wake::Exit => {}
            }
        }

        log::info!(
            "[session {}] Namespace engine exiting after {} executions",
            self.identity.session_id,
            self.execution_count
        );
        Ok(())
    }
}
