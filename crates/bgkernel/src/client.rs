//
// client.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! A client that attaches to a running kernel through its connection file.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use bgshared::jupyter_message::{JupyterChannel, JupyterMessage};
use bgshared::kernel_message::KernelStatus;
use zeromq::util::PeerIdentity;
use zeromq::{DealerSocket, Socket, SocketOptions, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::connection_file::ConnectionInfo;
use crate::session_identity::SessionIdentity;
use crate::wire_message::{decode, WireMessage};

/// How long to wait for any one reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long each round of the iopub handshake waits for output.
const HANDSHAKE_ROUND: Duration = Duration::from_millis(250);

/// Receive the next message on `socket` that carries a valid signature.
async fn recv_verified<S: SocketRecv>(
    socket: &mut S,
    channel: JupyterChannel,
    identity: &SessionIdentity,
) -> anyhow::Result<JupyterMessage> {
    loop {
        let msg: ZmqMessage = socket.recv().await?;
        match decode(msg, channel, identity) {
            Ok((_, msg)) => return Ok(msg),
            Err(err) => log::warn!("Dropping {} message: {}", channel, err),
        }
    }
}
/// The result of one `execute_request`.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    /// The `execute_reply`
    pub reply: JupyterMessage,

    /// Everything published on iopub for the request, up to and including
    /// the final `status: idle`
    pub iopub: Vec<JupyterMessage>,
}

impl ExecuteOutcome {
    /// The concatenated text of all `stream` messages with the given name.
    pub fn stream_text(&self, name: &str) -> String {
        self.iopub
            .iter()
            .filter(|msg| msg.header.msg_type == "stream" && msg.content["name"] == name)
            .filter_map(|msg| msg.content["text"].as_str())
            .collect()
    }

    /// The `text/plain` form of the `execute_result`, if there was one.
    pub fn result_text(&self) -> Option<String> {
        self.iopub
            .iter()
            .find(|msg| msg.header.msg_type == "execute_result")
            .and_then(|msg| msg.content["data"]["text/plain"].as_str())
            .map(str::to_string)
    }

    pub fn status(&self) -> &str {
        self.reply.content["status"].as_str().unwrap_or_default()
    }
}

/// An attached client.
pub struct KernelClient {
    identity: SessionIdentity,
    shell: DealerSocket,
    control: DealerSocket,
    iopub: SubSocket,
    timeout: Duration,
}

impl KernelClient {
    /// Creates the socket options for DEALER sockets to set the peer identity
    fn dealer_peer_opts(session_id: &str) -> anyhow::Result<SocketOptions> {
        let mut peer_opts = SocketOptions::default();
        peer_opts.peer_identity(PeerIdentity::from_str(session_id)?);
        Ok(peer_opts)
    }

    /// Open the shell, control and iopub channels and wait until the iopub
    /// subscription is confirmed.
    pub async fn connect(info: &ConnectionInfo) -> anyhow::Result<Self> {
        let username = std::env::var("USER").unwrap_or_else(|_| String::from("client"));
        let identity = SessionIdentity::with_key(&username, info.key.clone())?;

        let mut shell = DealerSocket::with_options(Self::dealer_peer_opts(&identity.session_id)?);
        let shell_endpoint = info.endpoint(info.shell_port);
        shell
            .connect(&shell_endpoint)
            .await
            .with_context(|| format!("Failed to connect to shell at {}", shell_endpoint))?;

        let mut control =
            DealerSocket::with_options(Self::dealer_peer_opts(&identity.session_id)?);
        let control_endpoint = info.endpoint(info.control_port);
        control
            .connect(&control_endpoint)
            .await
            .with_context(|| format!("Failed to connect to control at {}", control_endpoint))?;

        let mut iopub = SubSocket::new();
        let iopub_endpoint = info.endpoint(info.iopub_port);
        iopub
            .connect(&iopub_endpoint)
            .await
            .with_context(|| format!("Failed to connect to iopub at {}", iopub_endpoint))?;
        iopub.subscribe("").await?;

        let mut client = Self {
            identity,
            shell,
            control,
            iopub,
            timeout: DEFAULT_TIMEOUT,
        };
        tokio::time::timeout(DEFAULT_TIMEOUT, client.confirm_subscription())
            .await
            .map_err(|_| anyhow!("Timed out waiting for the iopub subscription"))??;
        log::debug!("Connected to kernel at {}", info.ip);

        Ok(client)
    }

    /// Output published before the subscription reaches the kernel is lost.
    /// Send `kernel_info_request`s until the status of one of them arrives
    /// on iopub.
    async fn confirm_subscription(&mut self) -> anyhow::Result<()> {
        loop {
            let reply = self.kernel_info().await?;
            let request_id = reply
                .parent_header
                .as_ref()
                .map(|parent| parent.msg_id.clone())
                .unwrap_or_default();

            let seen = tokio::time::timeout(HANDSHAKE_ROUND, async {
                loop {
                    let msg =
                        recv_verified(&mut self.iopub, JupyterChannel::IOPub, &self.identity)
                            .await?;
                    if msg.is_child_of(&request_id) {
                        return Ok::<(), anyhow::Error>(());
                    }
                }
            })
            .await;
            match seen {
                Ok(result) => return result,
                Err(_) => log::trace!("No iopub output yet; asking again"),
            }
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and wait for its reply.
    pub async fn request(
        &mut self,
        channel: JupyterChannel,
        msg_type: &str,
        content: serde_json::Value,
    ) -> anyhow::Result<JupyterMessage> {
        let request = JupyterMessage::new(channel, msg_type, content);
        let request_id = request.header.msg_id.clone();
        let wire: ZmqMessage = WireMessage::new(request, &self.identity)?.into();
        let identity = &self.identity;
        let socket = match channel {
            JupyterChannel::Shell => &mut self.shell,
            JupyterChannel::Control => &mut self.control,
            other => return Err(anyhow!("Requests can't be sent on {}", other)),
        };
        socket.send(wire).await?;

        tokio::time::timeout(self.timeout, async {
            loop {
                let reply = recv_verified(socket, channel, identity).await?;
                if reply.is_child_of(&request_id) {
                    return Ok::<JupyterMessage, anyhow::Error>(reply);
                }
                log::debug!("Skipping unrelated {}", reply.header.msg_type);
            }
        })
        .await
        .map_err(|_| anyhow!("Timed out waiting for a reply to {}", msg_type))?
    }

    /// The next message published on iopub.
    pub async fn recv_iopub(&mut self) -> anyhow::Result<JupyterMessage> {
        let recv = recv_verified(&mut self.iopub, JupyterChannel::IOPub, &self.identity);
        tokio::time::timeout(self.timeout, recv)
            .await
            .map_err(|_| anyhow!("Timed out waiting for iopub"))?
    }

    pub async fn kernel_info(&mut self) -> anyhow::Result<JupyterMessage> {
        self.request(
            JupyterChannel::Shell,
            "kernel_info_request",
            serde_json::json!({}),
        )
        .await
    }

    /// Execute code and collect everything the request produced.
    pub async fn execute(&mut self, code: &str) -> anyhow::Result<ExecuteOutcome> {
        let reply = self
            .request(
                JupyterChannel::Shell,
                "execute_request",
                serde_json::json!({
                    "code": code,
                    "silent": false,
                    "store_history": true,
                    "user_expressions": {},
                    "allow_stdin": false,
                    "stop_on_error": true,
                }),
            )
            .await?;
        let request_id = reply
            .parent_header
            .as_ref()
            .map(|parent| parent.msg_id.clone())
            .unwrap_or_default();

        let idle = KernelStatus::Idle.to_content();
        let mut iopub = Vec::new();
        loop {
            let msg = self.recv_iopub().await?;
            if !msg.is_child_of(&request_id) {
                continue;
            }
            let done = msg.header.msg_type == "status" && msg.content == idle;
            iopub.push(msg);
            if done {
                break;
            }
        }
        Ok(ExecuteOutcome { reply, iopub })
    }

    pub async fn history_tail(&mut self, n: usize) -> anyhow::Result<JupyterMessage> {
        self.request(
            JupyterChannel::Shell,
            "history_request",
            serde_json::json!({
                "hist_access_type": "tail",
                "n": n,
                "output": false,
                "raw": true,
            }),
        )
        .await
    }

    /// Ask the kernel to stop.
    pub async fn shutdown(&mut self) -> anyhow::Result<JupyterMessage> {
        self.request(
            JupyterChannel::Control,
            "shutdown_request",
            serde_json::json!({ "restart": false }),
        )
        .await
    }
}
