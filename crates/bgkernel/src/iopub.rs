//
// iopub.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use bgshared::jupyter_message::{JupyterChannel, JupyterMessage, JupyterMessageHeader};
use bgshared::kernel_message::KernelStatus;
use bytes::Bytes;
use tokio::sync::mpsc;
use zeromq::{PubSocket, Socket, SocketSend};

use crate::endpoint_set::{socket_bind_error, take_over};
use crate::error::BKError;
use crate::service_loop::spawn_logged;
use crate::session_identity::SessionIdentity;
use crate::wire_message::WireMessage;

/// The publishing side of the iopub channel: a PUB socket owned by a unit on
/// the service loop, fed through `IopubSink`s.
pub struct IopubPublisher;

impl IopubPublisher {
    /// Bind a PUB socket on the port held by `reserved`, on the running
    /// service loop, and return the sink used to publish on it.
    pub async fn bind(
        reserved: TcpListener,
        identity: Arc<SessionIdentity>,
    ) -> Result<IopubSink, BKError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BKError::NoServiceLoop("IopubPublisher"));
        }
        let endpoint = take_over(reserved, JupyterChannel::IOPub)?;
        let mut socket = PubSocket::new();
        socket
            .bind(&endpoint)
            .await
            .map_err(|err| socket_bind_error(&endpoint, err))?;
        log::debug!(
            "[session {}] iopub socket bound to {}",
            identity.session_id,
            endpoint
        );

        let (message_tx, message_rx) = mpsc::unbounded_channel::<JupyterMessage>();
        spawn_logged("iopub socket", Self::fan_out(socket, message_rx, identity));

        Ok(IopubSink {
            messages: message_tx,
            parent: Arc::new(Mutex::new(None)),
        })
    }

    /// The topic a message is published under.
    fn topic(identity: &SessionIdentity, msg: &JupyterMessage) -> Bytes {
        Bytes::from(format!(
            "kernel.{}.{}",
            identity.session_id, msg.header.msg_type
        ))
    }

    /// Sign each message and hand it to every subscriber.
    async fn fan_out(
        mut socket: PubSocket,
        mut message_rx: mpsc::UnboundedReceiver<JupyterMessage>,
        identity: Arc<SessionIdentity>,
    ) -> Result<(), anyhow::Error> {
        while let Some(msg) = message_rx.recv().await {
            let msg_type = msg.header.msg_type.clone();
            let topic = Self::topic(&identity, &msg);
            let wire = match WireMessage::new(msg, &identity) {
                Ok(wire) => wire.with_identities(vec![topic]),
                Err(err) => {
                    log::warn!(
                        "[session {}] Failed to encode iopub {}: {}",
                        identity.session_id,
                        msg_type,
                        err
                    );
                    continue;
                }
            };
            // Without subscribers the message is just dropped
            if let Err(err) = socket.send(wire.into()).await {
                log::warn!(
                    "[session {}] Failed to publish {}: {}",
                    identity.session_id,
                    msg_type,
                    err
                );
            }
        }
        Ok(())
    }
}

/// A clonable, thread-safe handle for publishing on iopub.
///
/// Messages published through the sink are parented to the request most
/// recently set with `set_parent`.
#[derive(Clone, Debug)]
pub struct IopubSink {
    messages: mpsc::UnboundedSender<JupyterMessage>,
    parent: Arc<Mutex<Option<JupyterMessageHeader>>>,
}

impl IopubSink {
    /// Set (or clear) the request that subsequent messages are parented to.
    pub fn set_parent(&self, parent: Option<JupyterMessageHeader>) {
        if let Ok(mut current) = self.parent.lock() {
            *current = parent;
        }
    }

    /// Publish a message of the given type, parented to the current request.
    pub fn publish(&self, msg_type: &str, content: serde_json::Value) {
        let mut msg = JupyterMessage::new(JupyterChannel::IOPub, msg_type, content);
        if let Ok(parent) = self.parent.lock() {
            msg.parent_header = parent.clone();
        }
        self.publish_message(msg);
    }

    /// Publish a fully formed message as is.
    pub fn publish_message(&self, msg: JupyterMessage) {
        if self.messages.send(msg).is_err() {
            log::debug!("Dropping iopub message; the publisher has stopped");
        }
    }

    /// Publish a `status` message.
    pub fn publish_status(&self, status: KernelStatus) {
        self.publish("status", status.to_content());
    }

    /// Publish text written to an output stream (`stdout` or `stderr`).
    pub fn publish_stream(&self, name: &str, text: &str) {
        self.publish(
            "stream",
            serde_json::json!({
                "name": name,
                "text": text,
            }),
        );
    }
}
