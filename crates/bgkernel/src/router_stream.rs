//
// router_stream.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::net::TcpListener;
use std::sync::Arc;

use bgshared::jupyter_message::{JupyterChannel, JupyterMessage};
use bytes::Bytes;
use tokio::sync::mpsc;
use zeromq::{RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::endpoint_set::{socket_bind_error, take_over};
use crate::error::BKError;
use crate::service_loop::spawn_logged;
use crate::session_identity::SessionIdentity;
use crate::wire_message::{decode, WireMessage};

/// The routing frames that identify one connected peer of a router socket.
pub type PeerId = Vec<Bytes>;

/// A message received on a router stream, tagged with its sender.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub peer: PeerId,
    pub message: JupyterMessage,
}

/// A request/reply channel (shell or control) serving any number of peers.
///
/// The ROUTER socket itself is owned by a unit on the service loop. Every
/// incoming message is tagged with the peer that sent it so the reply is
/// routed back to that peer and no other.
pub struct RouterStream {
    channel: JupyterChannel,
    identity: Arc<SessionIdentity>,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    outgoing: mpsc::UnboundedSender<ZmqMessage>,
}

impl RouterStream {
    /// Bind a ROUTER socket on the port held by `reserved`, on the running
    /// service loop.
    ///
    /// Must be awaited on the loop that will service the stream; returns
    /// `BKError::NoServiceLoop` otherwise.
    pub async fn bind(
        reserved: TcpListener,
        channel: JupyterChannel,
        identity: Arc<SessionIdentity>,
    ) -> Result<Self, BKError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BKError::NoServiceLoop("RouterStream"));
        }
        let endpoint = take_over(reserved, channel)?;
        let mut socket = RouterSocket::new();
        socket
            .bind(&endpoint)
            .await
            .map_err(|err| socket_bind_error(&endpoint, err))?;
        log::debug!(
            "[session {}] {} socket bound to {}",
            identity.session_id,
            channel,
            endpoint
        );

        let (incoming_tx, incoming) = mpsc::unbounded_channel();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        spawn_logged(
            &format!("{} socket", channel),
            Self::pump(socket, channel, identity.clone(), incoming_tx, outgoing_rx),
        );

        Ok(Self {
            channel,
            identity,
            incoming,
            outgoing,
        })
    }

    /// Move messages between the socket and the stream until either side
    /// goes away.
    async fn pump(
        mut socket: RouterSocket,
        channel: JupyterChannel,
        identity: Arc<SessionIdentity>,
        incoming_tx: mpsc::UnboundedSender<Incoming>,
        mut outgoing_rx: mpsc::UnboundedReceiver<ZmqMessage>,
    ) -> Result<(), anyhow::Error> {
        loop {
            tokio::select! {
                received = socket.recv() => {
                    let (peer, message) = match decode(received?, channel, &identity) {
                        Ok(decoded) => decoded,
                        Err(err) => {
                            log::warn!(
                                "[session {}] Dropping {} message: {}",
                                identity.session_id,
                                channel,
                                err
                            );
                            continue;
                        }
                    };
                    log::trace!(
                        "[session {}] {} <- {}",
                        identity.session_id,
                        channel,
                        message.header.msg_type
                    );
                    if incoming_tx.send(Incoming { peer, message }).is_err() {
                        // Nobody is reading this stream any more
                        break;
                    }
                }
                outgoing = outgoing_rx.recv() => {
                    let Some(msg) = outgoing else {
                        break;
                    };
                    if let Err(err) = socket.send(msg).await {
                        log::warn!(
                            "[session {}] Failed to send on {}: {}",
                            identity.session_id,
                            channel,
                            err
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Receive the next message from any peer. Returns None once the stream
    /// can no longer produce messages.
    pub async fn recv(&mut self) -> Option<Incoming> {
        self.incoming.recv().await
    }

    /// Sign and send a message to one peer.
    pub fn send(&self, peer: &PeerId, msg: JupyterMessage) -> Result<(), anyhow::Error> {
        log::trace!(
            "[session {}] {} -> {}",
            self.identity.session_id,
            self.channel,
            msg.header.msg_type
        );
        let wire = WireMessage::new(msg, &self.identity)?.with_identities(peer.clone());
        self.outgoing
            .send(wire.into())
            .map_err(|_| anyhow::anyhow!("The {} socket has stopped", self.channel))
    }
}
