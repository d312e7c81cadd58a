//
// heartbeat.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::sync::mpsc;
use std::time::Duration;

use zeromq::{Endpoint, RepSocket, ReqSocket, Socket, SocketRecv, SocketSend, ZmqError};

use crate::endpoint_set::socket_bind_error;
use crate::error::BKError;

/// Payload sent by `ping`.
const HB_PAYLOAD: &str = "bgkernel-heartbeat";

/// Pause after a failed receive, so a broken socket doesn't spin the thread.
const RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Echoes every heartbeat it receives.
///
/// The responder has its own OS thread and its own runtime, and never
/// touches the service loop, so a busy or stalled engine doesn't delay
/// heartbeat replies.
pub struct HeartbeatResponder {
    /// The port on which the responder listens
    pub port: u16,
}

impl HeartbeatResponder {
    /// Bind an OS-chosen port of `bind_address` and start answering on it.
    /// Returns once the socket is bound.
    pub fn start(bind_address: &str) -> Result<Self, BKError> {
        let endpoint = format!("tcp://{}:0", bind_address);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u16, BKError>>();

        let thread_endpoint = endpoint.clone();
        std::thread::Builder::new()
            .name(String::from("bgkernel heartbeat"))
            .spawn(move || Self::serve(thread_endpoint, ready_tx))
            .map_err(|err| BKError::Bind(endpoint.clone(), err))?;

        let port = ready_rx.recv().map_err(|_| {
            BKError::Bind(
                endpoint.clone(),
                std::io::Error::other("the heartbeat thread exited before binding"),
            )
        })??;

        log::debug!("Heartbeat responder listening on port {}", port);
        Ok(Self { port })
    }

    fn serve(endpoint: String, ready_tx: mpsc::Sender<Result<u16, BKError>>) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ready_tx.send(Err(BKError::Bind(endpoint, err)));
                return;
            }
        };

        runtime.block_on(async move {
            let mut socket = RepSocket::new();
            let port = match socket.bind(&endpoint).await {
                Ok(Endpoint::Tcp(_, port)) => port,
                Ok(other) => {
                    let err = std::io::Error::other(format!("bound to {} instead", other));
                    let _ = ready_tx.send(Err(BKError::Bind(endpoint, err)));
                    return;
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(socket_bind_error(&endpoint, err)));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(port));

            loop {
                match socket.recv().await {
                    Ok(ping) => {
                        log::trace!("Heartbeat received on port {}", port);
                        if let Err(err) = socket.send(ping).await {
                            log::debug!("Failed to answer heartbeat: {}", err);
                        }
                    }
                    Err(err) => {
                        log::warn!("Failed to receive heartbeat on port {}: {}", port, err);
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                }
            }
        });
    }
}

/// Send one heartbeat to `endpoint` (e.g. `tcp://127.0.0.1:5555`) and wait
/// up to `timeout` for the echo.
///
/// Returns true when the payload came back unchanged.
pub async fn ping(endpoint: &str, timeout: Duration) -> bool {
    let exchange = async {
        let mut socket = ReqSocket::new();
        socket.connect(endpoint).await?;
        log::trace!("Sending heartbeat to {}", endpoint);
        socket.send(HB_PAYLOAD.into()).await?;
        let reply = socket.recv().await?;
        Ok::<bool, ZmqError>(
            reply
                .get(0)
                .map(|frame| frame[..] == *HB_PAYLOAD.as_bytes())
                .unwrap_or(false),
        )
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(echoed)) => echoed,
        Ok(Err(err)) => {
            log::info!("Heartbeat to {} failed: {}", endpoint, err);
            false
        }
        Err(_) => {
            log::info!("No heartbeat response from {} after {:?}", endpoint, timeout);
            false
        }
    }
}
