//
// wire_message.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use bgshared::jupyter_message::{JupyterChannel, JupyterMessage, JupyterMessageHeader};
use bytes::Bytes;
use zeromq::ZmqMessage;

use crate::session_identity::SessionIdentity;
use crate::wire_message_header::WireMessageHeader;

/// Separates the routing frames from the message itself.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Signature, header, parent header, metadata and content.
const REQUIRED_PARTS: usize = 5;

/// A Jupyter message in its multipart form.
pub struct WireMessage {
    /// The frames before the delimiter: the sender's routing identity on a
    /// router socket, the topic on iopub
    pub identities: Vec<Bytes>,

    /// The parts of the message, as an array of byte arrays: the signature,
    /// then header, parent header, metadata and content, then any buffers
    pub parts: Vec<Vec<u8>>,
}

impl WireMessage {
    /// Create a new wire message from a Jupyter message.
    pub fn new(msg: JupyterMessage, identity: &SessionIdentity) -> Result<Self, anyhow::Error> {
        let mut parts: Vec<Vec<u8>> = Vec::new();

        // Derive a wire message header from the Jupyter message header
        parts.push(serde_json::to_vec(&WireMessageHeader::new(
            msg.header, identity,
        ))?);

        // An empty object stands for "no parent"
        match msg.parent_header {
            Some(parent) => parts.push(serde_json::to_vec(&WireMessageHeader::new(
                parent, identity,
            ))?),
            None => parts.push(serde_json::to_vec(&serde_json::Map::new())?),
        }

        parts.push(serde_json::to_vec(&msg.metadata)?);
        parts.push(serde_json::to_vec(&msg.content)?);

        // The signature covers the four parts above, not the buffers
        let signed: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        let signature = identity.sign(&signed);
        parts.insert(0, signature.into_bytes());

        for buffer in &msg.buffers {
            parts.push(serde_json::to_vec(buffer)?);
        }

        Ok(WireMessage {
            identities: Vec::new(),
            parts,
        })
    }

    /// Address the message: to a peer of a router socket, or to a topic on
    /// iopub.
    pub fn with_identities(mut self, identities: Vec<Bytes>) -> Self {
        self.identities = identities;
        self
    }

    /// Split a received multipart message at the delimiter.
    pub fn from_zmq(msg: ZmqMessage) -> Result<Self, anyhow::Error> {
        let mut frames = msg.into_vec();
        let delimiter = frames
            .iter()
            .position(|frame| frame[..] == *DELIMITER)
            .ok_or_else(|| anyhow::anyhow!("Message has no <IDS|MSG> delimiter"))?;

        let parts: Vec<Vec<u8>> = frames
            .split_off(delimiter + 1)
            .into_iter()
            .map(|frame| frame.to_vec())
            .collect();
        if parts.len() < REQUIRED_PARTS {
            anyhow::bail!(
                "Message has {} parts after the delimiter; at least {} are required",
                parts.len(),
                REQUIRED_PARTS
            );
        }

        // Drop the delimiter itself
        frames.truncate(delimiter);
        Ok(WireMessage {
            identities: frames,
            parts,
        })
    }

    /// The hex signature carried by the message.
    pub fn signature(&self) -> String {
        String::from_utf8_lossy(&self.parts[0]).to_string()
    }

    /// Check the signature against the parts exactly as they were received.
    pub fn verify(&self, identity: &SessionIdentity) -> Result<(), anyhow::Error> {
        let signed: Vec<&[u8]> = self.parts[1..REQUIRED_PARTS]
            .iter()
            .map(|p| p.as_slice())
            .collect();
        if identity.verify(&signed, &self.signature()) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Invalid message signature"))
        }
    }

    /// Convert this wire message back into a Jupyter message on the given
    /// channel.
    pub fn to_jupyter(&self, channel: JupyterChannel) -> Result<JupyterMessage, anyhow::Error> {
        let header: JupyterMessageHeader = serde_json::from_slice(&self.parts[1])?;

        let parent: serde_json::Value = serde_json::from_slice(&self.parts[2])?;
        let parent_header = match parent.as_object() {
            Some(map) if map.is_empty() => None,
            _ => Some(serde_json::from_value::<JupyterMessageHeader>(parent)?),
        };

        // Buffers from other clients may be raw bytes rather than JSON
        let buffers = self.parts[REQUIRED_PARTS..]
            .iter()
            .map(|buffer| {
                serde_json::from_slice(buffer).unwrap_or_else(|_| {
                    serde_json::Value::String(String::from_utf8_lossy(buffer).to_string())
                })
            })
            .collect();

        Ok(JupyterMessage {
            header,
            parent_header,
            channel,
            metadata: serde_json::from_slice(&self.parts[3])?,
            content: serde_json::from_slice(&self.parts[4])?,
            buffers,
        })
    }
}

impl From<WireMessage> for ZmqMessage {
    fn from(wire: WireMessage) -> Self {
        let mut frames = wire
            .identities
            .into_iter()
            .chain(std::iter::once(Bytes::from_static(DELIMITER)))
            .chain(wire.parts.into_iter().map(Bytes::from));

        // The delimiter guarantees at least one frame
        let mut msg = ZmqMessage::from(frames.next().unwrap_or_default().to_vec());
        for frame in frames {
            msg.push_back(frame);
        }
        msg
    }
}

/// Parse and verify a received message. Returns the routing frames along with
/// the message.
pub fn decode(
    msg: ZmqMessage,
    channel: JupyterChannel,
    identity: &SessionIdentity,
) -> Result<(Vec<Bytes>, JupyterMessage), anyhow::Error> {
    let wire = WireMessage::from_zmq(msg)?;
    wire.verify(identity)?;
    let message = wire.to_jupyter(channel)?;
    Ok((wire.identities, message))
}
