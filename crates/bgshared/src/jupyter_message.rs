//
// jupyter_message.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use serde::{Deserialize, Serialize};

/// The (partial) header of a Jupyter message.
///
/// Additional header fields (session, username, date, protocol version) are
/// not included here; they are populated by the wire layer when the message
/// is signed and framed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JupyterMessageHeader {
    /// The message ID
    pub msg_id: String,
    /// The type of the message
    pub msg_type: String,
}

impl JupyterMessageHeader {
    /// Create a header with a fresh message ID.
    pub fn new(msg_type: &str) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            msg_type: msg_type.to_string(),
        }
    }
}

/// The set of Jupyter sockets ("channels") served by an embedded kernel.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JupyterChannel {
    /// The shell channel
    Shell,

    /// The control channel
    Control,

    /// The iopub channel
    IOPub,

    /// The heartbeat channel
    Heartbeat,
}

impl std::fmt::Display for JupyterChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JupyterChannel::Shell => "shell",
            JupyterChannel::Control => "control",
            JupyterChannel::IOPub => "iopub",
            JupyterChannel::Heartbeat => "heartbeat",
        };
        f.write_str(name)
    }
}

/// A deserialized Jupyter message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JupyterMessage {
    /// The header of the message
    pub header: JupyterMessageHeader,

    /// The header of the message's parent (the message that caused this message)
    pub parent_header: Option<JupyterMessageHeader>,

    /// The channel on which the message was sent (or is to be sent)
    pub channel: JupyterChannel,

    /// The message payload
    pub content: serde_json::Value,

    /// Additional metadata
    pub metadata: serde_json::Value,

    /// The message buffers
    pub buffers: Vec<serde_json::Value>,
}

impl JupyterMessage {
    /// Create a new message with no parent.
    pub fn new(channel: JupyterChannel, msg_type: &str, content: serde_json::Value) -> Self {
        Self {
            header: JupyterMessageHeader::new(msg_type),
            parent_header: None,
            channel,
            content,
            metadata: serde_json::json!({}),
            buffers: Vec::new(),
        }
    }

    /// Create a message caused by `parent`, on the given channel.
    pub fn child_of(
        parent: &JupyterMessage,
        channel: JupyterChannel,
        msg_type: &str,
        content: serde_json::Value,
    ) -> Self {
        let mut msg = Self::new(channel, msg_type, content);
        msg.parent_header = Some(parent.header.clone());
        msg
    }

    /// Create a reply to `request` on the request's own channel.
    pub fn reply_to(request: &JupyterMessage, msg_type: &str, content: serde_json::Value) -> Self {
        Self::child_of(request, request.channel, msg_type, content)
    }

    /// Whether this message was caused by the message with the given ID.
    pub fn is_child_of(&self, msg_id: &str) -> bool {
        match self.parent_header {
            Some(ref parent) => parent.msg_id == msg_id,
            None => false,
        }
    }
}
