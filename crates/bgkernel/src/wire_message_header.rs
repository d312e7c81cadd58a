//
// wire_message_header.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use bgshared::jupyter_message::JupyterMessageHeader;
use bgshared::kernel_info::PROTOCOL_VERSION;
use serde::{Deserialize, Serialize};

use crate::session_identity::SessionIdentity;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireMessageHeader {
    /// The message ID
    pub msg_id: String,

    /// The type of the message
    pub msg_type: String,

    /// The ID of the session
    pub session: String,

    /// The user that sent the message
    pub username: String,

    /// The date/time the message was published
    pub date: String,

    /// The version of the Jupyter protocol
    pub version: String,
}

impl WireMessageHeader {
    /// Create a new wire message header from a Jupyter message header.
    pub fn new(jupyter_header: JupyterMessageHeader, identity: &SessionIdentity) -> Self {
        // Create an ISO 8601 date string
        let date = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        WireMessageHeader {
            msg_id: jupyter_header.msg_id,
            msg_type: jupyter_header.msg_type,
            session: identity.session_id.clone(),
            username: identity.username.clone(),
            version: String::from(PROTOCOL_VERSION),
            date,
        }
    }
}
