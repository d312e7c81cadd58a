//
// kernel_message.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use serde::{Deserialize, Serialize};

/// Execution states a kernel reports on iopub in `status` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelStatus {
    /// The kernel is in the process of starting
    Starting,
    /// The kernel is idle
    Idle,
    /// The kernel is busy
    Busy,
}

impl KernelStatus {
    /// The content of an iopub `status` message reporting this state.
    pub fn to_content(self) -> serde_json::Value {
        serde_json::json!({ "execution_state": self })
    }
}
