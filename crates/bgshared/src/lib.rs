//! Shared types for the bgkernel service and its clients.

/// Jupyter message types
pub mod jupyter_message;

/// Kernel info reply types
pub mod kernel_info;

/// Kernel status types
pub mod kernel_message;
