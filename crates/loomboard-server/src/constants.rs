//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default HTTP port for the loomboard server.
pub const DEFAULT_HTTP_PORT: u16 = 8787;

/// Default bind address (localhost only; put a proxy in front).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Request deadline for the upstream generative backend.
pub const BACKEND_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
