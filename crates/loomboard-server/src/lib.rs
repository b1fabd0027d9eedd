//! Loomboard server library.
//!
//! HTTP + SSE surface over the room registry and turn coordinator. The
//! WebSocket convergence protocol between canvas clients is an external
//! collaborator and not served here; this surface covers the streaming
//! turn endpoint and the plain record CRUD passthroughs.

pub mod backend;
pub mod constants;
pub mod http;
pub mod push;

pub use backend::HttpGenerativeBackend;
pub use http::{ServerState, routes};
pub use push::SsePushChannel;
