//! Request layer
//!
//! The HTTP/SSE surface that props, wire panels and the operator console
//! talk to. It validates request bodies and calls only the public
//! [`BombEngine`](crate::game::BombEngine) operations.

pub mod http;

pub use http::{HttpConfig, HttpServer, parse_bind_addr};

/// Default bind address for the HTTP server.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default maximum request body size (64 KiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024;
