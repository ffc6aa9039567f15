//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (accept loops, one task per connection)
//!     → dispatch.rs (per-connection pipeline)
//!     → request.rs (parse request line and headers)
//!     → [load balancer picks backend]
//!     → [net::upstream dials backend, sends rewritten head]
//!     → response.rs (relay status and headers, inject cookie, stream body)
//!     → Close both connections
//! ```
//!
//! # Design Decisions
//! - One request per client connection; every response carries
//!   `Connection: close`
//! - Parsing is hand-written over a buffered reader; bodies are never
//!   buffered, only copied
//! - Any failure closes the client connection without a response

pub mod dispatch;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::{Dispatcher, Exchange};
pub use headers::Headers;
pub use request::{Method, Request};
pub use server::{BoundServer, ProxyServer, StartupError};
