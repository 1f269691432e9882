//! # Portal Gateway
//!
//! Transports, sessions, the supervisor, the aggregating dispatcher, and
//! the HTTP/SSE surface that sit on top of `portal-core`'s discovery and
//! registry.
//!
//! ## Modules
//!
//! - `transport` - stdio and HTTP+SSE carriers for one MCP session
//! - `session` - handshake, health, reconnect for one upstream
//! - `supervisor` - reconciliation-driven session lifecycle
//! - `dispatcher` - the unified outbound `ServerHandler`
//! - `server` - REST, SSE, and the mounted MCP endpoint

pub mod dispatcher;
pub mod server;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use dispatcher::GatewayHandler;
pub use server::{GatewayConfig, GatewayServer};
pub use session::Session;
pub use supervisor::Supervisor;
