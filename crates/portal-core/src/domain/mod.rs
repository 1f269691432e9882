//! Domain entities and value objects shared across the gateway.

pub mod catalog;
pub mod event;
pub mod server;
pub mod session;

pub use catalog::{ResourceDescriptor, ToolDescriptor};
pub use event::{GatewayEvent, ServerEventKind, ServerStatus};
pub use server::{DeclaredTransport, ServerDecl, ServerSource};
pub use session::SessionState;
