//! # Portal Core
//!
//! Discovery, normalization, registry, and aggregation for the MCP
//! aggregation gateway.
//!
//! ## Modules
//!
//! - `domain` - shared entities (`ServerDecl`, `SessionState`, descriptors, events)
//! - `discovery` - scans known IDE config locations into `ServerDecl`s
//! - `command_normalizer` - translates a declaration into a spawnable command
//! - `registry` - authoritative in-memory server state
//! - `aggregator` - merges session inventories into one namespaced catalog
//! - `event_bus` - bounded, per-subscriber event fan-out
//! - `error` - the closed error taxonomy

pub mod aggregator;
pub mod command_normalizer;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod registry;

pub use domain::*;
pub use error::{GatewayError, GatewayResult};
pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
