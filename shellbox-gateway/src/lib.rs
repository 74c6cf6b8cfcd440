//! HTTP gateway for shellbox.
//!
//! Maps caller-chosen session ids to per-session container environments and
//! exposes `/api/run` and `/api/reset` over JSON.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod registry;
pub mod routes;
pub mod service;

pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use registry::SessionRegistry;
pub use routes::create_router;
pub use service::SessionService;
