//! Makeshiftd server: workspaces, routing and configuration.
//!
//! The router owns an injected registry; nothing here is global.

pub mod config;
pub mod registry;
pub mod router;
pub mod workspace;

pub use config::{AppConfig, ConfigError, ServerConfig};
pub use registry::WorkspaceRegistry;
pub use router::RequestRouter;
pub use workspace::Workspace;
