//! Makeshiftd protocol types
//!
//! Shared building blocks used by every other makeshiftd crate:
//! URL path segmentation, path segment classification, and the
//! cancellation scopes that tie requests to workspace and server
//! lifetimes.

pub mod scope;
pub mod segment;
pub mod urlpath;

pub use scope::{CancelReason, Scope, ScopeGuard, merge};
pub use segment::PathSegment;
pub use urlpath::{join, pop_left, segments, split};
