//! Makeshiftd transport layer
//!
//! Owns the listening socket and everything about stopping it:
//! - the three-state shutdown machine and its signal feed
//! - the worker group that races the listener against the drain-waiter
//! - a signal watcher that keeps counting signals after the run returns
//! - surfacing how the run ended so the binary can pick an exit code

pub mod server;
pub mod shutdown;
pub mod workgroup;

pub use server::{HttpServer, ServeError};
pub use shutdown::{
    DEFAULT_GRACE_PERIOD, FORCE_EXIT_CODE, ShutdownAction, ShutdownCoordinator, ShutdownEvent,
    ShutdownState, signal_feed,
};
pub use workgroup::WorkGroup;
