//! Makeshiftd document services
//!
//! Everything that happens once a request has been matched to a workspace:
//! turning the remaining URL path into a filesystem target, then serving,
//! creating, replacing or executing the document it names.

pub mod document;
pub mod error;
pub mod exec;
pub mod resolver;

pub use document::DocumentDispatcher;
pub use error::DocError;
pub use exec::ExecutorRule;
pub use resolver::{DocumentResolver, ResolvedTarget};
