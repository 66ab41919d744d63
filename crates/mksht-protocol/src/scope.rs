//! Cancellation scopes.
//!
//! A [`Scope`] is a cancellation token with an optional deadline and a
//! record of why it ended. Workspaces, the server's in-flight work and
//! individual requests each own one; [`merge`] composes two of them so a
//! request stops as soon as either its workspace or the server gives up.

use std::sync::{Arc, OnceLock};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicitly cancelled (or released through a [`ScopeGuard`]).
    Cancelled,
    /// The scope's deadline passed.
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Cancellation handle. Clones share the same state.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
    reason: Arc<OnceLock<CancelReason>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// A scope that ends on its own once `deadline` passes.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::new()
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Cancelled);
    }

    /// First cause wins; later calls only re-fire the token.
    fn cancel_with(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// The cause, once the scope has ended.
    pub fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.reason.get() {
            return Some(*reason);
        }
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Wait until the scope ends and return the cause.
    pub async fn cancelled(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        self.cancel_with(CancelReason::DeadlineExceeded);
                    }
                }
            }
            None => self.token.cancelled().await,
        }
        self.reason().unwrap_or(CancelReason::Cancelled)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its scope when dropped.
#[derive(Debug)]
pub struct ScopeGuard {
    scope: Scope,
}

impl ScopeGuard {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

/// Compose two scopes into one that ends when either of them ends.
///
/// The merged deadline is the earlier of the two, and the merged reason is
/// the reason of whichever source ended first. The returned guard releases
/// the merged scope (and the task watching the sources) when dropped.
///
/// Must be called from within a tokio runtime.
pub fn merge(primary: &Scope, secondary: &Scope) -> (Scope, ScopeGuard) {
    let deadline = match (primary.deadline, secondary.deadline) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    let merged = Scope {
        deadline,
        ..Scope::new()
    };
    let guard = ScopeGuard {
        scope: merged.clone(),
    };

    if let Some(reason) = primary.reason().or_else(|| secondary.reason()) {
        merged.cancel_with(reason);
        return (merged, guard);
    }

    let (primary, secondary, watched) = (primary.clone(), secondary.clone(), merged.clone());
    tokio::spawn(async move {
        tokio::select! {
            reason = primary.cancelled() => watched.cancel_with(reason),
            reason = secondary.cancelled() => watched.cancel_with(reason),
            _ = watched.token.cancelled() => {}
        }
    });

    (merged, guard)
}
