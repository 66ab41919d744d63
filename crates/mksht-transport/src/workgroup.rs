//! WorkGroup: a set of tasks where the first to finish stops the rest.

use std::future::Future;

use mksht_protocol::Scope;
use tokio::task::{JoinError, JoinSet};
use tracing::warn;

/// Tasks sharing one scope.
///
/// Each worker receives the group scope and must return once it ends.
/// [`wait`](Self::wait) returns the first worker's result after the rest
/// have been joined.
pub struct WorkGroup<T> {
    scope: Scope,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> WorkGroup<T> {
    pub fn new() -> Self {
        Self {
            scope: Scope::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn spawn<F, Fut>(&mut self, worker: F)
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.tasks.spawn(worker(self.scope.clone()));
    }

    /// `None` for an empty group.
    pub async fn wait(mut self) -> Option<Result<T, JoinError>> {
        let first = self.tasks.join_next().await?;
        self.scope.cancel();

        while let Some(rest) = self.tasks.join_next().await {
            if let Err(e) = rest {
                warn!("Worker failed after group stop: {e}");
            }
        }
        Some(first)
    }
}

impl<T: Send + 'static> Default for WorkGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn first_result_wins_and_rest_are_joined() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut group = WorkGroup::new();

        for _ in 0..2 {
            let stopped = stopped.clone();
            group.spawn(move |scope| async move {
                scope.cancelled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
                "stopped"
            });
        }
        group.spawn(|_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "first"
        });
        assert_eq!(group.len(), 3);

        let first = group.wait().await.unwrap().unwrap();
        assert_eq!(first, "first");
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_group_has_no_result() {
        let group: WorkGroup<()> = WorkGroup::new();
        assert!(group.is_empty());
        assert!(group.wait().await.is_none());
    }

    #[tokio::test]
    async fn panicking_worker_is_reported() {
        let mut group = WorkGroup::new();
        group.spawn(|_| async {
            panic!("boom");
        });
        group.spawn(|scope| async move {
            scope.cancelled().await;
        });

        let first = group.wait().await.unwrap();
        assert!(first.unwrap_err().is_panic());
    }
}
