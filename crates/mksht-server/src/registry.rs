//! WorkspaceRegistry: the configured workspaces, looked up by slug.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mksht_services::ExecutorRule;
use parking_lot::RwLock;
use tracing::{error, info};

use crate::config::{AppConfig, ConfigError};
use crate::workspace::{Workspace, slug_for};

/// Owns every workspace the server answers for.
///
/// Written only while registering at startup; request handling takes the
/// read lock and clones out an `Arc`, so no lock is held across an await.
pub struct WorkspaceRegistry {
    workspaces: RwLock<HashMap<String, Arc<Workspace>>>,
    base_dir: PathBuf,
    executors: Arc<[ExecutorRule]>,
}

impl WorkspaceRegistry {
    /// Relative roots passed to [`register`](Self::register) resolve
    /// against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, executors: Vec<ExecutorRule>) -> Self {
        Self {
            workspaces: RwLock::new(HashMap::new()),
            base_dir: base_dir.into(),
            executors: Arc::from(executors),
        }
    }

    /// Build a registry from a loaded configuration. A workspace that fails
    /// to register is logged and skipped; the rest are still served.
    pub fn from_config(config: &AppConfig) -> Self {
        let registry = Self::new(config.base_dir(), config.executor_rules());
        for (name, root) in &config.workspaces {
            if let Err(e) = registry.register(name, root) {
                error!("Skipping workspace {name}: {e}");
            }
        }
        registry
    }

    pub fn register(&self, name: &str, root: &Path) -> Result<Arc<Workspace>, ConfigError> {
        let slug = slug_for(name);
        if self.workspaces.read().contains_key(&slug) {
            return Err(ConfigError::DuplicateSlug(slug));
        }
        let root = self.resolve_root(name, root)?;

        // A concurrent register may have taken the slug meanwhile.
        let mut workspaces = self.workspaces.write();
        if workspaces.contains_key(&slug) {
            return Err(ConfigError::DuplicateSlug(slug));
        }

        let workspace = Arc::new(Workspace::new(name, root, self.executors.clone()));
        workspaces.insert(slug, workspace.clone());

        info!(
            "Workspace registered: /{} -> {}",
            workspace.slug(),
            workspace.root().display()
        );
        Ok(workspace)
    }

    pub fn lookup(&self, slug: &str) -> Option<Arc<Workspace>> {
        self.workspaces.read().get(slug).cloned()
    }

    /// Snapshot of all workspaces, ordered by slug.
    pub fn list(&self) -> Vec<Arc<Workspace>> {
        let mut list: Vec<_> = self.workspaces.read().values().cloned().collect();
        list.sort_by(|a, b| a.slug().cmp(b.slug()));
        list
    }

    pub fn len(&self) -> usize {
        self.workspaces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.read().is_empty()
    }

    /// Cancel every workspace scope (called during server shutdown).
    pub fn shutdown_all(&self) {
        for workspace in self.list() {
            info!("Shutting down workspace: {}", workspace.slug());
            workspace.cancel();
        }
    }

    fn resolve_root(&self, name: &str, root: &Path) -> Result<PathBuf, ConfigError> {
        let joined = if root.is_absolute() {
            root.to_path_buf()
        } else {
            self.base_dir.join(root)
        };
        let invalid = || ConfigError::InvalidRoot {
            name: name.to_string(),
            path: joined.clone(),
        };

        let canonical = std::fs::canonicalize(&joined).map_err(|_| invalid())?;
        if !canonical.is_dir() {
            return Err(invalid());
        }
        Ok(canonical)
    }
}
