//! Workspace: a named directory root served under `/<slug>/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mksht_protocol::Scope;
use mksht_services::{DocumentDispatcher, ExecutorRule};

/// One configured workspace.
///
/// Immutable once registered. Its scope is cancelled only at shutdown,
/// which ends every request still dispatched against it.
#[derive(Debug)]
pub struct Workspace {
    name: String,
    slug: String,
    root: PathBuf,
    scope: Scope,
    dispatcher: DocumentDispatcher,
}

impl Workspace {
    /// `root` must already be absolute and cleaned.
    pub(crate) fn new(name: &str, root: PathBuf, executors: Arc<[ExecutorRule]>) -> Self {
        let slug = slug_for(name);
        let dispatcher = DocumentDispatcher::new(slug.clone(), root.clone(), executors);
        Self {
            name: name.to_string(),
            slug,
            root,
            scope: Scope::new(),
            dispatcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn dispatcher(&self) -> &DocumentDispatcher {
        &self.dispatcher
    }

    pub fn cancel(&self) {
        self.scope.cancel();
    }
}

pub fn slug_for(name: &str) -> String {
    name.to_lowercase()
}
