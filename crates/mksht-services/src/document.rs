//! Document dispatch: GET, POST and PUT against a workspace.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use mksht_protocol::{Scope, urlpath};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, trace};

use crate::error::{DocError, is_not_exist};
use crate::exec::{self, ExecutorRule};
use crate::resolver::{DocumentResolver, ResolvedTarget};

/// Placeholder in a POSTed file name that is replaced by a unique number.
const WILDCARD: char = '*';

/// Attempts at finding a free name for a wildcard upload.
const MAX_UNIQUE_ATTEMPTS: usize = 10_000;

/// Dispatches requests for one workspace.
#[derive(Debug, Clone)]
pub struct DocumentDispatcher {
    slug: String,
    resolver: DocumentResolver,
    executors: Arc<[ExecutorRule]>,
}

impl DocumentDispatcher {
    pub fn new(slug: impl Into<String>, root: PathBuf, executors: Arc<[ExecutorRule]>) -> Self {
        Self {
            slug: slug.into(),
            resolver: DocumentResolver::new(root),
            executors,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Handle `request` for the workspace-relative `path`, rendering any
    /// failure as its error response.
    pub async fn handle(&self, path: &str, request: Request, scope: &Scope) -> Response {
        self.dispatch(path, request, scope)
            .await
            .unwrap_or_else(IntoResponse::into_response)
    }

    pub async fn dispatch(
        &self,
        path: &str,
        request: Request,
        scope: &Scope,
    ) -> Result<Response, DocError> {
        let method = request.method().clone();
        if !matches!(method, Method::GET | Method::POST | Method::PUT) {
            return Err(DocError::MethodNotAllowed(method));
        }

        let target = self.resolver.resolve(path)?;
        debug!(
            "{method} /{}{} -> {} (execute: {})",
            self.slug,
            target.doc_path,
            target.path.display(),
            target.execute
        );

        if target.execute {
            return exec::execute(&target.path, &self.executors, scope).await;
        }

        match method {
            Method::GET => self.get(&target, request).await,
            Method::POST => self.post(&target, request.into_body(), scope).await,
            _ => self.put(&target, request.into_body(), scope).await,
        }
    }

    async fn get(&self, target: &ResolvedTarget, request: Request) -> Result<Response, DocError> {
        let mut file_path = target.path.clone();
        let mut meta = stat(&file_path).await?;

        if meta.as_ref().is_some_and(Metadata::is_dir) {
            if let Some(index) = find_index(file_path.clone()).await? {
                meta = stat(&index).await?;
                file_path = index;
            }
        }

        match meta {
            Some(meta) if !meta.is_dir() => {}
            _ => return Err(DocError::not_found(target.doc_path.clone())),
        }

        // Surface open failures (permissions) with their cause before
        // handing the file to the content server.
        File::open(&file_path)
            .await
            .map_err(|e| DocError::io(&file_path, e))?;

        trace!("Serving {}", file_path.display());
        let Ok(response) = ServeFile::new(&file_path).oneshot(request).await;
        Ok(response.map(Body::new))
    }

    async fn post(
        &self,
        target: &ResolvedTarget,
        body: Body,
        scope: &Scope,
    ) -> Result<Response, DocError> {
        let (doc_dir, doc_name) = urlpath::split(&target.doc_path);
        let file_dir = parent_dir(&target.path);
        let unique = doc_name.contains(WILDCARD);

        // The existence check and the create below are not atomic: two
        // POSTs racing for the same literal name may both succeed, the
        // later one truncating the earlier upload.
        if !unique && stat(&target.path).await?.is_some() {
            return Err(DocError::conflict(target.doc_path.clone()));
        }

        fs::create_dir_all(file_dir)
            .await
            .map_err(|e| DocError::io(file_dir, e))?;

        let (mut file, file_path) = if unique {
            create_unique(file_dir, doc_name).await?
        } else {
            let file = File::create(&target.path)
                .await
                .map_err(|e| DocError::io(&target.path, e))?;
            (file, target.path.clone())
        };

        let written = copy_body(body, &mut file, &file_path, scope).await?;
        trace!("Request body copied to {}: {written} bytes", file_path.display());

        let created_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let location = location(&self.slug, doc_dir, &created_name);

        Ok((StatusCode::CREATED, [(header::LOCATION, location)]).into_response())
    }

    async fn put(
        &self,
        target: &ResolvedTarget,
        body: Body,
        scope: &Scope,
    ) -> Result<Response, DocError> {
        let existed = match stat(&target.path).await? {
            Some(meta) if meta.is_dir() => {
                return Err(DocError::conflict(target.doc_path.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if !existed {
            let file_dir = parent_dir(&target.path);
            fs::create_dir_all(file_dir)
                .await
                .map_err(|e| DocError::io(file_dir, e))?;
        }

        // A failed copy leaves the truncated file behind.
        let mut file = File::create(&target.path)
            .await
            .map_err(|e| DocError::io(&target.path, e))?;
        let written = copy_body(body, &mut file, &target.path, scope).await?;
        trace!("Request body copied to {}: {written} bytes", target.path.display());

        Ok(if existed { StatusCode::OK } else { StatusCode::CREATED }.into_response())
    }
}

/// Metadata for `path`, `None` when nothing exists there. Any other failure
/// is an error and is never reported as not-found.
pub(crate) async fn stat(path: &Path) -> Result<Option<Metadata>, DocError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if is_not_exist(&e) => Ok(None),
        Err(e) => Err(DocError::io(path, e)),
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}

/// First `index.*` entry of `dir` in lexicographic order.
async fn find_index(dir: PathBuf) -> Result<Option<PathBuf>, DocError> {
    tokio::task::spawn_blocking(move || {
        let pattern = format!("{}/index.*", glob::Pattern::escape(&dir.to_string_lossy()));
        let paths = glob::glob(&pattern).map_err(|e| {
            DocError::io(&dir, io::Error::new(io::ErrorKind::InvalidInput, e))
        })?;

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => matches.push(path),
                Err(e) => {
                    let path = e.path().to_path_buf();
                    return Err(DocError::io(path, e.into_error()));
                }
            }
        }
        matches.sort();
        Ok(matches.into_iter().next())
    })
    .await?
}

/// Create a new file in `dir` named after `pattern`, with its last `*`
/// replaced by a random number. Never reuses an existing name.
async fn create_unique(dir: &Path, pattern: &str) -> Result<(File, PathBuf), DocError> {
    let (prefix, suffix) = pattern
        .rsplit_once(WILDCARD)
        .unwrap_or((pattern, ""));

    for _ in 0..MAX_UNIQUE_ATTEMPTS {
        let name = format!("{prefix}{}{suffix}", rand::random::<u32>());
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(DocError::io(&path, e)),
        }
    }

    Err(DocError::io(
        dir.join(pattern),
        io::Error::new(io::ErrorKind::AlreadyExists, "no unique name available"),
    ))
}

/// Stream the request body into `file`, checking `scope` between chunks.
async fn copy_body(
    body: Body,
    file: &mut File,
    path: &Path,
    scope: &Scope,
) -> Result<u64, DocError> {
    let mut stream = body.into_data_stream();
    let mut written = 0u64;

    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            reason = scope.cancelled() => return Err(DocError::Cancelled(reason)),
        };
        let Some(chunk) = chunk else { break };
        let bytes = chunk?;
        file.write_all(&bytes)
            .await
            .map_err(|e| DocError::io(path, e))?;
        written += bytes.len() as u64;
    }

    file.flush().await.map_err(|e| DocError::io(path, e))?;
    Ok(written)
}

/// Server-relative URL of a created document, segments percent-encoded.
fn location(slug: &str, doc_dir: &str, name: &str) -> String {
    let encoded: Vec<String> = std::iter::once(slug)
        .chain(urlpath::segments(doc_dir))
        .chain(std::iter::once(name))
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    urlpath::join(encoded.iter().map(String::as_str))
}
