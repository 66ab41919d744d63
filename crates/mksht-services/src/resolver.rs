//! Document resolution: maps a workspace-relative URL path onto a file
//! inside the workspace root.

use std::path::{Path, PathBuf};

use mksht_protocol::{PathSegment, urlpath};
use tracing::debug;

use crate::error::DocError;

/// Document served when the path names the workspace itself.
pub const INDEX_DOCUMENT: &str = "index.html";

/// Outcome of resolving a request path against a workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute filesystem path, always inside the workspace root.
    pub path: PathBuf,
    /// The same document as a cleaned, slash-separated path relative to
    /// the root (`/dir/name`), exec markers stripped.
    pub doc_path: String,
    /// Whether an exec marker (`!`) appeared on any segment.
    pub execute: bool,
}

impl ResolvedTarget {
    /// Last segment of the document path.
    pub fn name(&self) -> &str {
        urlpath::split(&self.doc_path).1
    }
}

/// Resolves URL paths against one workspace root.
#[derive(Debug, Clone)]
pub struct DocumentResolver {
    root: PathBuf,
}

impl DocumentResolver {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the segments of `path` (the remainder after the workspace slug)
    /// and build the target.
    ///
    /// Every accumulated segment is a single decoded name; `..` can only
    /// pop names pushed earlier in the same path, so the result can never
    /// climb above the root.
    pub fn resolve(&self, path: &str) -> Result<ResolvedTarget, DocError> {
        if path.is_empty() || path == "/" {
            return Ok(ResolvedTarget {
                path: self.root.join(INDEX_DOCUMENT),
                doc_path: format!("/{INDEX_DOCUMENT}"),
                execute: false,
            });
        }

        let mut stack: Vec<String> = Vec::new();
        let mut execute = false;

        for raw in urlpath::segments(path) {
            let decoded = decode_segment(raw).ok_or_else(|| DocError::not_found(path))?;
            match PathSegment::classify(&decoded) {
                PathSegment::Current => {}
                PathSegment::Parent => {
                    if stack.pop().is_none() {
                        debug!("Rejecting path escaping workspace root: {path}");
                        return Err(DocError::not_found(path));
                    }
                }
                PathSegment::Hidden(name) => {
                    debug!("Rejecting hidden segment {name:?} in {path}");
                    return Err(DocError::not_found(path));
                }
                PathSegment::Exec(name) => {
                    execute = true;
                    stack.push(name.to_string());
                }
                PathSegment::Normal(name) => stack.push(name.to_string()),
            }
        }

        // Exec targets must name a document below the root.
        if execute && stack.is_empty() {
            debug!("Rejecting exec target without a document name: {path}");
            return Err(DocError::not_found(path));
        }

        let mut file_path = self.root.clone();
        for name in &stack {
            file_path.push(name);
        }

        Ok(ResolvedTarget {
            path: file_path,
            doc_path: urlpath::join(stack.iter().map(String::as_str)),
            execute,
        })
    }
}

/// Percent-decode one segment. Segments that decode to something the OS
/// would split again (separators, NUL) or that are not UTF-8 are refused.
fn decode_segment(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?;
    if decoded.contains(['/', '\\', '\0']) {
        return None;
    }
    Some(decoded.into_owned())
}
