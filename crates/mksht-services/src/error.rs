//! Document dispatch errors and their HTTP rendering.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use axum::{
    body::Body,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use mksht_protocol::CancelReason;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Methods a workspace answers to.
pub const ALLOWED_METHODS: &str = "GET, POST, PUT";

/// Everything that can go wrong while dispatching a document request.
#[derive(Debug, Error)]
pub enum DocError {
    /// Missing file, hidden segment, escaped root, unknown workspace.
    #[error("Not found: {0}")]
    NotFound(String),

    /// PUT onto a directory, POST onto an existing literal name.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Script {script} exited with {status}")]
    ScriptFailed {
        script: PathBuf,
        status: ExitStatus,
        stderr: Vec<u8>,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Request {0}")]
    Cancelled(CancelReason),
}

impl DocError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io { .. }
            | Self::Body(_)
            | Self::Spawn { .. }
            | Self::ScriptFailed { .. }
            | Self::Task(_)
            | Self::Cancelled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Whether an I/O error means "nothing there" rather than a real failure.
pub fn is_not_exist(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

impl IntoResponse for DocError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::NotFound(_) | Self::Conflict(_) | Self::MethodNotAllowed(_) => {
                debug!("{self}");
            }
            Self::ScriptFailed { .. } | Self::Cancelled(_) => warn!("{self}"),
            _ => error!("{self}"),
        }

        let body = match self {
            Self::ScriptFailed { stderr, .. } => Body::from(stderr),
            _ => Body::from(status.canonical_reason().unwrap_or("Error")),
        };

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if status == StatusCode::METHOD_NOT_ALLOWED {
            headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        response
    }
}
