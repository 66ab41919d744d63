//! Script execution for `!`-marked documents.
//!
//! A request for `!report.json` runs the first `report.json.<ext>` found
//! next to it through the interpreter registered for `<ext>`, and answers
//! with whatever the script wrote to stdout.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use mksht_protocol::Scope;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::document::stat;
use crate::error::DocError;

/// Maps a script file extension to the interpreter that runs it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorRule {
    pub extension: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExecutorRule {
    pub fn new(extension: &str, command: &str, args: &[&str]) -> Self {
        Self {
            extension: extension.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// `<document>.<extension>`, the file this rule looks for.
    pub fn script_path(&self, document: &Path) -> PathBuf {
        let mut script: OsString = document.as_os_str().to_owned();
        if !self.extension.starts_with('.') {
            script.push(".");
        }
        script.push(&self.extension);
        PathBuf::from(script)
    }
}

/// Built-in interpreter table, probed in order.
pub fn default_rules() -> Vec<ExecutorRule> {
    vec![
        ExecutorRule::new(".sh", "sh", &[]),
        ExecutorRule::new(".py", "python3", &[]),
        ExecutorRule::new(".go", "go", &["run"]),
    ]
}

/// Find the first rule whose script exists as a regular file.
pub async fn find_script<'r>(
    document: &Path,
    rules: &'r [ExecutorRule],
) -> Result<Option<(&'r ExecutorRule, PathBuf)>, DocError> {
    for rule in rules {
        let script = rule.script_path(document);
        match stat(&script).await? {
            Some(meta) if meta.is_file() => return Ok(Some((rule, script))),
            _ => continue,
        }
    }
    Ok(None)
}

/// Run the script backing `document` and respond with its stdout.
///
/// The child is killed if `scope` ends first, or if the returned future is
/// dropped (client went away).
pub async fn execute(
    document: &Path,
    rules: &[ExecutorRule],
    scope: &Scope,
) -> Result<Response, DocError> {
    let Some((rule, script)) = find_script(document, rules).await? else {
        return Err(DocError::not_found(document.display().to_string()));
    };
    debug!("Executing {} via {}", script.display(), rule.command);

    let mut command = Command::new(&rule.command);
    command
        .args(&rule.args)
        .arg(&script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = script.parent() {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| DocError::Spawn {
        command: rule.command.clone(),
        source,
    })?;

    let stdout = tokio::spawn(drain(child.stdout.take()));
    let stderr = tokio::spawn(drain(child.stderr.take()));

    let status = tokio::select! {
        status = child.wait() => status.map_err(|e| DocError::io(&script, e))?,
        reason = scope.cancelled() => {
            let _ = child.kill().await;
            stdout.abort();
            stderr.abort();
            info!("Killed {} ({reason})", script.display());
            return Err(DocError::Cancelled(reason));
        }
    };

    let (stdout, stderr) = tokio::try_join!(stdout, stderr)?;
    let stdout = stdout.map_err(|e| DocError::io(&script, e))?;
    let stderr = stderr.map_err(|e| DocError::io(&script, e))?;

    if !status.success() {
        return Err(DocError::ScriptFailed {
            script,
            status,
            stderr,
        });
    }

    let content_type = mime_guess::from_path(document)
        .first_or_octet_stream()
        .to_string();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, stdout.len().to_string()),
        ],
        Body::from(stdout),
    )
        .into_response())
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
