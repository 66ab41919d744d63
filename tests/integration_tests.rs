//! End-to-end integration tests: real listener, real HTTP client, and
//! the makeshiftd binary itself.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mksht_server::{AppConfig, RequestRouter, WorkspaceRegistry};
use mksht_transport::{HttpServer, ShutdownCoordinator};
use reqwest::{StatusCode, header};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// A running server plus the handles needed to stop it.
struct TestServer {
    base: String,
    signals: mpsc::Sender<()>,
    run: tokio::task::JoinHandle<Result<(), mksht_transport::ServeError>>,
}

/// Write `config` next to the workspace directories and start a server on
/// a random port.
async fn start_server(dir: &Path, config: &str) -> TestServer {
    let config_path = dir.join("makeshiftd.toml");
    std::fs::write(&config_path, config).unwrap();
    let config = AppConfig::from_file(&config_path).unwrap();

    let registry = Arc::new(WorkspaceRegistry::from_config(&config));
    let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_secs(5)));
    let router =
        RequestRouter::new(registry, coordinator.in_flight_scope().clone()).into_router();

    let server = HttpServer::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", server.local_addr());
    let (signals, rx) = mpsc::channel(4);
    let run = tokio::spawn(server.run(router, coordinator, rx));

    TestServer { base, signals, run }
}

fn workspace_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("workspace1")).unwrap();
    std::fs::write(dir.path().join("workspace1/index.html"), "<p>home</p>").unwrap();
    dir
}

const CONFIG: &str = r#"
[workspaces]
ws1 = "./workspace1"
"#;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP behaviour
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn index_responses() {
    let dir = workspace_dir();
    let server = start_server(dir.path(), CONFIG).await;
    let client = reqwest::Client::new();

    let root = client.get(&server.base).send().await.unwrap();
    assert_eq!(root.status(), StatusCode::OK);
    assert_eq!(root.text().await.unwrap(), "Makeshiftd");

    let mut bodies = Vec::new();
    for path in ["/ws1/index.html", "/ws1/", "/ws1"] {
        let response = client.get(format!("{}{path}", server.base)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        bodies.push(response.bytes().await.unwrap());
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(bodies[0], "<p>home</p>");
}

#[tokio::test]
async fn upload_lifecycle() {
    let dir = workspace_dir();
    let server = start_server(dir.path(), CONFIG).await;
    let client = reqwest::Client::new();
    let url = |path: &str| format!("{}{path}", server.base);

    let created = client.post(url("/ws1/temp/data.json")).body("{}").send().await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(created.headers()[header::LOCATION], "/ws1/temp/data.json");

    let again = client.post(url("/ws1/temp/data.json")).body("{}").send().await.unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let unique = client.post(url("/ws1/temp/data_*.json")).body("[1]").send().await.unwrap();
    assert_eq!(unique.status(), StatusCode::CREATED);
    let location = unique.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("/ws1/temp/data_") && location.ends_with(".json"));

    let fetched = client.get(url(&location)).send().await.unwrap();
    assert_eq!(fetched.text().await.unwrap(), "[1]");

    let put = client.put(url("/ws1/notes.txt")).body("v1").send().await.unwrap();
    assert_eq!(put.status(), StatusCode::CREATED);
    let put = client.put(url("/ws1/notes.txt")).body("v2").send().await.unwrap();
    assert_eq!(put.status(), StatusCode::OK);
    let fetched = client.get(url("/ws1/notes.txt")).send().await.unwrap();
    assert_eq!(fetched.text().await.unwrap(), "v2");
}

#[tokio::test]
async fn unsafe_and_unknown_paths() {
    let dir = workspace_dir();
    std::fs::create_dir(dir.path().join("workspace1/_private")).unwrap();
    std::fs::write(dir.path().join("workspace1/_private/x"), "secret").unwrap();
    std::fs::write(dir.path().join("secret.txt"), "outside").unwrap();
    let server = start_server(dir.path(), CONFIG).await;
    let client = reqwest::Client::new();

    for path in ["/ws1/_private/x", "/ws1/.git/config", "/ws1/%2e%2e/secret.txt", "/nope/"] {
        let response = client.get(format!("{}{path}", server.base)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }

    let response = client
        .delete(format!("{}/ws1/index.html", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET, POST, PUT");
}

#[cfg(unix)]
#[tokio::test]
async fn configured_executor_runs_scripts() {
    let dir = workspace_dir();
    std::fs::write(dir.path().join("workspace1/hello.txt.run"), "echo hello from $0\n").unwrap();
    let config = format!("{CONFIG}\n[[executors]]\nextension = \"run\"\ncommand = \"sh\"\n");
    let server = start_server(dir.path(), &config).await;

    let response = reqwest::get(format!("{}/ws1/!hello.txt", server.base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let body = response.text().await.unwrap();
    assert!(body.starts_with("hello from "), "{body}");
    assert!(body.trim_end().ends_with("hello.txt.run"), "{body}");
}

#[tokio::test]
async fn signal_stops_server_cleanly() {
    let dir = workspace_dir();
    let server = start_server(dir.path(), CONFIG).await;

    let response = reqwest::get(&server.base).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.signals.send(()).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), server.run)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok(), "{result:?}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Binary
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn binary_fails_without_configuration() {
    let dir = TempDir::new().unwrap();
    let status = tokio::process::Command::new(env!("CARGO_BIN_EXE_makeshiftd"))
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[cfg(unix)]
#[tokio::test]
async fn binary_serves_and_exits_zero_on_interrupt() {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let dir = workspace_dir();
    let config_path = dir.path().join("makeshiftd.toml");
    std::fs::write(&config_path, CONFIG).unwrap();

    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_makeshiftd"))
        .arg("--config")
        .arg(&config_path)
        .args(["--host", "127.0.0.1", "--port", "0"])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    let base = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(line) = lines.next_line().await.unwrap() {
            if let Some(url) = line.trim().strip_prefix("Listening:") {
                return url.trim().to_string();
            }
        }
        panic!("server exited before listening");
    })
    .await
    .unwrap();

    let body = reqwest::get(format!("{base}/ws1")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "<p>home</p>");

    let pid = child.id().unwrap().to_string();
    let killed = std::process::Command::new("kill").args(["-INT", &pid]).status().unwrap();
    assert!(killed.success());

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.code(), Some(0));
}

#[cfg(unix)]
#[tokio::test]
async fn binary_exits_two_when_second_interrupt_abandons_requests() {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let dir = workspace_dir();
    std::fs::write(dir.path().join("workspace1/slow.run"), "exec sleep 30\n").unwrap();
    let config_path = dir.path().join("makeshiftd.toml");
    let config = format!("{CONFIG}\n[[executors]]\nextension = \"run\"\ncommand = \"sh\"\n");
    std::fs::write(&config_path, config).unwrap();

    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_makeshiftd"))
        .arg("--config")
        .arg(&config_path)
        .args(["--host", "127.0.0.1", "--port", "0"])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    let base = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(line) = lines.next_line().await.unwrap() {
            if let Some(url) = line.trim().strip_prefix("Listening:") {
                return url.trim().to_string();
            }
        }
        panic!("server exited before listening");
    })
    .await
    .unwrap();

    let pending = tokio::spawn(reqwest::get(format!("{base}/ws1/!slow")));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let pid = child.id().unwrap().to_string();
    for _ in 0..2 {
        let killed = std::process::Command::new("kill").args(["-INT", &pid]).status().unwrap();
        assert!(killed.success());
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.code(), Some(2));
    pending.abort();
}
