//! Shared integration-test harness for spawning a `defuse` server as a
//! child process and talking to it over HTTP.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Default timeout for a single HTTP exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A running `defuse` server with an HTTP client pointed at it.
///
/// The child process is killed on drop via `kill_on_drop(true)`.
#[allow(clippy::missing_panics_doc)]
pub struct DefuseServer {
    child: Child,
    base_url: String,
    client: reqwest::Client,
}

impl DefuseServer {
    /// Spawns a server for the given fixture on an ephemeral port.
    ///
    /// Reads stderr until the "HTTP server listening" line to discover the port.
    #[allow(clippy::missing_panics_doc)]
    pub async fn start(fixture: &str, extra_args: &[&str]) -> Self {
        let config_path = fixture_path(fixture);
        let bin = env!("CARGO_BIN_EXE_defuse");
        let mut child = Command::new(bin)
            .args([
                "server",
                "run",
                "--config",
                config_path.to_str().expect("non-UTF-8 config path"),
                "--http",
                "127.0.0.1:0",
                "--color",
                "never",
                "-v",
            ])
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn defuse");

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        let mut port: Option<u16> = None;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            line.clear();
            let n = tokio::time::timeout(DEFAULT_TIMEOUT, reader.read_line(&mut line))
                .await
                .expect("timed out waiting for HTTP server startup")
                .expect("failed to read stderr");

            assert!(n > 0, "server exited before printing listening address");

            if line.contains("HTTP") && line.contains("listening") {
                if let Some(addr_start) = line.find("127.0.0.1:") {
                    let after_host = &line[addr_start + "127.0.0.1:".len()..];
                    let port_str: String = after_host
                        .chars()
                        .take_while(char::is_ascii_digit)
                        .collect();
                    port = port_str.parse().ok();
                }
                break;
            }
        }

        // Keep draining stderr so the child never blocks on a full pipe
        tokio::spawn(async move {
            let mut sink = String::new();
            while reader.read_line(&mut sink).await.is_ok_and(|n| n > 0) {
                sink.clear();
            }
        });

        let port = port.expect("failed to discover HTTP server port from stderr");
        Self {
            child,
            base_url: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Full URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// The shared HTTP client.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `GET /api/state`.
    #[allow(clippy::missing_panics_doc)]
    pub async fn state(&self) -> Value {
        self.client
            .get(self.url("/api/state"))
            .send()
            .await
            .expect("failed to send HTTP request")
            .json()
            .await
            .expect("state is not JSON")
    }

    /// POSTs a JSON body and returns status and parsed body.
    #[allow(clippy::missing_panics_doc)]
    pub async fn post_json(&self, path: &str, body: &Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("failed to send HTTP request");
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    /// POSTs with an empty body, as the operator console does.
    #[allow(clippy::missing_panics_doc)]
    pub async fn admin(&self, action: &str) -> Value {
        let resp = self
            .client
            .post(self.url(&format!("/api/admin/{action}")))
            .send()
            .await
            .expect("failed to send HTTP request");
        assert!(resp.status().is_success(), "admin {action} failed");
        resp.json().await.expect("admin response is not JSON")
    }

    /// Kills the server process.
    pub async fn shutdown(mut self) {
        let _ = self.child.kill().await;
    }
}

/// Returns the path to a test fixture.
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Runs the binary to completion with `args`.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn run_command(args: &[&str]) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_defuse"))
        .args(args)
        .output()
        .expect("failed to run defuse")
}
