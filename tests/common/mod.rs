//! Common test utilities and fixtures
//!
//! A sandboxed working directory for running the binary, a scriptable
//! EventSub WebSocket server and a wiremock subscribe endpoint.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod eventsub_server;

pub use eventsub_server::*;

/// Environment variables that would leak host settings into a test run
const OVERLAY_VARS: [&str; 15] = [
    "OVERLAY_CONFIG",
    "OVERLAY_ENV",
    "OVERLAY_LOCAL_URL",
    "OVERLAY_PRODUCTION_URL",
    "OVERLAY_RECONNECT_DELAY_MS",
    "OVERLAY_SUBSCRIBE_ENDPOINT",
    "OVERLAY_USERNAME",
    "OVERLAY_ALERT_DURATION_MS",
    "OVERLAY_FPS",
    "OVERLAY_FRAME_LOG",
    "OVERLAY_AUDIO_PLAYER",
    "OVERLAY_AUDIO_ENABLED",
    "OVERLAY_LOG_LEVEL",
    "OVERLAY_LOG_FILE",
    "OVERLAY_LOG_JSON",
];

// ─────────────────────────────────────────────────────────────────
// Sandbox
// ─────────────────────────────────────────────────────────────────

/// Isolated home and working directory so no user config is picked up
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn frame_log(&self) -> PathBuf {
        self.dir.path().join("frames.jsonl")
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Blocking command for CLI assertions
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("eventsub-overlay").unwrap();
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"));
        for var in OVERLAY_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Start `eventsub-overlay run` against the given servers
    pub fn spawn_run(&self, eventsub_url: &str, subscribe_endpoint: &str, extra_env: &[(&str, &str)]) -> tokio::process::Child {
        let mut cmd = tokio::process::Command::new(assert_cmd::cargo::cargo_bin("eventsub-overlay"));
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"));
        for var in OVERLAY_VARS {
            cmd.env_remove(var);
        }

        cmd.env("OVERLAY_ENV", "dev")
            .env("OVERLAY_LOCAL_URL", eventsub_url)
            .env("OVERLAY_SUBSCRIBE_ENDPOINT", subscribe_endpoint)
            .env("OVERLAY_FRAME_LOG", self.frame_log())
            .env("OVERLAY_LOG_LEVEL", "debug");
        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        cmd.arg("run")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    /// Lines of the frame log written so far
    pub fn frame_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.frame_log())
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Subscribe Endpoint
// ─────────────────────────────────────────────────────────────────

/// Answers every subscribe request with 202 and keeps the bodies
pub struct MockSubscribeEndpoint {
    pub url: String,
    server: MockServer,
}

impl MockSubscribeEndpoint {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscribe"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({ "status": "ok" })))
            .mount(&server)
            .await;

        Self {
            url: format!("{}/subscribe", server.uri()),
            server,
        }
    }

    /// JSON bodies received so far
    pub async fn requests(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    /// Wait until at least `count` requests have arrived
    pub async fn wait_for(&self, count: usize) -> Vec<serde_json::Value> {
        tokio::time::timeout(WAIT, async {
            loop {
                let requests = self.requests().await;
                if requests.len() >= count {
                    return requests;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("timed out waiting for subscribe request")
    }
}

/// Wait for the process to exit on its own
pub async fn wait_for_exit(child: &mut tokio::process::Child) -> std::process::ExitStatus {
    tokio::time::timeout(WAIT, child.wait())
        .await
        .expect("overlay did not exit")
        .unwrap()
}
