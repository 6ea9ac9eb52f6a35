//! End-to-end tests for the `tsync` binary.
//!
//! stdout is a pipe here, so every command runs in JSON mode.

use assert_cmd::Command;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;
use tripsync::model::{Entity, Plan};

struct Env {
    home: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.home.path().join("trips.db")
    }

    /// A command isolated from the caller's config and environment.
    fn tsync(&self) -> Command {
        let mut cmd = Command::cargo_bin("tsync").unwrap();
        cmd.env("HOME", self.home.path())
            .env_remove("TRIPSYNC_DB")
            .env_remove("TRIPSYNC_REMOTE_URL")
            .env_remove("TRIPSYNC_API_KEY")
            .env_remove("TRIPSYNC_ACTOR")
            .env_remove("TRIPSYNC_REMOTE_TIMEOUT_MS")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(self.db());
        cmd
    }

    fn init(&self) {
        self.tsync().arg("init").assert().success();
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

/// The structured error is the last stderr line; log lines may precede it.
fn stderr_json(output: &std::process::Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    serde_json::from_str(stderr.lines().last().unwrap()).unwrap()
}

fn plan_json(owner: &str, title: &str) -> (String, String) {
    let plan: Entity = Plan::new(owner, title).into();
    (plan.id().to_string(), serde_json::to_string(&plan).unwrap())
}

#[test]
fn version_reports_package_version() {
    let env = Env::new();
    let output = env.tsync().arg("version").output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["schema"].is_string());
}

#[test]
fn init_creates_database_once() {
    let env = Env::new();
    env.init();
    assert!(env.db().exists());

    let output = env.tsync().arg("init").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["error"]["code"], "ALREADY_INITIALIZED");

    env.tsync().args(["init", "--force"]).assert().success();
}

#[test]
fn commands_require_init() {
    let env = Env::new();
    let output = env.tsync().args(["get", "plan", "plan_x"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["code"], "NOT_INITIALIZED");
    assert!(err["error"]["hint"].as_str().unwrap().contains("tsync init"));
}

#[test]
fn offline_save_is_queued_and_readable() {
    let env = Env::new();
    env.init();
    let (id, record) = plan_json("user_1", "Kyoto in spring");

    let output = env
        .tsync()
        .args(["--offline", "save"])
        .write_stdin(record)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let saved = stdout_json(&output);
    assert_eq!(saved["outcome"], "queued");
    assert_eq!(saved["id"], id.as_str());

    let output = env.tsync().args(["get", "plan", &id]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["title"], "Kyoto in spring");

    let output = env.tsync().args(["sync", "queue"]).output().unwrap();
    let queue = stdout_json(&output);
    let items = queue.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["entity_id"], id.as_str());

    let output = env.tsync().args(["--offline", "sync", "status"]).output().unwrap();
    let status = stdout_json(&output);
    assert_eq!(status["status"]["online"], false);
    assert_eq!(status["status"]["pending_count"], 1);
}

#[test]
fn memory_remote_save_is_synced() {
    let env = Env::new();
    env.init();
    let (_, record) = plan_json("user_1", "Lisbon");

    let output = env
        .tsync()
        .args(["--remote", "memory", "save"])
        .write_stdin(record)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["outcome"], "synced");

    let output = env.tsync().args(["sync", "queue"]).output().unwrap();
    assert_eq!(stdout_json(&output), Value::Array(Vec::new()));
}

#[test]
fn push_while_offline_fails_with_offline_code() {
    let env = Env::new();
    env.init();
    let output = env.tsync().args(["--offline", "sync", "push"]).output().unwrap();
    assert_eq!(output.status.code(), Some(6));
    assert_eq!(stderr_json(&output)["error"]["code"], "OFFLINE");
}

#[test]
fn field_toggle_on_missing_trip_is_not_found() {
    let env = Env::new();
    env.init();
    let output = env
        .tsync()
        .args(["--offline", "field", "bookmark", "trip_missing"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stderr_json(&output)["error"]["code"], "NOT_FOUND");
}

#[test]
fn list_and_delete_roundtrip() {
    let env = Env::new();
    env.init();
    let (id, record) = plan_json("user_7", "Oslo");
    env.tsync()
        .args(["--offline", "save"])
        .write_stdin(record)
        .assert()
        .success();

    let output = env.tsync().args(["list", "plans", "--owner", "user_7"]).output().unwrap();
    assert_eq!(stdout_json(&output).as_array().unwrap().len(), 1);

    let output = env.tsync().args(["--offline", "delete", "plan", &id]).output().unwrap();
    assert_eq!(stdout_json(&output)["deleted"], true);

    let output = env.tsync().args(["list", "plans", "--owner", "user_7"]).output().unwrap();
    assert!(stdout_json(&output).as_array().unwrap().is_empty());
}

#[test]
fn completions_mention_binary_name() {
    let env = Env::new();
    let output = env.tsync().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("tsync"));
}
