#![deny(clippy::all, clippy::pedantic)]

use assert_cmd::Command;
use httpmock::MockServer;
use predicates::str::contains;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

const LISTING: &str = r#"{"status":"success","message":"","data":[
    {"path":"/docs/readme.md","name":"readme.md","size":42,"created_at":"2024-05-01T10:00:00Z","updated_at":"2024-05-02T11:30:00Z","file_type":"File","is_hidden":false}
]}"#;

fn syncdeck(workdir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("syncdeck"));
    cmd.current_dir(workdir.path())
        .env_remove("SYNCDECK_CONFIG_FILE")
        .env_remove("SYNCDECK__API__BASE_URL")
        .env_remove("SYNCDECK__API__ACCESS_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tmp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn files_ls_prints_json_listing() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/api/v1/file-manager")
            .query_param("path", "/docs")
            .header("authorization", "Bearer env-token");
        then.status(200)
            .header("content-type", "application/json")
            .body(LISTING);
    });

    let workdir = TempDir::new().expect("workdir");
    let assert = syncdeck(&workdir)
        .env("SYNCDECK__API__BASE_URL", server.base_url())
        .env("SYNCDECK__API__ACCESS_TOKEN", "env-token")
        .args(["files", "ls", "/docs", "--json"])
        .assert()
        .success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(output.contains("\"name\": \"readme.md\""));
    mock.assert();
}

#[test]
fn config_file_supplies_base_url() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/api/v1/file-manager/create-directory")
            .json_body_includes(r#"{"path":"/docs/new"}"#);
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"status":"success","message":"","data":null}"#);
    });

    let config = config_file(&format!("[api]\nbase_url = \"{}\"\n", server.base_url()));
    let workdir = TempDir::new().expect("workdir");
    syncdeck(&workdir)
        .arg("--config-file")
        .arg(config.path())
        .args(["files", "mkdir", "/docs", "new"])
        .assert()
        .success()
        .stdout(contains("created /docs/new"));
    mock.assert();
}

#[test]
fn missing_base_url_fails_fast() {
    let workdir = TempDir::new().expect("workdir");
    syncdeck(&workdir)
        .args(["files", "ls"])
        .assert()
        .failure()
        .stderr(contains("api.base_url"));
}

#[test]
fn server_error_exits_non_zero() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/api/v1/audit/logs");
        then.status(500).body("boom");
    });

    let workdir = TempDir::new().expect("workdir");
    syncdeck(&workdir)
        .args(["--base-url", &server.base_url(), "audit", "ls"])
        .assert()
        .failure()
        .stderr(contains("500"));
}
