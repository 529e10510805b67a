#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// A throwaway data directory for driving the `taskboard` binary.
pub struct TestBoard {
    dir: TempDir,
}

impl TestBoard {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Command bound to this data directory, with logging silenced.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("taskboard").expect("taskboard binary");
        cmd.env("TASKBOARD_DATA_DIR", self.dir.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn login(&self) {
        self.cmd()
            .args(["login", "--username", "admin", "--password", "admin"])
            .assert()
            .success();
    }

    /// Fresh data directory with an active session.
    pub fn logged_in() -> Self {
        let board = Self::new();
        board.login();
        board
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join("taskboard.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Run with `--json`, require success and return the `data` payload.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("json output");
        assert_eq!(value["status"], "success");
        value["data"].clone()
    }

    /// Run with `--json`, require exit `code` and return the error envelope.
    pub fn json_error(&self, args: &[&str], code: i32) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .assert()
            .code(code)
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("json error output");
        assert_eq!(value["status"], "error");
        value["error"].clone()
    }

    /// Raw persisted value for `key` in the default namespace.
    pub fn read_key(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.dir.path().join("taskboard").join(format!("{key}.json"))).ok()
    }

    pub fn session_file(&self, key: &str) -> PathBuf {
        self.dir.path().join("session").join(format!("{key}.json"))
    }
}
