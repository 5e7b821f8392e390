//! Isolated workspace with stand-in engine binaries for CLI tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const LOG_ENV: &str = "NEBULA_FAKE_LOG";

pub struct FakeWorkspace {
    dir: TempDir,
}

impl FakeWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("tmp")).expect("temp root");
        fs::create_dir(dir.path().join("home")).expect("home");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn log_path(&self) -> PathBuf {
        self.path().join("engine.log")
    }

    /// Lines appended to the log by fake engines.
    pub fn log(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .map(|contents| contents.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Writes an executable shell script named `name`.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        path
    }

    /// A `nebula` command isolated from the caller's config and temp dirs.
    pub fn command(&self) -> Command {
        let home = self.path().join("home");
        let mut cmd = cargo_bin_cmd!("nebula");
        cmd.current_dir(self.path())
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env("TMPDIR", self.path().join("tmp"))
            .env(LOG_ENV, self.log_path())
            .env("NEBULA_READINESS_DELAY_SECS", "0")
            .env_remove("NEBULA_CONFIG_PATH")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Entries left behind in the temporary root.
    pub fn temp_leftovers(&self) -> usize {
        fs::read_dir(self.path().join("tmp"))
            .map(Iterator::count)
            .unwrap_or_default()
    }
}
