//! Test harness for consistent setup/teardown.
//!
//! # Example
//!
//! ```ignore
//! #[test]
//! fn lists_remote_root() {
//!     let fixture = RemoteFixture::new("lists_remote_root");
//!     fixture.create_remote_file("src/main.rs", "fn main() {}");
//!     let ws = fixture.workspace();
//!     // ...
//! }
//! ```

#![allow(dead_code)]

use pi_ssh::delegation::{DelegationController, RemoteConfiguration};
use pi_ssh::remote::Workspace;
use pi_ssh::remote::channel::{CommandChannel, Transport};
use pi_ssh::remote::path::PathPair;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test writer (`RUST_LOG` to enable).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Whether ripgrep is installed; rg-backed tests skip otherwise.
pub fn rg_available() -> bool {
    Command::new("rg")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Whether `file(1)` is installed; MIME detection tests skip otherwise.
pub fn file_available() -> bool {
    Command::new("file")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Temp directory plus file helpers.
pub struct TestHarness {
    name: String,
    temp_dir: TempDir,
}

impl TestHarness {
    pub fn new(name: impl Into<String>) -> Self {
        init_tracing();
        let name = name.into();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        info!(test = %name, path = %temp_dir.path().display(), "Test harness created");
        Self { name, temp_dir }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn temp_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.temp_dir.path().join(path)
    }

    /// Create a file (and its parents); returns the full path.
    pub fn create_file(&self, name: impl AsRef<Path>, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, content).expect("Failed to create test file");
        path
    }

    pub fn create_dir(&self, name: impl AsRef<Path>) -> PathBuf {
        let path = self.temp_path(name);
        std::fs::create_dir_all(&path).expect("Failed to create directory");
        path
    }

    pub fn read_file(&self, name: impl AsRef<Path>) -> String {
        std::fs::read_to_string(self.temp_path(name)).expect("Failed to read test file")
    }

    pub fn file_exists(&self, name: impl AsRef<Path>) -> bool {
        self.temp_path(name).exists()
    }
}

/// Two sibling roots: `local/` stands for the agent's working directory and
/// `remote/` for the host's project root. Operations run through the local
/// shell with paths translated from one to the other.
pub struct RemoteFixture {
    pub harness: TestHarness,
    pub local_root: String,
    pub remote_root: String,
}

impl RemoteFixture {
    pub fn new(name: impl Into<String>) -> Self {
        let harness = TestHarness::new(name);
        let local = harness.create_dir("local");
        let remote = harness.create_dir("remote");
        Self {
            local_root: utf8(&local),
            remote_root: utf8(&remote),
            harness,
        }
    }

    /// Local-side absolute path for `rel`.
    pub fn local(&self, rel: &str) -> String {
        format!("{}/{rel}", self.local_root)
    }

    /// Remote-side absolute path for `rel`.
    pub fn remote(&self, rel: &str) -> String {
        format!("{}/{rel}", self.remote_root)
    }

    pub fn create_remote_file(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        self.harness.create_file(Path::new("remote").join(rel), content)
    }

    pub fn create_remote_dir(&self, rel: &str) -> PathBuf {
        self.harness.create_dir(Path::new("remote").join(rel))
    }

    pub fn read_remote(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.remote(rel)).expect("Failed to read remote file")
    }

    pub fn local_exists(&self, rel: &str) -> bool {
        Path::new(&self.local(rel)).exists()
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(
            CommandChannel::new(Transport::LocalShell),
            PathPair::new(self.local_root.clone(), self.remote_root.clone())
                .expect("absolute roots"),
        )
    }

    /// A configuration whose target names the remote root explicitly.
    pub fn config(&self) -> RemoteConfiguration {
        RemoteConfiguration {
            target: Some(format!("tester@fixture:{}", self.remote_root)),
            ..RemoteConfiguration::default()
        }
    }

    pub fn controller(&self, config: RemoteConfiguration) -> Arc<DelegationController> {
        Arc::new(
            DelegationController::new(self.local_root.clone(), config).expect("controller"),
        )
    }
}

/// Start a session over the local shell instead of ssh.
pub async fn connect_locally(
    controller: &DelegationController,
) -> Vec<pi_ssh::delegation::Notification> {
    controller
        .start_session_with(|_| CommandChannel::new(Transport::LocalShell))
        .await
}

fn utf8(path: &Path) -> String {
    path.to_str().expect("temp paths are UTF-8").to_string()
}
