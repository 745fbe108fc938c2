//! Configuration loading and management.
//!
//! Settings come from `~/.pi/agent/settings.json` (or `$PI_CODING_AGENT_DIR`)
//! merged with the project's `.pi/settings.json`; `PI_CONFIG_PATH` replaces
//! both with a single explicit file.

use crate::delegation::RemoteConfiguration;
use crate::error::{Error, Result};
use crate::remote::channel::{DEFAULT_CONNECT_TIMEOUT_SECS, ssh_options};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ssh: Option<SshSettings>,
}

/// The `"ssh"` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// `user@host` or `user@host:/abs/path`.
    pub target: Option<String>,
    pub verify: Option<String>,
    pub debug: Option<bool>,
    /// Fall back to local operations when the remote cannot be reached.
    pub optional: Option<bool>,
    /// Transport binary (default `ssh`).
    pub program: Option<String>,
    /// Replaces the default `-o BatchMode=yes -o ConnectTimeout=N` options.
    pub options: Option<Vec<String>>,
    #[serde(alias = "connectTimeout")]
    pub connect_timeout: Option<u64>,
}

impl Config {
    /// Load configuration from global and project settings.
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let config_path = std::env::var_os("PI_CONFIG_PATH").map(PathBuf::from);
        Self::load_with_roots(config_path.as_deref(), &Self::global_dir(), &cwd)
    }

    /// Get the global configuration directory.
    pub fn global_dir() -> PathBuf {
        global_dir_from_env(env_lookup)
    }

    /// Get the project configuration directory.
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".pi")
    }

    /// Load settings from a specific path. A missing or blank file is empty.
    fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse settings file {}: {e}",
                path.display()
            ))
        })
    }

    pub fn load_with_roots(
        config_path: Option<&Path>,
        global_dir: &Path,
        cwd: &Path,
    ) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_path(path);
        }

        let global = Self::load_from_path(&global_dir.join("settings.json"))?;
        let project = Self::load_from_path(&cwd.join(Self::project_dir()).join("settings.json"))?;
        Ok(Self::merge(global, project))
    }

    /// Merge two configurations, with `other` taking precedence.
    pub fn merge(base: Self, other: Self) -> Self {
        Self {
            ssh: merge_ssh(base.ssh, other.ssh),
        }
    }

    /// The remote configuration these settings describe.
    pub fn remote_configuration(&self) -> RemoteConfiguration {
        let ssh = self.ssh.clone().unwrap_or_default();
        let defaults = RemoteConfiguration::default();
        let options = ssh.options.unwrap_or_else(|| {
            ssh_options(ssh.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS))
        });
        RemoteConfiguration {
            target: ssh.target.filter(|t| !t.trim().is_empty()),
            verify: ssh.verify.filter(|v| !v.trim().is_empty()),
            debug: ssh.debug.unwrap_or(false),
            optional: ssh.optional.unwrap_or(false),
            program: ssh.program.unwrap_or(defaults.program),
            options,
        }
    }
}

fn merge_ssh(base: Option<SshSettings>, other: Option<SshSettings>) -> Option<SshSettings> {
    match (base, other) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(only),
        (Some(base), Some(other)) => Some(SshSettings {
            target: other.target.or(base.target),
            verify: other.verify.or(base.verify),
            debug: other.debug.or(base.debug),
            optional: other.optional.or(base.optional),
            program: other.program.or(base.program),
            options: other.options.or(base.options),
            connect_timeout: other.connect_timeout.or(base.connect_timeout),
        }),
    }
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn global_dir_from_env<F>(get_env: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    get_env("PI_CODING_AGENT_DIR").map_or_else(
        || {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pi")
                .join("agent")
        },
        PathBuf::from,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write_file(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(path, contents).expect("write file");
    }

    #[test]
    fn project_settings_override_global_per_field() {
        let temp = TempDir::new().expect("create tempdir");
        let cwd = temp.path().join("cwd");
        let global_dir = temp.path().join("global");
        write_file(
            &global_dir.join("settings.json"),
            r#"{ "ssh": { "target": "dev@box", "debug": true, "connectTimeout": 30 } }"#,
        );
        write_file(
            &cwd.join(".pi/settings.json"),
            r#"{ "ssh": { "target": "dev@box:/srv/app", "verify": "/srv/app/src" } }"#,
        );

        let config = Config::load_with_roots(None, &global_dir, &cwd).expect("load config");
        let ssh = config.ssh.clone().expect("ssh section");
        assert_eq!(ssh.target.as_deref(), Some("dev@box:/srv/app"));
        assert_eq!(ssh.verify.as_deref(), Some("/srv/app/src"));
        assert_eq!(ssh.debug, Some(true));
        assert_eq!(ssh.connect_timeout, Some(30));

        let remote = config.remote_configuration();
        assert_eq!(remote.target.as_deref(), Some("dev@box:/srv/app"));
        assert!(remote.debug);
        assert!(!remote.optional);
        assert_eq!(remote.program, "ssh");
        assert_eq!(remote.options, ssh_options(30));
    }

    #[test]
    fn explicit_config_path_replaces_both_files() {
        let temp = TempDir::new().expect("create tempdir");
        let cwd = temp.path().join("cwd");
        let global_dir = temp.path().join("global");
        write_file(
            &global_dir.join("settings.json"),
            r#"{ "ssh": { "target": "global@box" } }"#,
        );
        let explicit = temp.path().join("explicit.json");
        write_file(
            &explicit,
            r#"{ "ssh": { "program": "/usr/local/bin/ssh", "options": ["-F", "/dev/null"] } }"#,
        );

        let config =
            Config::load_with_roots(Some(&explicit), &global_dir, &cwd).expect("load config");
        let remote = config.remote_configuration();
        assert!(remote.target.is_none());
        assert_eq!(remote.program, "/usr/local/bin/ssh");
        assert_eq!(remote.options, vec!["-F".to_string(), "/dev/null".to_string()]);
    }

    #[test]
    fn missing_or_blank_files_load_as_defaults() {
        let temp = TempDir::new().expect("create tempdir");
        let global_dir = temp.path().join("global");
        write_file(&global_dir.join("settings.json"), "  \n");

        let config =
            Config::load_with_roots(None, &global_dir, temp.path()).expect("load config");
        assert!(config.ssh.is_none());
        let remote = config.remote_configuration();
        assert!(!remote.requested());
        assert_eq!(remote.options, ssh_options(DEFAULT_CONNECT_TIMEOUT_SECS));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let temp = TempDir::new().expect("create tempdir");
        let path = temp.path().join("settings.json");
        write_file(&path, "{ not json");

        let err = Config::load_with_roots(Some(&path), temp.path(), temp.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("Failed to parse settings file"));
    }

    #[test]
    fn blank_target_counts_as_unset() {
        let config: Config =
            serde_json::from_str(r#"{ "ssh": { "target": "  ", "optional": true } }"#).unwrap();
        let remote = config.remote_configuration();
        assert!(remote.target.is_none());
        assert!(remote.optional);
    }

    #[test]
    fn global_dir_honors_environment_override() {
        let env = HashMap::from([("PI_CODING_AGENT_DIR".to_string(), "env-root".to_string())]);
        assert_eq!(
            global_dir_from_env(|key| env.get(key).cloned()),
            PathBuf::from("env-root")
        );
        assert!(global_dir_from_env(|_| None).ends_with(".pi/agent"));
    }
}
