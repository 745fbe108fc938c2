//! CLI argument parsing using Clap.

use crate::delegation::RemoteConfiguration;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

/// Run the agent's built-in tools against a remote host over ssh
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)] // CLI flags are naturally boolean
#[command(name = "pi-ssh")]
#[command(version, about, long_about = None)]
#[command(after_help = "Examples:
  pi-ssh --ssh dev@box:/srv/app ls src
  pi-ssh --ssh dev@box grep TODO --glob '*.rs'
  pi-ssh --ssh dev@box:/srv/app --ssh-verify /srv/app/src status
  pi-ssh --ssh dev@box bash 'cargo test' --timeout 600
")]
pub struct Cli {
    // === Remote ===
    /// Remote target: user@host or user@host:/absolute/path
    #[arg(long, env = "PI_SSH", global = true)]
    pub ssh: Option<String>,

    /// Directory to check and list right after connecting
    #[arg(long, global = true)]
    pub ssh_verify: Option<String>,

    /// Print connection details and record per-operation routing
    #[arg(long, global = true)]
    pub ssh_debug: bool,

    /// Fall back to local execution if the remote cannot be reached
    #[arg(long, global = true)]
    pub ssh_optional: bool,

    /// Local working directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub cwd: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Tool subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the remote and print the connection status
    Status,

    /// Read a file
    Read {
        path: String,
        /// Line number to start reading from (1-indexed)
        #[arg(long)]
        offset: Option<i64>,
        /// Maximum number of lines to read
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Write content to a file
    Write { path: String, content: String },

    /// Replace exact, unique text in a file
    Edit {
        path: String,
        old_text: String,
        new_text: String,
    },

    /// Run a shell command in the working directory
    Bash {
        command: String,
        /// Timeout in seconds (default 120; 0 disables)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Search file contents
    Grep {
        pattern: String,
        path: Option<String>,
        #[arg(long)]
        glob: Option<String>,
        #[arg(short = 'i', long)]
        ignore_case: bool,
        #[arg(short = 'F', long)]
        literal: bool,
        #[arg(short = 'C', long)]
        context: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Find files by glob pattern
    Find {
        pattern: String,
        path: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List a directory
    Ls {
        path: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl Commands {
    /// Tool name and JSON input for a tool subcommand; `None` for `status`.
    pub fn tool_call(&self) -> Option<(&'static str, Value)> {
        let call = match self {
            Self::Status => return None,
            Self::Read {
                path,
                offset,
                limit,
            } => ("read", json!({ "path": path, "offset": offset, "limit": limit })),
            Self::Write { path, content } => ("write", json!({ "path": path, "content": content })),
            Self::Edit {
                path,
                old_text,
                new_text,
            } => (
                "edit",
                json!({ "path": path, "oldText": old_text, "newText": new_text }),
            ),
            Self::Bash { command, timeout } => {
                ("bash", json!({ "command": command, "timeout": timeout }))
            }
            Self::Grep {
                pattern,
                path,
                glob,
                ignore_case,
                literal,
                context,
                limit,
            } => (
                "grep",
                json!({
                    "pattern": pattern,
                    "path": path,
                    "glob": glob,
                    "ignoreCase": ignore_case,
                    "literal": literal,
                    "context": context,
                    "limit": limit,
                }),
            ),
            Self::Find {
                pattern,
                path,
                limit,
            } => (
                "find",
                json!({ "pattern": pattern, "path": path, "limit": limit }),
            ),
            Self::Ls { path, limit } => ("ls", json!({ "path": path, "limit": limit })),
        };
        Some(call)
    }
}

impl Cli {
    /// Layer the command-line flags over the settings-derived configuration.
    pub fn apply_overrides(&self, config: &mut RemoteConfiguration) {
        if let Some(target) = self.ssh.as_deref().filter(|t| !t.trim().is_empty()) {
            config.target = Some(target.to_string());
        }
        if let Some(verify) = &self.ssh_verify {
            config.verify = Some(verify.clone());
        }
        config.debug |= self.ssh_debug;
        config.optional |= self.ssh_optional;
    }
}
