//! Error types for remote tool delegation.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the delegation layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (malformed tool input, bad roots)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Tool execution errors
    #[error("Tool error: {tool}: {message}")]
    Tool { tool: String, message: String },

    /// The transport ran but exited non-zero.
    #[error("SSH failed ({code}): {stderr}")]
    Transport { code: i32, stderr: String },

    /// The transport process could not be started.
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A required utility is missing on the host.
    #[error("{0} is not available on the remote host")]
    ToolUnavailable(String),

    /// Wall-clock budget exceeded.
    #[error("Command timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// User aborted operation
    #[error("Operation aborted")]
    Aborted,

    /// The remote target could not be verified at session start.
    #[error("SSH resolution failed: {0}")]
    Resolution(String),

    /// A remote was requested, but resolution failed or never ran.
    #[error("SSH mode was requested but is not available{}.", format_reason(.reason))]
    RemoteUnavailable { reason: Option<String> },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

#[allow(clippy::ref_option)] // thiserror hands format args over by reference
fn format_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a tool error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a transport failure from a raw exit status and stderr bytes.
    pub fn transport(code: Option<i32>, stderr: &[u8]) -> Self {
        Self::Transport {
            code: code.unwrap_or(-1),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }

    pub fn spawn(program: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error came from the command channel itself.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Spawn { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_unavailable_includes_reason() {
        let err = Error::RemoteUnavailable {
            reason: Some("SSH failed (255): connection refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "SSH mode was requested but is not available (SSH failed (255): connection refused)."
        );

        let bare = Error::RemoteUnavailable { reason: None };
        assert_eq!(
            bare.to_string(),
            "SSH mode was requested but is not available."
        );
    }

    #[test]
    fn transport_trims_stderr_and_defaults_code() {
        let err = Error::transport(None, b"  Permission denied (publickey).\n");
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "SSH failed (-1): Permission denied (publickey)."
        );
    }

    #[test]
    fn tool_unavailable_names_the_tool() {
        let err = Error::ToolUnavailable("rg".to_string());
        assert_eq!(err.to_string(), "rg is not available on the remote host");
        assert!(!err.is_transport());
    }
}
