//! Error hints: mapping from error variants to user-facing remediation suggestions.
//!
//! Each error variant maps to a one-line summary and zero to two actionable
//! hints. Hints must stay stable for testability and never suggest
//! destructive actions.

use crate::error::Error;
use std::fmt::Write as _;

/// A remediation hint for an error.
#[derive(Debug, Clone)]
pub struct ErrorHint {
    /// Brief 1-line summary of the error category.
    pub summary: &'static str,
    /// Actionable hints for the user (0-2 items).
    pub hints: &'static [&'static str],
}

/// Get remediation hints for an error variant.
pub fn hints_for_error(error: &Error) -> ErrorHint {
    match error {
        Error::Config(msg) => config_hints(msg),
        Error::Validation(_) => ErrorHint {
            summary: "Invalid input",
            hints: &["Check the arguments against the tool's parameters"],
        },
        Error::Tool { tool, message } => tool_hints(tool, message),
        Error::Transport { code, stderr } => transport_hints(*code, stderr),
        Error::Spawn { .. } => ErrorHint {
            summary: "Could not start the remote shell",
            hints: &[
                "Install an ssh client and make sure it is on PATH",
                "Or point settings.json \"ssh.program\" at the client binary",
            ],
        },
        Error::PathNotFound(_) => ErrorHint {
            summary: "Path not found",
            hints: &["Use 'ls' or 'find' to locate the path"],
        },
        Error::NotADirectory(_) => ErrorHint {
            summary: "Expected a directory",
            hints: &["Pass a directory path, or use 'read' for files"],
        },
        Error::ToolUnavailable(program) if program == "rg" => ErrorHint {
            summary: "ripgrep is missing on the host",
            hints: &["Install ripgrep (rg) on the host and make sure a login shell finds it"],
        },
        Error::ToolUnavailable(_) => ErrorHint {
            summary: "A required utility is missing on the host",
            hints: &["Install it on the host and make sure a login shell finds it"],
        },
        Error::Timeout { .. } => ErrorHint {
            summary: "Command timed out",
            hints: &["Pass a larger timeout, or timeout 0 to disable it"],
        },
        Error::Aborted => ErrorHint {
            summary: "Operation aborted",
            hints: &[],
        },
        Error::Resolution(_) | Error::RemoteUnavailable { .. } => ErrorHint {
            summary: "SSH mode is not available",
            hints: &[
                "Check that `ssh <host> true` works without a password prompt",
                "Check that the remote directory exists, or pass --ssh-optional to fall back to local",
            ],
        },
        Error::Io(_) => ErrorHint {
            summary: "I/O error",
            hints: &["Check file permissions and available disk space"],
        },
        Error::Json(_) => ErrorHint {
            summary: "Invalid JSON",
            hints: &["Check the JSON syntax of the input or settings file"],
        },
    }
}

fn config_hints(msg: &str) -> ErrorHint {
    if msg.contains("settings") {
        return ErrorHint {
            summary: "Invalid configuration file",
            hints: &[
                "Check that ~/.pi/agent/settings.json and .pi/settings.json are valid JSON",
                "PI_CONFIG_PATH overrides both files when set",
            ],
        };
    }
    ErrorHint {
        summary: "Configuration error",
        hints: &["Check the \"ssh\" section of settings.json"],
    }
}

fn tool_hints(tool: &str, message: &str) -> ErrorHint {
    match tool {
        "read" if message.contains("not found") => ErrorHint {
            summary: "File not found",
            hints: &[
                "Verify the file path is correct",
                "Use 'ls' or 'find' to locate the file",
            ],
        },
        "edit" if message.contains("Could not find") => ErrorHint {
            summary: "Text to replace not found in file",
            hints: &[
                "Verify the old text exactly matches content in the file",
                "Use 'read' to see the current file content",
            ],
        },
        "edit" if message.contains("occurrences") => ErrorHint {
            summary: "Multiple matches found for replacement",
            hints: &["Provide more context in the old text to make it unique"],
        },
        "bash" if message.contains("timed out") => ErrorHint {
            summary: "Command timed out",
            hints: &["Pass a larger timeout, or timeout 0 to disable it"],
        },
        "bash" => ErrorHint {
            summary: "Command failed",
            hints: &[],
        },
        _ => ErrorHint {
            summary: "Tool execution failed",
            hints: &[],
        },
    }
}

fn transport_hints(code: i32, stderr: &str) -> ErrorHint {
    if code == 255 || stderr.contains("Permission denied") || stderr.contains("Could not resolve") {
        return ErrorHint {
            summary: "SSH connection failed",
            hints: &[
                "Check that `ssh <host> true` works without a password prompt",
                "BatchMode is on, so keys must be loaded in an agent or unencrypted",
            ],
        };
    }
    ErrorHint {
        summary: "Remote command failed",
        hints: &[],
    }
}

/// Format an error with its hints for display.
pub fn format_error_with_hints(error: &Error) -> String {
    let hint = hints_for_error(error);
    let mut output = String::new();

    let _ = writeln!(&mut output, "Error: {error}");

    if !error.to_string().contains(hint.summary) {
        output.push('\n');
        output.push_str(hint.summary);
        output.push('\n');
    }

    if !hint.hints.is_empty() {
        output.push_str("\nSuggestions:\n");
        for &h in hint.hints {
            let _ = writeln!(&mut output, "  • {h}");
        }
    }

    output
}
