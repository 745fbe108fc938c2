//! Command-line construction for the remote shell.
//!
//! Every dynamic value that ends up in a command string passes through
//! [`quote`]. Fixed shell syntax and the caller's own bash command are the
//! only text left verbatim, the latter only through
//! [`ShellCommand::trusted_in_dir`].

use std::fmt;

/// Quote `arg` for a POSIX shell.
///
/// Words made only of characters that no shell treats specially are left
/// bare; everything else is wrapped in single quotes with embedded `'`
/// rendered as `'\''`.
pub fn quote(arg: &str) -> String {
    if !arg.is_empty() && arg.bytes().all(is_safe_byte) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

const fn is_safe_byte(b: u8) -> bool {
    matches!(
        b,
        b'a'..=b'z'
            | b'A'..=b'Z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'/'
            | b'='
            | b':'
            | b','
            | b'@'
            | b'+'
            | b'%'
    )
}

/// Marker closing the heredoc used for base64 file transfer.
pub const HEREDOC_MARKER: &str = "__PI_SSH_EOF__";

/// A shell command line assembled from quoted words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    line: String,
}

impl ShellCommand {
    /// Start a command with `program` (quoted like any other word).
    pub fn new(program: &str) -> Self {
        Self { line: quote(program) }
    }

    /// Start a command with `NAME=value` environment assignments.
    pub fn with_env(name: &str, value: &str, program: &str) -> Self {
        Self {
            line: format!("{name}={} {}", quote(value), quote(program)),
        }
    }

    /// Append one quoted argument.
    #[must_use]
    pub fn arg(mut self, arg: &str) -> Self {
        self.line.push(' ');
        self.line.push_str(&quote(arg));
        self
    }

    /// Append several quoted arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self = self.arg(arg.as_ref());
        }
        self
    }

    /// Append `arg` only when `condition` holds.
    #[must_use]
    pub fn arg_if(self, condition: bool, arg: &str) -> Self {
        if condition { self.arg(arg) } else { self }
    }

    /// Prefix with `cd <dir> &&`.
    #[must_use]
    pub fn in_dir(self, dir: &str) -> Self {
        Self {
            line: format!("cd {} && {}", quote(dir), self.line),
        }
    }

    /// Treat exit code 1 ("no matches" for rg) as success.
    #[must_use]
    pub fn remap_no_match(self) -> Self {
        Self {
            line: format!(
                "{}; code=$?; if [ $code -eq 1 ]; then exit 0; else exit $code; fi",
                self.line
            ),
        }
    }

    /// Wrap the whole line in `bash -lc '<line>'` so PATH matches an
    /// interactive login.
    #[must_use]
    pub fn login_shell(self) -> Self {
        Self {
            line: format!("bash -lc {}", quote(&self.line)),
        }
    }

    /// Build `cd <dir> && <command>` where `command` is trusted shell syntax.
    pub fn trusted_in_dir(dir: &str, command: &str) -> Self {
        Self {
            line: format!("cd {} && {command}", quote(dir)),
        }
    }

    /// Decode base64 `payload` into `path` through a quoted heredoc.
    pub fn base64_write(path: &str, payload: &str) -> Self {
        Self {
            line: format!(
                "base64 -d > {} <<'{HEREDOC_MARKER}'\n{payload}\n{HEREDOC_MARKER}",
                quote(path)
            ),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// `test <flag> <path>`, used for the boolean filesystem checks.
pub fn test_path(flag: &str, path: &str) -> ShellCommand {
    ShellCommand::new("test").arg(flag).arg(path)
}

/// `command -v <program>`.
pub fn command_exists(program: &str) -> ShellCommand {
    ShellCommand::new("command").arg("-v").arg(program)
}
