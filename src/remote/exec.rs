//! Shell command execution in a translated working directory.

use super::Workspace;
use super::channel::{Clock, SystemClock};
use super::command::ShellCommand;
use crate::abort::AbortSignal;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Streaming sink for combined stdout/stderr.
pub type DataSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Options for [`exec`].
#[derive(Clone)]
pub struct ExecOptions {
    pub on_data: Option<DataSink>,
    pub signal: Option<AbortSignal>,
    pub timeout_secs: Option<u64>,
    pub clock: Arc<dyn Clock>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            on_data: None,
            signal: None,
            timeout_secs: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOptions")
            .field("on_data", &self.on_data.is_some())
            .field("signal", &self.signal)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

/// A finished command. A non-zero exit code is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Run `command` (trusted shell syntax) in the working directory that
/// corresponds to `local_cwd`.
pub async fn exec(
    ws: &Workspace,
    command: &str,
    local_cwd: &str,
    options: &ExecOptions,
) -> Result<ExecOutcome> {
    let cwd = ws.paths.to_remote_working_dir(local_cwd);
    let line = ShellCommand::trusted_in_dir(&cwd, command);

    let discard = |_: &[u8]| {};
    let sink: &(dyn Fn(&[u8]) + Send + Sync) = options.on_data.as_deref().unwrap_or(&discard);

    let exit_code = ws
        .channel
        .run_streaming(
            line.as_str(),
            sink,
            options.signal.as_ref(),
            options.timeout_secs,
            options.clock.as_ref(),
        )
        .await?;
    Ok(ExecOutcome { exit_code })
}
