//! Glob file search via `rg --files`.

use super::Workspace;
use super::command::ShellCommand;
use crate::error::Result;
use crate::truncate::{DEFAULT_FIND_LIMIT, DEFAULT_MAX_BYTES, LimitOutcome, sort_case_insensitive};

/// Literal result when nothing matches.
pub const NO_FILES_FOUND: &str = "No files found matching pattern";

/// Find files under `search_dir` (default: the root) matching `pattern`.
///
/// Paths are reported relative to the search directory.
pub async fn find(
    ws: &Workspace,
    pattern: &str,
    search_dir: Option<&str>,
    limit: Option<usize>,
) -> Result<LimitOutcome> {
    let dir = ws.resolve(search_dir);
    ws.require_directory(&dir).await?;
    ws.require_program("rg").await?;

    let raw = ws.channel.run(find_command(&dir, pattern).as_str()).await?.stdout_lossy();
    Ok(shape_results(&raw, limit))
}

pub(crate) fn find_command(dir: &str, pattern: &str) -> ShellCommand {
    ShellCommand::new("rg")
        .args(["--files", "--hidden", "-g"])
        .arg(pattern)
        .in_dir(dir)
        .remap_no_match()
        .login_shell()
}

pub(crate) fn shape_results(raw: &str, limit: Option<usize>) -> LimitOutcome {
    let mut entries: Vec<String> = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();
    if entries.is_empty() {
        return LimitOutcome::new(NO_FILES_FOUND);
    }
    sort_case_insensitive(&mut entries);

    let limit = limit.unwrap_or(DEFAULT_FIND_LIMIT).max(1);
    let limit_reached = entries.len() >= limit;
    entries.truncate(limit);

    let mut outcome = LimitOutcome::new(entries.join("\n"));
    if limit_reached {
        outcome.count_limit(
            "resultLimitReached",
            limit,
            format!(
                "{limit} results limit reached. Use limit={} for more, or refine pattern",
                limit * 2
            ),
        );
    }
    outcome.cap_bytes(DEFAULT_MAX_BYTES);
    outcome
}
