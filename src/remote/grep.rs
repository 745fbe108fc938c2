//! Content search over `rg --json`, with match context rebuilt from the
//! matched files themselves.

use super::Workspace;
use super::channel::CommandChannel;
use super::command::ShellCommand;
use super::path::{basename, join_remote, parent_dir, relative_to};
use crate::error::{Error, Result};
use crate::truncate::{
    DEFAULT_GREP_LIMIT, DEFAULT_MAX_BYTES, GREP_MAX_LINE_LENGTH, LimitOutcome, truncate_line,
};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Literal result when nothing matches.
pub const NO_MATCHES_FOUND: &str = "No matches found";

/// Input parameters for a content search.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrepRequest {
    pub pattern: String,
    pub path: Option<String>,
    pub glob: Option<String>,
    pub ignore_case: Option<bool>,
    pub literal: Option<bool>,
    pub context: Option<usize>,
    pub limit: Option<usize>,
}

/// One `match` event reported by rg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub file_path: String,
    pub line_number: usize,
}

#[derive(Deserialize)]
struct RgEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<RgMatchData>,
}

#[derive(Deserialize)]
struct RgMatchData {
    path: Option<RgText>,
    line_number: Option<usize>,
}

#[derive(Deserialize)]
struct RgText {
    text: Option<String>,
}

/// Search `request.path` (default: the root) for `request.pattern`.
pub async fn grep(ws: &Workspace, request: &GrepRequest) -> Result<LimitOutcome> {
    let target = ws.resolve(request.path.as_deref());
    let is_directory = ws.is_dir(&target).await;
    if !is_directory && !ws.exists(&target).await {
        return Err(Error::PathNotFound(target));
    }
    ws.require_program("rg").await?;

    let raw = ws
        .channel
        .run(search_command(request, &target).as_str())
        .await?
        .stdout_lossy();

    let limit = request.limit.unwrap_or(DEFAULT_GREP_LIMIT).max(1);
    let (matches, limit_reached) = parse_matches(&raw, limit);
    debug!(
        search = %target,
        matches = matches.len(),
        limit_reached,
        "Parsed rg match events"
    );
    if matches.is_empty() {
        return Ok(LimitOutcome::new(NO_MATCHES_FOUND));
    }

    let base = if is_directory {
        target.as_str()
    } else {
        parent_dir(&target)
    };
    let context = request.context.unwrap_or(0);
    let mut cache = FileLineCache::default();
    let mut output_lines = Vec::new();
    let mut lines_truncated = false;

    for record in &matches {
        let absolute = join_remote(base, &record.file_path);
        let display = display_path(&absolute, &target, is_directory);
        let lines = cache.lines(&ws.channel, &absolute).await;
        lines_truncated |= format_match(&mut output_lines, &display, record.line_number, lines, context);
    }

    let mut outcome = LimitOutcome::new(output_lines.join("\n"));
    if limit_reached {
        outcome.count_limit(
            "matchLimitReached",
            limit,
            format!(
                "{limit} matches limit reached. Use limit={} for more, or refine pattern",
                limit * 2
            ),
        );
    }
    outcome.cap_bytes(DEFAULT_MAX_BYTES);
    if lines_truncated {
        outcome.lines_truncated(GREP_MAX_LINE_LENGTH);
    }
    Ok(outcome)
}

pub(crate) fn search_command(request: &GrepRequest, target: &str) -> ShellCommand {
    let mut cmd = ShellCommand::new("rg")
        .args(["--json", "--line-number", "--color=never", "--hidden"])
        .arg_if(request.ignore_case.unwrap_or(false), "--ignore-case")
        .arg_if(request.literal.unwrap_or(false), "--fixed-strings");
    if let Some(glob) = request.glob.as_deref().filter(|g| !g.is_empty()) {
        cmd = cmd.arg("--glob").arg(glob);
    }
    cmd.arg(&request.pattern)
        .arg(target)
        .remap_no_match()
        .login_shell()
}

/// Collect up to `limit` match records from rg's JSON event stream.
///
/// Scanning continues past the limit so the second value tells whether
/// matches were actually dropped. Non-match events and lines that do not
/// parse are skipped.
pub fn parse_matches(output: &str, limit: usize) -> (Vec<MatchRecord>, bool) {
    let mut matches = Vec::new();
    let mut limit_reached = false;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<RgEvent>(line) else {
            continue;
        };
        if event.kind != "match" {
            continue;
        }
        let Some(data) = event.data else {
            continue;
        };
        let (Some(file_path), Some(line_number)) =
            (data.path.and_then(|p| p.text), data.line_number)
        else {
            continue;
        };

        if matches.len() < limit {
            matches.push(MatchRecord {
                file_path,
                line_number,
            });
        } else {
            limit_reached = true;
        }
    }

    (matches, limit_reached)
}

fn display_path(absolute: &str, search_root: &str, is_directory: bool) -> String {
    if is_directory {
        if let Some(rel) = relative_to(absolute, search_root) {
            if !rel.starts_with("..") {
                return rel.to_string();
            }
        }
    }
    basename(absolute).to_string()
}

/// Append the formatted window for one match; returns whether any emitted
/// line was cut.
fn format_match(
    out: &mut Vec<String>,
    display: &str,
    line_number: usize,
    lines: &[String],
    context: usize,
) -> bool {
    if lines.is_empty() {
        out.push(format!("{display}:{line_number}: (unable to read file)"));
        return false;
    }

    let (start, end) = context_window(line_number, context, lines.len());
    let mut truncated = false;
    for current in start..=end {
        let text = current
            .checked_sub(1)
            .and_then(|idx| lines.get(idx))
            .map_or("", String::as_str);
        let line = truncate_line(text, GREP_MAX_LINE_LENGTH);
        truncated |= line.was_truncated;
        if current == line_number {
            out.push(format!("{display}:{current}: {}", line.text));
        } else {
            out.push(format!("{display}-{current}- {}", line.text));
        }
    }
    truncated
}

/// Inclusive 1-based line range `[max(1, n-r), min(total, n+r)]`, or just
/// `n` when no context was requested.
pub fn context_window(line_number: usize, context: usize, total_lines: usize) -> (usize, usize) {
    if context == 0 {
        return (line_number, line_number);
    }
    let start = line_number.saturating_sub(context).max(1);
    let end = line_number.saturating_add(context).min(total_lines);
    (start, end)
}

/// File contents fetched during a single search, split into lines.
///
/// A failed fetch is cached as an empty entry so it is attempted once.
#[derive(Debug, Default)]
pub struct FileLineCache {
    files: HashMap<String, Vec<String>>,
}

impl FileLineCache {
    pub async fn lines(&mut self, channel: &CommandChannel, path: &str) -> &[String] {
        if !self.files.contains_key(path) {
            let lines = fetch_lines(channel, path).await;
            self.files.insert(path.to_string(), lines);
        }
        self.files.get(path).map(Vec::as_slice).unwrap_or_default()
    }
}

async fn fetch_lines(channel: &CommandChannel, path: &str) -> Vec<String> {
    let cat = ShellCommand::new("cat").arg(path);
    match channel.run(cat.as_str()).await {
        Ok(result) => split_lines(&result.stdout_lossy()),
        Err(err) => {
            debug!(path, error = %err, "Could not fetch file for match context");
            Vec::new()
        }
    }
}

fn split_lines(content: &str) -> Vec<String> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    normalized.split('\n').map(str::to_string).collect()
}
