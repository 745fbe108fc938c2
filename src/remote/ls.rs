//! Directory listing.

use super::Workspace;
use super::command::ShellCommand;
use crate::error::Result;
use crate::truncate::{DEFAULT_LS_LIMIT, DEFAULT_MAX_BYTES, LimitOutcome, sort_case_insensitive};

/// List the immediate entries of `path` (default: the root).
///
/// Hidden entries are included and directories carry a trailing `/`.
pub async fn ls(ws: &Workspace, path: Option<&str>, limit: Option<usize>) -> Result<LimitOutcome> {
    let dir = ws.resolve(path);
    ws.require_directory(&dir).await?;

    let listing = ShellCommand::with_env("LC_ALL", "C", "ls")
        .args(["-A", "-p"])
        .arg(&dir);
    let raw = ws.channel.run(listing.as_str()).await?.stdout_lossy();

    Ok(shape_listing(&raw, limit))
}

pub(crate) fn shape_listing(raw: &str, limit: Option<usize>) -> LimitOutcome {
    let mut entries: Vec<String> = raw
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    sort_case_insensitive(&mut entries);

    let limit = limit.unwrap_or(DEFAULT_LS_LIMIT).max(1);
    let over_limit = entries.len() > limit;
    entries.truncate(limit);

    let content = if entries.is_empty() {
        "(empty directory)".to_string()
    } else {
        entries.join("\n")
    };

    let mut outcome = LimitOutcome::new(content);
    if over_limit {
        outcome.count_limit(
            "entryLimitReached",
            limit,
            format!("{limit} entries limit reached. Use limit={} for more", limit * 2),
        );
    }
    outcome.cap_bytes(DEFAULT_MAX_BYTES);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_case_insensitively() {
        let outcome = shape_listing("b.txt\nA.md\nsrc/\n.git/\n", None);
        assert_eq!(outcome.render(), ".git/\nA.md\nb.txt\nsrc/");
        assert!(outcome.details().is_none());
    }

    #[test]
    fn empty_directory_placeholder() {
        let outcome = shape_listing("", None);
        assert_eq!(outcome.render(), "(empty directory)");
        assert!(outcome.details().is_none());
    }

    #[test]
    fn exactly_at_limit_is_not_reported() {
        let outcome = shape_listing("a\nb\nc", Some(3));
        assert!(!outcome.limit_reached);
        assert_eq!(outcome.render(), "a\nb\nc");
    }

    #[test]
    fn over_limit_keeps_cap_and_suggests_double() {
        let outcome = shape_listing("d\nc\nb\na", Some(2));
        assert_eq!(
            outcome.render(),
            "a\nb\n\n[2 entries limit reached. Use limit=4 for more]"
        );
        assert_eq!(outcome.details().unwrap()["entryLimitReached"], 2);
    }
}
