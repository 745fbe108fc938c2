//! Output limiting shared by every delegated tool.
//!
//! Three independent limits apply to tool output: a byte ceiling (UTF-8
//! safe), an entry/match count ceiling, and a per-line character ceiling.
//! Each limit that fires adds one notice; notices are rendered together in a
//! single bracketed suffix and mirrored as machine-readable `details`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Default maximum lines for truncation.
pub const DEFAULT_MAX_LINES: usize = 2000;

/// Default maximum bytes for truncation.
pub const DEFAULT_MAX_BYTES: usize = 50 * 1024; // 50KB

/// Maximum line length for grep results.
pub const GREP_MAX_LINE_LENGTH: usize = 500;

/// Default grep result limit.
pub const DEFAULT_GREP_LIMIT: usize = 100;

/// Default find result limit.
pub const DEFAULT_FIND_LIMIT: usize = 1000;

/// Default ls result limit.
pub const DEFAULT_LS_LIMIT: usize = 500;

/// Default timeout (in seconds) for bash tool execution.
pub const DEFAULT_BASH_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// Line/byte truncation
// ============================================================================

/// Result of truncation operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationResult {
    pub content: String,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_by: Option<TruncatedBy>,
    pub total_lines: usize,
    pub total_bytes: usize,
    pub output_lines: usize,
    pub output_bytes: usize,
    pub last_line_partial: bool,
    pub first_line_exceeds_limit: bool,
    pub max_lines: usize,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TruncatedBy {
    Lines,
    Bytes,
}

impl TruncationResult {
    fn untouched(content: &str, total_lines: usize, max_lines: usize, max_bytes: usize) -> Self {
        Self {
            content: content.to_string(),
            truncated: false,
            truncated_by: None,
            total_lines,
            total_bytes: content.len(),
            output_lines: total_lines,
            output_bytes: content.len(),
            last_line_partial: false,
            first_line_exceeds_limit: false,
            max_lines,
            max_bytes,
        }
    }
}

/// Truncate from the beginning (keep first N lines).
pub fn truncate_head(content: &str, max_lines: usize, max_bytes: usize) -> TruncationResult {
    let total_bytes = content.len();
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();

    if total_lines <= max_lines && total_bytes <= max_bytes {
        return TruncationResult::untouched(content, total_lines, max_lines, max_bytes);
    }

    // If the first line alone exceeds the byte limit, return empty content.
    let first_line_bytes = lines.first().map_or(0, |l| l.len());
    if first_line_bytes > max_bytes {
        return TruncationResult {
            content: String::new(),
            truncated: true,
            truncated_by: Some(TruncatedBy::Bytes),
            total_lines,
            total_bytes,
            output_lines: 0,
            output_bytes: 0,
            last_line_partial: false,
            first_line_exceeds_limit: true,
            max_lines,
            max_bytes,
        };
    }

    let mut output = String::new();
    let mut line_count = 0;
    let mut byte_count: usize = 0;
    let mut truncated_by = None;

    for (i, line) in lines.iter().enumerate() {
        if i >= max_lines {
            truncated_by = Some(TruncatedBy::Lines);
            break;
        }

        let line_bytes = line.len() + usize::from(i > 0); // +1 for newline
        if byte_count + line_bytes > max_bytes {
            truncated_by = Some(TruncatedBy::Bytes);
            break;
        }

        if i > 0 {
            output.push('\n');
        }
        output.push_str(line);
        line_count += 1;
        byte_count += line_bytes;
    }

    let output_bytes = output.len();
    TruncationResult {
        content: output,
        truncated: truncated_by.is_some(),
        truncated_by,
        total_lines,
        total_bytes,
        output_lines: line_count,
        output_bytes,
        last_line_partial: false,
        first_line_exceeds_limit: false,
        max_lines,
        max_bytes,
    }
}

/// Truncate from the end (keep last N lines).
pub fn truncate_tail(content: &str, max_lines: usize, max_bytes: usize) -> TruncationResult {
    let total_bytes = content.len();
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();

    if total_lines <= max_lines && total_bytes <= max_bytes {
        return TruncationResult::untouched(content, total_lines, max_lines, max_bytes);
    }

    let mut output_lines = Vec::new();
    let mut byte_count: usize = 0;
    let mut truncated_by = None;
    let mut last_line_partial = false;

    for line in lines.iter().rev() {
        let line_bytes = line.len() + usize::from(!output_lines.is_empty());

        if output_lines.len() >= max_lines {
            truncated_by = Some(TruncatedBy::Lines);
            break;
        }

        if byte_count + line_bytes > max_bytes {
            let remaining = max_bytes.saturating_sub(byte_count);
            if remaining > 0 && output_lines.is_empty() {
                output_lines.push(truncate_string_to_bytes_from_end(line, max_bytes));
                last_line_partial = true;
            }
            truncated_by = Some(TruncatedBy::Bytes);
            break;
        }

        output_lines.push((*line).to_string());
        byte_count += line_bytes;
    }

    output_lines.reverse();
    let output = output_lines.join("\n");
    let output_bytes = output.len();

    TruncationResult {
        content: output,
        truncated: truncated_by.is_some(),
        truncated_by,
        total_lines,
        total_bytes,
        output_lines: output_lines.len(),
        output_bytes,
        last_line_partial,
        first_line_exceeds_limit: false,
        max_lines,
        max_bytes,
    }
}

/// Truncate a string to fit within a byte limit (from the end), preserving UTF-8 boundaries.
fn truncate_string_to_bytes_from_end(s: &str, max_bytes: usize) -> String {
    let bytes = s.as_bytes();
    if bytes.len() <= max_bytes {
        return s.to_string();
    }

    let mut start = bytes.len().saturating_sub(max_bytes);
    while start < bytes.len() && is_continuation_byte(bytes[start]) {
        start += 1;
    }

    s.get(start..).map(str::to_string).unwrap_or_default()
}

/// Keep at most `max_bytes` bytes of `s` without splitting a UTF-8 sequence.
///
/// Returns the kept prefix and whether anything was cut.
pub fn truncate_to_bytes(s: &str, max_bytes: usize) -> (String, bool) {
    let bytes = s.as_bytes();
    if bytes.len() <= max_bytes {
        return (s.to_string(), false);
    }

    let mut end = max_bytes;
    while end > 0 && is_continuation_byte(bytes[end]) {
        end -= 1;
    }

    (s.get(..end).map(str::to_string).unwrap_or_default(), true)
}

const fn is_continuation_byte(byte: u8) -> bool {
    (byte & 0b1100_0000) == 0b1000_0000
}

/// Result of truncating a single output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateLineResult {
    pub text: String,
    pub was_truncated: bool,
}

/// Truncate a single line to max characters, adding a marker suffix.
pub fn truncate_line(line: &str, max_chars: usize) -> TruncateLineResult {
    let mut chars = line.chars();
    let prefix: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_none() {
        return TruncateLineResult {
            text: line.to_string(),
            was_truncated: false,
        };
    }

    TruncateLineResult {
        text: format!("{prefix}... [truncated]"),
        was_truncated: true,
    }
}

/// Format a byte count into a human-readable string with appropriate unit suffix.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;

    if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}

/// Sort listing entries alphabetically, ignoring case.
pub fn sort_case_insensitive(entries: &mut [String]) {
    entries.sort_by_key(|entry| entry.to_lowercase());
}

// ============================================================================
// Limit envelope
// ============================================================================

/// The common envelope every read-style operation builds before returning.
#[derive(Debug, Clone, Default)]
pub struct LimitOutcome {
    pub content: String,
    pub limit_reached: bool,
    pub truncated_bytes: bool,
    pub notices: Vec<String>,
    details: Map<String, Value>,
}

impl LimitOutcome {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Record that a count ceiling of `limit` was hit.
    ///
    /// `details_key` is one of `entryLimitReached`, `resultLimitReached`,
    /// `matchLimitReached`.
    pub fn count_limit(&mut self, details_key: &str, limit: usize, notice: String) {
        self.limit_reached = true;
        self.notices.push(notice);
        self.details
            .insert(details_key.to_string(), Value::from(limit));
    }

    /// Apply the byte ceiling to the content gathered so far.
    pub fn cap_bytes(&mut self, max_bytes: usize) {
        let (kept, truncated) = truncate_to_bytes(&self.content, max_bytes);
        if !truncated {
            return;
        }
        self.content = kept;
        self.truncated_bytes = true;
        self.notices.push(byte_limit_notice(max_bytes));
        self.details.insert(
            "truncation".to_string(),
            serde_json::json!({ "truncated": true }),
        );
    }

    /// Record, once, that at least one line was cut to `max_chars`.
    pub fn lines_truncated(&mut self, max_chars: usize) {
        self.notices.push(format!(
            "Some lines truncated to {max_chars} chars. Use read tool to see full lines"
        ));
        self.details
            .insert("linesTruncated".to_string(), Value::Bool(true));
    }

    /// Machine-readable flags, present only when some limit fired.
    pub fn details(&self) -> Option<Value> {
        if self.details.is_empty() {
            None
        } else {
            Some(Value::Object(self.details.clone()))
        }
    }

    /// Content followed by the bracketed notice suffix, if any.
    pub fn render(&self) -> String {
        let mut output = self.content.clone();
        if !self.notices.is_empty() {
            let _ = write!(output, "\n\n[{}]", self.notices.join(". "));
        }
        output
    }
}

fn byte_limit_notice(max_bytes: usize) -> String {
    if max_bytes >= 1024 && max_bytes % 1024 == 0 {
        format!("{}KB limit reached", max_bytes / 1024)
    } else {
        format!("{} limit reached", format_size(max_bytes))
    }
}

// ============================================================================
// Tests
// ============================================================================
