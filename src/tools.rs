//! Built-in tool implementations.
//!
//! Seven tools: read, bash, edit, write, grep, find, ls. Every call asks the
//! [`DelegationController`] for the [`Operations`] to use right now, so the
//! same tool runs against the remote host or the local machine.

use crate::abort::AbortSignal;
use crate::delegation::{DelegationController, Operations};
use crate::error::{Error, Result};
use crate::model::{ContentBlock, ImageContent, TextContent};
use crate::remote::exec::{DataSink, ExecOptions, ExecOutcome};
use crate::remote::grep::GrepRequest;
use crate::remote::path::parent_dir;
use crate::truncate::{
    DEFAULT_BASH_TIMEOUT_SECS, DEFAULT_MAX_BYTES, DEFAULT_MAX_LINES, LimitOutcome, TruncatedBy,
    TruncationResult, format_size, truncate_head, truncate_tail,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// Tool Trait
// ============================================================================

/// A tool that can be executed by the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    fn name(&self) -> &str;

    /// Get the tool label (display name).
    fn label(&self) -> &str;

    /// Get the tool description.
    fn description(&self) -> &str;

    /// Get the tool parameters as JSON Schema.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool.
    ///
    /// `on_update` receives partial output while a long-running `bash`
    /// command is still producing it.
    async fn execute(
        &self,
        tool_call_id: &str,
        input: serde_json::Value,
        on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput>;
}

/// Tool execution output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde requires &T
const fn is_false(value: &bool) -> bool {
    !*value
}

impl ToolOutput {
    fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text(TextContent::new(text))],
            details: None,
            is_error: false,
        }
    }

    /// Concatenated text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<LimitOutcome> for ToolOutput {
    fn from(outcome: LimitOutcome) -> Self {
        Self {
            content: vec![ContentBlock::Text(TextContent::new(outcome.render()))],
            details: outcome.details(),
            is_error: false,
        }
    }
}

/// Incremental update during tool execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUpdate {
    pub content: Vec<ContentBlock>,
    pub details: Option<serde_json::Value>,
}

/// Pick the operations for this call and record where it went.
fn route(
    controller: &DelegationController,
    op: &str,
    detail: impl FnOnce(&dyn Operations) -> String,
) -> Result<Arc<dyn Operations>> {
    let ops = controller.operations()?;
    controller.record_route(ops.kind(), op, &detail(ops.as_ref()));
    Ok(ops)
}

fn parse_input<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| Error::validation(e.to_string()))
}

// ============================================================================
// Tool Registry
// ============================================================================

/// Names of every built-in tool, in registration order.
pub const BUILTIN_TOOLS: [&str; 7] = ["read", "bash", "edit", "write", "grep", "find", "ls"];

/// Registry of enabled tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a registry with the named tools, all routed through `controller`.
    pub fn new(enabled: &[&str], controller: &Arc<DelegationController>) -> Self {
        let mut tools: Vec<Box<dyn Tool>> = Vec::new();
        for name in enabled {
            let controller = Arc::clone(controller);
            match *name {
                "read" => tools.push(Box::new(ReadTool::new(controller))),
                "bash" => tools.push(Box::new(BashTool::new(controller))),
                "edit" => tools.push(Box::new(EditTool::new(controller))),
                "write" => tools.push(Box::new(WriteTool::new(controller))),
                "grep" => tools.push(Box::new(GrepTool::new(controller))),
                "find" => tools.push(Box::new(FindTool::new(controller))),
                "ls" => tools.push(Box::new(LsTool::new(controller))),
                other => warn!(tool = other, "Ignoring unknown tool"),
            }
        }
        Self { tools }
    }

    /// Get all tools.
    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(std::convert::AsRef::as_ref)
    }
}

// ============================================================================
// Read Tool
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadInput {
    path: String,
    offset: Option<i64>,
    limit: Option<i64>,
}

pub struct ReadTool {
    controller: Arc<DelegationController>,
}

impl ReadTool {
    pub const fn new(controller: Arc<DelegationController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }
    fn label(&self) -> &str {
        "read"
    }
    fn description(&self) -> &str {
        "Read the contents of a file. Supports text files and images (jpg, png, gif, webp). Images are sent as attachments. For text files, output is truncated to 2000 lines or 50KB (whichever is hit first). Use offset/limit for large files. When you need the full file, continue with offset until complete."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read (relative or absolute)"
                },
                "offset": {
                    "type": "number",
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "number",
                    "description": "Maximum number of lines to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        input: serde_json::Value,
        _on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput> {
        let input: ReadInput = parse_input(input)?;
        let ops = route(&self.controller, "read", |ops| {
            ops.resolve_path(Some(&input.path))
        })?;

        ops.access(&input.path)
            .await
            .map_err(|e| Error::tool("read", e.to_string()))?;

        if let Some(mime_type) = ops.detect_mime_type(&input.path).await {
            let bytes = ops
                .read_file(&input.path)
                .await
                .map_err(|e| Error::tool("read", e.to_string()))?;
            let data = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes);
            return Ok(ToolOutput {
                content: vec![
                    ContentBlock::Text(TextContent::new(format!("Read image file [{mime_type}]"))),
                    ContentBlock::Image(ImageContent {
                        data,
                        mime_type: mime_type.to_string(),
                    }),
                ],
                details: None,
                is_error: false,
            });
        }

        let bytes = ops
            .read_file(&input.path)
            .await
            .map_err(|e| Error::tool("read", e.to_string()))?;
        let text = String::from_utf8_lossy(&bytes);
        if text.is_empty() {
            return Ok(ToolOutput::text(""));
        }
        render_text_file(&text, &input)
    }
}

/// Number, window and truncate text file contents.
fn render_text_file(text: &str, input: &ReadInput) -> Result<ToolOutput> {
    // A trailing newline yields a final empty line.
    let all_lines: Vec<&str> = text.split('\n').collect();
    let total_file_lines = all_lines.len();

    let start_line: usize = match input.offset {
        Some(n) if n > 0 => usize::try_from(n - 1).unwrap_or(usize::MAX),
        _ => 0,
    };
    let start_line_display = start_line.saturating_add(1);

    if start_line >= total_file_lines {
        return Err(Error::tool(
            "read",
            format!(
                "Offset {} is beyond end of file ({total_file_lines} lines total)",
                input.offset.unwrap_or(0)
            ),
        ));
    }

    let (end_line, user_limited_lines) = input.limit.map_or((total_file_lines, None), |limit| {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let end = start_line.saturating_add(limit).min(total_file_lines);
        (end, Some(end - start_line))
    });

    let line_num_width = end_line.to_string().len().max(5);
    let selected = all_lines[start_line..end_line]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line_num = start_line + i + 1;
            let line = line.strip_suffix('\r').unwrap_or(line);
            format!("{line_num:>line_num_width$}→{line}")
        })
        .collect::<Vec<_>>()
        .join("\n");

    let truncation = truncate_head(&selected, DEFAULT_MAX_LINES, DEFAULT_MAX_BYTES);
    let mut output = truncation.content.clone();
    let mut details = None;

    if truncation.first_line_exceeds_limit {
        let first_line = all_lines[start_line];
        let first_line = first_line.strip_suffix('\r').unwrap_or(first_line);
        output = format!(
            "[Line {start_line_display} is {}, exceeds {} limit. Use bash: sed -n '{start_line_display}p' {} | head -c {DEFAULT_MAX_BYTES}]",
            format_size(first_line.len()),
            format_size(DEFAULT_MAX_BYTES),
            input.path
        );
        details = Some(serde_json::json!({ "truncation": truncation }));
    } else if truncation.truncated {
        let end_line_display = start_line_display
            .saturating_add(truncation.output_lines)
            .saturating_sub(1);
        let next_offset = end_line_display + 1;
        if truncation.truncated_by == Some(TruncatedBy::Lines) {
            let _ = write!(
                output,
                "\n\n[Showing lines {start_line_display}-{end_line_display} of {total_file_lines}. Use offset={next_offset} to continue.]"
            );
        } else {
            let _ = write!(
                output,
                "\n\n[Showing lines {start_line_display}-{end_line_display} of {total_file_lines} ({} limit). Use offset={next_offset} to continue.]",
                format_size(DEFAULT_MAX_BYTES)
            );
        }
        details = Some(serde_json::json!({ "truncation": truncation }));
    } else if let Some(shown) = user_limited_lines {
        let consumed = start_line + shown;
        if consumed < total_file_lines {
            let _ = write!(
                output,
                "\n\n[{} more lines in file. Use offset={} to continue.]",
                total_file_lines - consumed,
                consumed + 1
            );
        }
    }

    Ok(ToolOutput {
        content: vec![ContentBlock::Text(TextContent::new(output))],
        details,
        is_error: false,
    })
}

// ============================================================================
// Bash Tool
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BashInput {
    command: String,
    timeout: Option<u64>,
}

pub struct BashTool {
    controller: Arc<DelegationController>,
    signal: Option<AbortSignal>,
}

impl BashTool {
    pub const fn new(controller: Arc<DelegationController>) -> Self {
        Self {
            controller,
            signal: None,
        }
    }

    /// Cancel running commands when `signal` fires.
    #[must_use]
    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Rolling output window plus an optional spill file holding everything.
///
/// Chunks arrive through a synchronous sink, so the spilled bytes are kept
/// in memory and written out once the command settles.
struct BashOutputState {
    total_bytes: usize,
    temp_file_path: Option<PathBuf>,
    spill: Option<Vec<u8>>,
    chunks: VecDeque<Vec<u8>>,
    chunks_bytes: usize,
    max_chunks_bytes: usize,
}

impl BashOutputState {
    const fn new(max_chunks_bytes: usize) -> Self {
        Self {
            total_bytes: 0,
            temp_file_path: None,
            spill: None,
            chunks: VecDeque::new(),
            chunks_bytes: 0,
            max_chunks_bytes,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.total_bytes = self.total_bytes.saturating_add(chunk.len());

        if self.total_bytes > DEFAULT_MAX_BYTES && self.spill.is_none() {
            self.start_spill();
        }
        if let Some(spill) = self.spill.as_mut() {
            spill.extend_from_slice(chunk);
        }

        self.chunks.push_back(chunk.to_vec());
        self.chunks_bytes = self.chunks_bytes.saturating_add(chunk.len());
        while self.chunks_bytes > self.max_chunks_bytes && self.chunks.len() > 1 {
            if let Some(front) = self.chunks.pop_front() {
                self.chunks_bytes = self.chunks_bytes.saturating_sub(front.len());
            }
        }
    }

    /// Reserve the spill path; the spill starts with everything buffered so far.
    fn start_spill(&mut self) {
        let id = Uuid::new_v4().simple().to_string();
        self.temp_file_path = Some(std::env::temp_dir().join(format!("pi-bash-{}.log", &id[..16])));
        let mut spill = Vec::with_capacity(self.chunks_bytes);
        for existing in &self.chunks {
            spill.extend_from_slice(existing);
        }
        self.spill = Some(spill);
    }

    /// Hand over the spill path and its bytes, if output overflowed.
    fn take_spill(&mut self) -> Option<(PathBuf, Vec<u8>)> {
        let bytes = self.spill.take()?;
        self.temp_file_path.clone().map(|path| (path, bytes))
    }

    fn text(&self) -> String {
        let mut out = Vec::with_capacity(self.chunks_bytes);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn full_output_path(&self) -> Option<String> {
        self.temp_file_path
            .as_ref()
            .map(|path| path.display().to_string())
    }

    fn update(&self) -> ToolUpdate {
        let truncation = truncate_tail(&self.text(), DEFAULT_MAX_LINES, DEFAULT_MAX_BYTES);
        let mut details = serde_json::Map::new();
        if truncation.truncated {
            details.insert(
                "truncation".to_string(),
                serde_json::to_value(&truncation).unwrap_or_default(),
            );
        }
        if let Some(path) = self.full_output_path() {
            details.insert("fullOutputPath".to_string(), serde_json::Value::String(path));
        }
        ToolUpdate {
            content: vec![ContentBlock::Text(TextContent::new(truncation.content))],
            details: (!details.is_empty()).then_some(serde_json::Value::Object(details)),
        }
    }

    /// Tail-truncated text with its notice, and the truncation record.
    fn finish(&self) -> (String, Option<TruncationResult>) {
        let full_output = self.text();
        let mut truncation = truncate_tail(&full_output, DEFAULT_MAX_LINES, DEFAULT_MAX_BYTES);
        if self.total_bytes > self.chunks_bytes {
            truncation.truncated = true;
            truncation.truncated_by = Some(TruncatedBy::Bytes);
            truncation.total_bytes = self.total_bytes;
        }

        let mut output = if truncation.content.is_empty() {
            "(no output)".to_string()
        } else {
            truncation.content.clone()
        };
        if !truncation.truncated {
            return (output, None);
        }

        let display_path = self.full_output_path().unwrap_or_else(|| "undefined".to_string());
        let start_line = truncation.total_lines - truncation.output_lines + 1;
        let end_line = truncation.total_lines;
        if truncation.last_line_partial {
            let last_line = full_output.rsplit('\n').next().unwrap_or("");
            let _ = write!(
                output,
                "\n\n[Showing last {} of line {end_line} (line is {}). Full output: {display_path}]",
                format_size(truncation.output_bytes),
                format_size(last_line.len())
            );
        } else if truncation.truncated_by == Some(TruncatedBy::Lines) {
            let _ = write!(
                output,
                "\n\n[Showing lines {start_line}-{end_line} of {}. Full output: {display_path}]",
                truncation.total_lines
            );
        } else {
            let _ = write!(
                output,
                "\n\n[Showing lines {start_line}-{end_line} of {} ({} limit). Full output: {display_path}]",
                truncation.total_lines,
                format_size(DEFAULT_MAX_BYTES)
            );
        }
        (output, Some(truncation))
    }
}

async fn save_full_output(path: &Path, bytes: &[u8]) -> Result<()> {
    asupersync::fs::write(path, bytes)
        .await
        .map_err(|e| Error::tool("bash", format!("Failed to save full output: {e}")))
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }
    fn label(&self) -> &str {
        "bash"
    }
    fn description(&self) -> &str {
        "Execute a bash command in the current working directory. Returns stdout and stderr. Output is truncated to last 2000 lines or 50KB (whichever is hit first). If truncated, full output is saved to a temp file. `timeout` defaults to 120 seconds; set `timeout: 0` to disable."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Bash command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (default 120; set 0 to disable)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        input: serde_json::Value,
        on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput> {
        let input: BashInput = parse_input(input)?;
        let ops = route(&self.controller, "bash", |_| input.command.clone())?;

        let timeout_secs = match input.timeout {
            None => Some(DEFAULT_BASH_TIMEOUT_SECS),
            Some(0) => None,
            Some(secs) => Some(secs),
        };

        let state = Arc::new(Mutex::new(BashOutputState::new(
            DEFAULT_MAX_BYTES.saturating_mul(2),
        )));
        let sink_state = Arc::clone(&state);
        let sink: DataSink = Arc::new(move |chunk: &[u8]| {
            let mut state = sink_state.lock().unwrap_or_else(PoisonError::into_inner);
            state.push(chunk);
            if let Some(callback) = on_update.as_deref() {
                callback(state.update());
            }
        });
        let options = ExecOptions {
            on_data: Some(sink),
            signal: self.signal.clone(),
            timeout_secs,
            ..ExecOptions::default()
        };

        let outcome = ops
            .exec(&input.command, self.controller.local_cwd(), &options)
            .await;
        drop(options);

        let (mut output, truncation, full_output_path, spill) = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let (output, truncation) = state.finish();
            (output, truncation, state.full_output_path(), state.take_spill())
        };
        if let Some((path, bytes)) = spill {
            save_full_output(&path, &bytes).await?;
        }

        match outcome {
            Ok(ExecOutcome {
                exit_code: Some(0),
            }) => {}
            Ok(ExecOutcome {
                exit_code: Some(code),
            }) => {
                let _ = write!(output, "\n\nCommand exited with code {code}");
                return Err(Error::tool("bash", output));
            }
            Ok(ExecOutcome { exit_code: None }) => {
                output.push_str("\n\nCommand terminated by signal");
                return Err(Error::tool("bash", output));
            }
            Err(Error::Timeout { secs }) => {
                let _ = write!(output, "\n\nCommand timed out after {secs} seconds");
                return Err(Error::tool("bash", output));
            }
            Err(Error::Aborted) => {
                output.push_str("\n\nCommand aborted");
                return Err(Error::tool("bash", output));
            }
            Err(err) => return Err(err),
        }

        let mut details = serde_json::Map::new();
        if let Some(truncation) = truncation {
            details.insert("truncation".to_string(), serde_json::to_value(truncation)?);
        }
        if let Some(path) = full_output_path {
            details.insert("fullOutputPath".to_string(), serde_json::Value::String(path));
        }

        Ok(ToolOutput {
            content: vec![ContentBlock::Text(TextContent::new(output))],
            details: (!details.is_empty()).then_some(serde_json::Value::Object(details)),
            is_error: false,
        })
    }
}

// ============================================================================
// Edit Tool
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditInput {
    path: String,
    old_text: String,
    new_text: String,
}

pub struct EditTool {
    controller: Arc<DelegationController>,
}

impl EditTool {
    pub const fn new(controller: Arc<DelegationController>) -> Self {
        Self { controller }
    }
}

fn strip_bom(s: &str) -> (&str, bool) {
    s.strip_prefix('\u{FEFF}')
        .map_or((s, false), |stripped| (stripped, true))
}

fn detect_line_ending(content: &str) -> &'static str {
    match (content.find("\r\n"), content.find('\n')) {
        (Some(crlf), Some(lf)) if crlf < lf => "\r\n",
        _ => "\n",
    }
}

fn normalize_to_lf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn restore_line_endings(text: &str, ending: &str) -> String {
    if ending == "\r\n" {
        text.replace('\n', "\r\n")
    } else {
        text.to_string()
    }
}

/// Unified diff of an edit and the first changed line (1-based, new side).
fn diff_summary(old_content: &str, new_content: &str) -> (String, Option<usize>) {
    let diff = similar::TextDiff::from_lines(old_content, new_content);
    let first_changed_line = diff
        .iter_all_changes()
        .find(|change| change.tag() != similar::ChangeTag::Equal)
        .and_then(|change| change.new_index().or_else(|| change.old_index()))
        .map(|idx| idx + 1);
    let unified = diff.unified_diff().context_radius(4).to_string();
    (unified, first_changed_line)
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }
    fn label(&self) -> &str {
        "edit"
    }
    fn description(&self) -> &str {
        "Edit a file by replacing exact text. The oldText must match exactly (including whitespace). Use this for precise, surgical edits."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to edit (relative or absolute)"
                },
                "oldText": {
                    "type": "string",
                    "description": "Exact text to find and replace (must match exactly)"
                },
                "newText": {
                    "type": "string",
                    "description": "New text to replace the old text with"
                }
            },
            "required": ["path", "oldText", "newText"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        input: serde_json::Value,
        _on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput> {
        let input: EditInput = parse_input(input)?;
        let ops = route(&self.controller, "edit", |ops| {
            ops.resolve_path(Some(&input.path))
        })?;

        if ops.access(&input.path).await.is_err() {
            return Err(Error::tool("edit", format!("File not found: {}", input.path)));
        }
        let raw = ops
            .read_file(&input.path)
            .await
            .map_err(|e| Error::tool("edit", format!("Failed to read file: {e}")))?;
        let raw_content = String::from_utf8_lossy(&raw);

        let (content, had_bom) = strip_bom(&raw_content);
        let original_ending = detect_line_ending(content);
        let content = normalize_to_lf(content);
        let old_text = normalize_to_lf(&input.old_text);
        let new_text = normalize_to_lf(&input.new_text);

        let occurrences = if old_text.is_empty() {
            0
        } else {
            content.matches(old_text.as_str()).count()
        };
        if occurrences == 0 {
            return Err(Error::tool(
                "edit",
                format!(
                    "Could not find the exact text in {}. The old text must match exactly including all whitespace and newlines.",
                    input.path
                ),
            ));
        }
        if occurrences > 1 {
            return Err(Error::tool(
                "edit",
                format!(
                    "Found {occurrences} occurrences of the text in {}. The text must be unique. Please provide more context to make it unique.",
                    input.path
                ),
            ));
        }

        let new_content = content.replacen(old_text.as_str(), &new_text, 1);
        if new_content == content {
            return Err(Error::tool(
                "edit",
                format!(
                    "No changes made to {}. The replacement produced identical content. This might indicate an issue with special characters or the text not existing as expected.",
                    input.path
                ),
            ));
        }

        let mut final_content = restore_line_endings(&new_content, original_ending);
        if had_bom {
            final_content.insert(0, '\u{FEFF}');
        }
        ops.write_file(&input.path, final_content.as_bytes())
            .await
            .map_err(|e| Error::tool("edit", format!("Failed to write file: {e}")))?;

        let (diff, first_changed_line) = diff_summary(&content, &new_content);
        let mut details = serde_json::Map::new();
        details.insert("diff".to_string(), serde_json::Value::String(diff));
        if let Some(line) = first_changed_line {
            details.insert("firstChangedLine".to_string(), serde_json::Value::from(line));
        }

        Ok(ToolOutput {
            content: vec![ContentBlock::Text(TextContent::new(format!(
                "Successfully replaced text in {}.",
                input.path
            )))],
            details: Some(serde_json::Value::Object(details)),
            is_error: false,
        })
    }
}

// ============================================================================
// Write Tool
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteInput {
    path: String,
    content: String,
}

pub struct WriteTool {
    controller: Arc<DelegationController>,
}

impl WriteTool {
    pub const fn new(controller: Arc<DelegationController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }
    fn label(&self) -> &str {
        "write"
    }
    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does. Automatically creates parent directories."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write (relative or absolute)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        input: serde_json::Value,
        _on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput> {
        let input: WriteInput = parse_input(input)?;
        let ops = route(&self.controller, "write", |ops| {
            ops.resolve_path(Some(&input.path))
        })?;

        ops.mkdir(parent_dir(&input.path))
            .await
            .map_err(|e| Error::tool("write", format!("Failed to create directories: {e}")))?;
        ops.write_file(&input.path, input.content.as_bytes())
            .await
            .map_err(|e| Error::tool("write", format!("Failed to write file: {e}")))?;

        // Reported size is the UTF-16 length of the content.
        let bytes_written = input.content.encode_utf16().count();
        Ok(ToolOutput::text(format!(
            "Successfully wrote {bytes_written} bytes to {}",
            input.path
        )))
    }
}

// ============================================================================
// Grep Tool
// ============================================================================

pub struct GrepTool {
    controller: Arc<DelegationController>,
}

impl GrepTool {
    pub const fn new(controller: Arc<DelegationController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }
    fn label(&self) -> &str {
        "grep"
    }
    fn description(&self) -> &str {
        "Search file contents for a pattern. Returns matching lines with file paths and line numbers. Respects .gitignore. Output is truncated to 100 matches or 50KB (whichever is hit first). Long lines are truncated to 500 chars."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Search pattern (regex or literal string)"
                },
                "path": {
                    "type": "string",
                    "description": "Directory or file to search (default: current directory)"
                },
                "glob": {
                    "type": "string",
                    "description": "Filter files by glob pattern, e.g. '*.ts' or '**/*.spec.ts'"
                },
                "ignoreCase": {
                    "type": "boolean",
                    "description": "Case-insensitive search (default: false)"
                },
                "literal": {
                    "type": "boolean",
                    "description": "Treat pattern as literal string instead of regex (default: false)"
                },
                "context": {
                    "type": "number",
                    "description": "Number of lines to show before and after each match (default: 0)"
                },
                "limit": {
                    "type": "number",
                    "description": "Maximum number of matches to return (default: 100)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        input: serde_json::Value,
        _on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput> {
        let request: GrepRequest = parse_input(input)?;
        let ops = route(&self.controller, "grep", |ops| {
            ops.resolve_path(request.path.as_deref())
        })?;
        Ok(ops.grep(&request).await?.into())
    }
}

// ============================================================================
// Find Tool
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindInput {
    pattern: String,
    path: Option<String>,
    limit: Option<usize>,
}

pub struct FindTool {
    controller: Arc<DelegationController>,
}

impl FindTool {
    pub const fn new(controller: Arc<DelegationController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Tool for FindTool {
    fn name(&self) -> &str {
        "find"
    }
    fn label(&self) -> &str {
        "find"
    }
    fn description(&self) -> &str {
        "Search for files by glob pattern. Returns matching file paths relative to the search directory. Respects .gitignore. Output is truncated to 1000 results or 50KB (whichever is hit first)."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match files, e.g. '*.ts', '**/*.json', or 'src/**/*.spec.ts'"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (default: current directory)"
                },
                "limit": {
                    "type": "number",
                    "description": "Maximum number of results (default: 1000)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        input: serde_json::Value,
        _on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput> {
        let input: FindInput = parse_input(input)?;
        let ops = route(&self.controller, "find", |ops| {
            ops.resolve_path(input.path.as_deref())
        })?;
        Ok(ops
            .find(&input.pattern, input.path.as_deref(), input.limit)
            .await?
            .into())
    }
}

// ============================================================================
// Ls Tool
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LsInput {
    path: Option<String>,
    limit: Option<usize>,
}

pub struct LsTool {
    controller: Arc<DelegationController>,
}

impl LsTool {
    pub const fn new(controller: Arc<DelegationController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }
    fn label(&self) -> &str {
        "ls"
    }
    fn description(&self) -> &str {
        "List directory contents. Returns entries sorted alphabetically, with '/' suffix for directories. Includes dotfiles. Output is truncated to 500 entries or 50KB (whichever is hit first)."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: current directory)"
                },
                "limit": {
                    "type": "number",
                    "description": "Maximum number of entries to return (default: 500)"
                }
            }
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        input: serde_json::Value,
        _on_update: Option<Box<dyn Fn(ToolUpdate) + Send + Sync>>,
    ) -> Result<ToolOutput> {
        let input: LsInput = parse_input(input)?;
        let ops = route(&self.controller, "ls", |ops| {
            ops.resolve_path(input.path.as_deref())
        })?;
        Ok(ops.ls(input.path.as_deref(), input.limit).await?.into())
    }
}
