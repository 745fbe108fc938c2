//! Remote/local routing for the agent's built-in operations.
//!
//! Startup produces a [`RemoteConfiguration`]. At session start the
//! [`DelegationController`] resolves it once into a [`RemoteTarget`] (or a
//! retained failure) and from then on hands out one [`Operations`]
//! implementation per state: [`RemoteOperations`] when resolved,
//! [`LocalOperations`] when no remote was requested.

use crate::error::{Error, Result};
use crate::model::Message;
use crate::remote::Workspace;
use crate::remote::channel::{
    CommandChannel, DEFAULT_CONNECT_TIMEOUT_SECS, Transport, ssh_options,
};
use crate::remote::command::{ShellCommand, test_path};
use crate::remote::exec::{ExecOptions, ExecOutcome};
use crate::remote::grep::GrepRequest;
use crate::remote::path::{PathPair, join_remote, parent_dir};
use crate::remote::{exec, file_io, find, grep, ls};
use crate::truncate::LimitOutcome;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Marker prefixed to the injected remote `AGENTS.md` message.
pub const REMOTE_AGENTS_MARKER: &str = "[Remote AGENTS.md]";

const CWD_PROMPT_PREFIX: &str = "Current working directory: ";

// ============================================================================
// Configuration
// ============================================================================

/// Remote settings gathered from CLI flags and settings files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfiguration {
    /// `user@host` or `user@host:/absolute/root`.
    pub target: Option<String>,
    /// Directory to check and list right after connecting.
    pub verify: Option<String>,
    pub debug: bool,
    /// Fall back to local execution instead of failing when resolution fails.
    pub optional: bool,
    pub program: String,
    pub options: Vec<String>,
}

impl Default for RemoteConfiguration {
    fn default() -> Self {
        Self {
            target: None,
            verify: None,
            debug: false,
            optional: false,
            program: "ssh".to_string(),
            options: ssh_options(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl RemoteConfiguration {
    /// Whether a remote was asked for at all.
    pub fn requested(&self) -> bool {
        self.target.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// The ssh transport for `endpoint` with the configured program/options.
    pub fn transport(&self, endpoint: &str) -> Transport {
        Transport::Ssh {
            program: self.program.clone(),
            options: self.options.clone(),
            endpoint: endpoint.to_string(),
        }
    }
}

/// Split `user@host:/path` into endpoint and root.
///
/// The root is only recognised when the first `:` is followed by `/`;
/// otherwise the whole argument is the endpoint.
pub fn parse_target(arg: &str) -> (String, Option<String>) {
    for (idx, _) in arg.match_indices(':') {
        if idx == 0 {
            continue;
        }
        let rest = &arg[idx + 1..];
        if rest.starts_with('/') {
            return (arg[..idx].to_string(), Some(rest.to_string()));
        }
    }
    (arg.to_string(), None)
}

// ============================================================================
// Resolution
// ============================================================================

/// A verified remote endpoint and root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub endpoint: String,
    pub remote_root: String,
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.endpoint, self.remote_root)
    }
}

/// Everything established by a successful resolution.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    pub target: RemoteTarget,
    pub operations: Arc<RemoteOperations>,
    /// Non-blank contents of `<root>/AGENTS.md`.
    pub agents_md: Option<String>,
    /// Remote `hostname`, fetched in debug mode.
    pub host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Error,
}

/// A user-facing message produced during session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
}

impl Notification {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Info,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Error,
            message: message.into(),
        }
    }
}

/// Result of [`resolve`].
#[derive(Debug)]
pub struct Resolution {
    pub session: RemoteSession,
    pub notifications: Vec<Notification>,
}

/// Connect to the configured target and verify it.
///
/// Discovers the root with `pwd` when the target names none, checks that
/// it is a directory, runs the optional verify listing and hostname lookup,
/// and loads `AGENTS.md` if readable.
pub async fn resolve<F>(config: &RemoteConfiguration, local_cwd: &str, connect: F) -> Result<Resolution>
where
    F: FnOnce(&str) -> CommandChannel + Send,
{
    let target = config
        .target
        .as_deref()
        .ok_or_else(|| Error::config("No remote target configured"))?;
    let (endpoint, root) = parse_target(target.trim());
    let channel = connect(&endpoint);

    let remote_root = match root {
        Some(root) => root,
        None => {
            let pwd = channel.run("pwd").await?.stdout_lossy();
            let pwd = pwd.trim();
            if pwd.is_empty() {
                return Err(Error::Resolution(format!(
                    "Could not determine the remote working directory on {endpoint}"
                )));
            }
            pwd.to_string()
        }
    };
    require_remote_dir(&channel, &remote_root).await?;

    let mut notifications = Vec::new();
    if let Some(verify) = config.verify.as_deref() {
        require_remote_dir(&channel, verify).await?;
        let list = ShellCommand::new("ls").arg("-a").arg(verify);
        let listing = channel.run(list.as_str()).await?.stdout_lossy();
        let listing = listing.trim();
        let listing = if listing.is_empty() {
            "(empty directory)"
        } else {
            listing
        };
        notifications.push(Notification::info(format!(
            "SSH verify: {verify}\n{listing}"
        )));
    }

    let paths = PathPair::new(local_cwd, remote_root.clone())?;
    let agents_md = load_agents_md(&channel, &remote_root).await;

    let target = RemoteTarget {
        endpoint,
        remote_root,
    };

    let host = if config.debug {
        let host = channel.run("hostname").await?.stdout_lossy().trim().to_string();
        notifications.push(Notification::info(format!(
            "SSH debug: connected to {host} ({target})"
        )));
        Some(host)
    } else {
        None
    };

    notifications.push(Notification::info(format!("SSH mode: {target}")));

    Ok(Resolution {
        session: RemoteSession {
            target,
            operations: Arc::new(RemoteOperations::new(Workspace::new(channel, paths))),
            agents_md,
            host,
        },
        notifications,
    })
}

async fn require_remote_dir(channel: &CommandChannel, dir: &str) -> Result<()> {
    match channel.run(test_path("-d", dir).as_str()).await {
        Ok(_) => Ok(()),
        Err(Error::Transport { code: 1, .. }) => Err(Error::Resolution(format!(
            "Remote directory does not exist: {dir}"
        ))),
        Err(err) => Err(err),
    }
}

async fn load_agents_md(channel: &CommandChannel, remote_root: &str) -> Option<String> {
    let path = join_remote(remote_root, "AGENTS.md");
    if !channel.check(test_path("-r", &path).as_str()).await {
        return None;
    }
    let cat = ShellCommand::new("cat").arg(&path);
    match channel.run(cat.as_str()).await {
        Ok(result) => {
            let content = result.stdout_lossy();
            (!content.trim().is_empty()).then_some(content)
        }
        Err(err) => {
            debug!(path, error = %err, "Could not load remote AGENTS.md");
            None
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationsKind {
    Remote,
    Local,
}

impl fmt::Display for OperationsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::Local => "local",
        })
    }
}

/// The operation contracts shared by the remote and local implementations.
#[async_trait]
pub trait Operations: Send + Sync {
    fn kind(&self) -> OperationsKind;

    /// Where a tool-supplied path points for this implementation.
    fn resolve_path(&self, path: Option<&str>) -> String;

    async fn ls(&self, path: Option<&str>, limit: Option<usize>) -> Result<LimitOutcome>;

    async fn find(
        &self,
        pattern: &str,
        path: Option<&str>,
        limit: Option<usize>,
    ) -> Result<LimitOutcome>;

    async fn grep(&self, request: &GrepRequest) -> Result<LimitOutcome>;

    async fn access(&self, path: &str) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    async fn detect_mime_type(&self, path: &str) -> Option<&'static str>;

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    async fn mkdir(&self, dir: &str) -> Result<()>;

    async fn exec(&self, command: &str, cwd: &str, options: &ExecOptions) -> Result<ExecOutcome>;
}

/// Operations carried out on the remote host.
#[derive(Debug, Clone)]
pub struct RemoteOperations {
    ws: Workspace,
}

impl RemoteOperations {
    pub const fn new(ws: Workspace) -> Self {
        Self { ws }
    }

    pub const fn workspace(&self) -> &Workspace {
        &self.ws
    }
}

#[async_trait]
impl Operations for RemoteOperations {
    fn kind(&self) -> OperationsKind {
        OperationsKind::Remote
    }

    fn resolve_path(&self, path: Option<&str>) -> String {
        self.ws.resolve(path)
    }

    async fn ls(&self, path: Option<&str>, limit: Option<usize>) -> Result<LimitOutcome> {
        ls::ls(&self.ws, path, limit).await
    }

    async fn find(
        &self,
        pattern: &str,
        path: Option<&str>,
        limit: Option<usize>,
    ) -> Result<LimitOutcome> {
        find::find(&self.ws, pattern, path, limit).await
    }

    async fn grep(&self, request: &GrepRequest) -> Result<LimitOutcome> {
        grep::grep(&self.ws, request).await
    }

    async fn access(&self, path: &str) -> Result<()> {
        file_io::access(&self.ws, path).await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        file_io::read_file(&self.ws, path).await
    }

    async fn detect_mime_type(&self, path: &str) -> Option<&'static str> {
        file_io::detect_mime_type(&self.ws, path).await
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        file_io::write_file(&self.ws, path, content).await
    }

    async fn mkdir(&self, dir: &str) -> Result<()> {
        file_io::mkdir(&self.ws, dir).await
    }

    async fn exec(&self, command: &str, cwd: &str, options: &ExecOptions) -> Result<ExecOutcome> {
        exec::exec(&self.ws, command, cwd, options).await
    }
}

/// Operations on this machine.
///
/// Listing, search and shell commands run through the local shell with an
/// identity path mapping; file contents go through the filesystem directly.
#[derive(Debug, Clone)]
pub struct LocalOperations {
    ws: Workspace,
}

impl LocalOperations {
    pub fn new(cwd: &str) -> Result<Self> {
        Ok(Self {
            ws: Workspace::new(
                CommandChannel::new(Transport::LocalShell),
                PathPair::identity(cwd)?,
            ),
        })
    }
}

#[async_trait]
impl Operations for LocalOperations {
    fn kind(&self) -> OperationsKind {
        OperationsKind::Local
    }

    fn resolve_path(&self, path: Option<&str>) -> String {
        self.ws.resolve(path)
    }

    async fn ls(&self, path: Option<&str>, limit: Option<usize>) -> Result<LimitOutcome> {
        ls::ls(&self.ws, path, limit).await
    }

    async fn find(
        &self,
        pattern: &str,
        path: Option<&str>,
        limit: Option<usize>,
    ) -> Result<LimitOutcome> {
        find::find(&self.ws, pattern, path, limit).await
    }

    async fn grep(&self, request: &GrepRequest) -> Result<LimitOutcome> {
        grep::grep(&self.ws, request).await
    }

    async fn access(&self, path: &str) -> Result<()> {
        let absolute = self.ws.resolve(Some(path));
        asupersync::fs::OpenOptions::new()
            .read(true)
            .open(&absolute)
            .await
            .map(|_| ())
            .map_err(|_| Error::PathNotFound(absolute))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.access(path).await?;
        let absolute = self.ws.resolve(Some(path));
        Ok(asupersync::fs::read(&absolute).await?)
    }

    async fn detect_mime_type(&self, path: &str) -> Option<&'static str> {
        let absolute = self.ws.resolve(Some(path));
        let bytes = asupersync::fs::read(&absolute).await.ok()?;
        detect_image_mime_type_from_bytes(&bytes)
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let absolute = self.ws.resolve(Some(path));
        let parent = std::path::Path::new(parent_dir(&absolute));
        let temp_file = tempfile::NamedTempFile::new_in(parent)?;
        asupersync::fs::write(temp_file.path(), content).await?;
        temp_file
            .persist(&absolute)
            .map_err(|e| Error::Io(Box::new(e.error)))?;
        Ok(())
    }

    async fn mkdir(&self, dir: &str) -> Result<()> {
        let absolute = self.ws.resolve(Some(dir));
        asupersync::fs::create_dir_all(&absolute).await?;
        Ok(())
    }

    async fn exec(&self, command: &str, cwd: &str, options: &ExecOptions) -> Result<ExecOutcome> {
        exec::exec(&self.ws, command, cwd, options).await
    }
}

/// Magic-byte sniffing for the same image types the remote MIME check accepts.
pub fn detect_image_mime_type_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1A\n") {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

// ============================================================================
// Controller
// ============================================================================

/// Resolution lifecycle of the remote target.
#[derive(Debug, Clone)]
pub enum ResolutionState {
    Unconfigured,
    Resolving,
    Resolved(RemoteSession),
    Failed(String),
}

/// Chooses remote or local execution for every operation.
pub struct DelegationController {
    local_cwd: String,
    config: RemoteConfiguration,
    local: Arc<LocalOperations>,
    state: RwLock<ResolutionState>,
    debug_status: Mutex<Option<String>>,
}

impl fmt::Debug for DelegationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationController")
            .field("local_cwd", &self.local_cwd)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DelegationController {
    pub fn new(local_cwd: impl Into<String>, config: RemoteConfiguration) -> Result<Self> {
        let local_cwd = local_cwd.into();
        let local = Arc::new(LocalOperations::new(&local_cwd)?);
        Ok(Self {
            local_cwd,
            config,
            local,
            state: RwLock::new(ResolutionState::Unconfigured),
            debug_status: Mutex::new(None),
        })
    }

    pub const fn config(&self) -> &RemoteConfiguration {
        &self.config
    }

    pub fn local_cwd(&self) -> &str {
        &self.local_cwd
    }

    pub fn state(&self) -> ResolutionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: ResolutionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn session(&self) -> Option<RemoteSession> {
        match self.state() {
            ResolutionState::Resolved(session) => Some(session),
            _ => None,
        }
    }

    /// The resolved target, if any.
    pub fn target(&self) -> Option<RemoteTarget> {
        self.session().map(|session| session.target)
    }

    /// Resolve the configured remote over ssh.
    pub async fn start_session(&self) -> Vec<Notification> {
        let config = self.config.clone();
        self.start_session_with(move |endpoint| CommandChannel::new(config.transport(endpoint)))
            .await
    }

    /// Resolve the configured remote over the channel built by `connect`.
    pub async fn start_session_with<F>(&self, connect: F) -> Vec<Notification>
    where
        F: FnOnce(&str) -> CommandChannel + Send,
    {
        if !self.config.requested() {
            self.set_state(ResolutionState::Unconfigured);
            return Vec::new();
        }

        self.set_state(ResolutionState::Resolving);
        debug!(remote = ?self.config.target, "Resolving remote target");

        match resolve(&self.config, &self.local_cwd, connect).await {
            Ok(resolution) => {
                info!(remote = %resolution.session.target, "Remote target resolved");
                self.set_state(ResolutionState::Resolved(resolution.session));
                resolution.notifications
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "Remote target resolution failed");
                self.set_state(ResolutionState::Failed(message.clone()));
                vec![Notification::error(format!(
                    "SSH requested but failed: {message}"
                ))]
            }
        }
    }

    /// Forget the resolved target (session switch); the next session start
    /// resolves again.
    pub fn reset(&self) {
        self.set_state(ResolutionState::Unconfigured);
        *self
            .debug_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The implementation every operation should use right now.
    pub fn operations(&self) -> Result<Arc<dyn Operations>> {
        match self.state() {
            ResolutionState::Resolved(session) => Ok(session.operations),
            state if self.config.requested() && !self.config.optional => {
                let reason = match state {
                    ResolutionState::Failed(message) => Some(message),
                    ResolutionState::Resolving => Some("resolution in progress".to_string()),
                    ResolutionState::Unconfigured | ResolutionState::Resolved(_) => None,
                };
                Err(Error::RemoteUnavailable { reason })
            }
            _ => Ok(self.local.clone()),
        }
    }

    /// Handler for ad hoc user shell commands: remote operations when
    /// resolved, `None` to let the host run the command locally.
    pub fn user_bash(&self) -> Result<Option<Arc<dyn Operations>>> {
        let ops = self.operations()?;
        Ok((ops.kind() == OperationsKind::Remote).then_some(ops))
    }

    /// Log a routing decision and, in debug mode, keep it as the status.
    pub fn record_route(&self, kind: OperationsKind, op: &str, detail: &str) {
        let status = format!("SSH {kind} {op}: {detail}");
        debug!(%kind, op, detail, "Routed operation");
        if self.config.debug {
            *self
                .debug_status
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(status);
        }
    }

    /// Last routing status recorded in debug mode.
    pub fn debug_status(&self) -> Option<String> {
        self.debug_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One-line connection status for display.
    pub fn status_line(&self) -> Option<String> {
        match self.state() {
            ResolutionState::Resolved(session) => Some(format!("SSH: {}", session.target)),
            ResolutionState::Failed(_) => Some("SSH: failed".to_string()),
            ResolutionState::Resolving => Some("SSH: connecting".to_string()),
            ResolutionState::Unconfigured => None,
        }
    }

    /// Point the system prompt's working directory at the remote root and,
    /// in debug mode, append a connection summary.
    pub fn rewrite_system_prompt(&self, prompt: &str) -> String {
        let session = self.session();
        let mut rewritten = prompt.to_string();

        if let Some(session) = session.as_ref() {
            rewritten = rewritten.replacen(
                &format!("{CWD_PROMPT_PREFIX}{}", self.local_cwd),
                &format!(
                    "{CWD_PROMPT_PREFIX}{} (via SSH: {})",
                    session.target.remote_root, session.target.endpoint
                ),
                1,
            );
        }

        if self.config.debug {
            match session {
                Some(session) => {
                    rewritten.push_str(&format!(
                        "\nSSH debug: remote={} host={} cwd={} localCwd={}",
                        session.target.endpoint,
                        session.host.as_deref().unwrap_or("unknown"),
                        session.target.remote_root,
                        self.local_cwd
                    ));
                }
                None if self.config.requested() => {
                    rewritten.push_str("\nSSH debug: requested but not connected");
                }
                None => rewritten.push_str("\nSSH debug: not requested"),
            }
        }

        rewritten
    }

    /// Prepend the remote `AGENTS.md` as a user message, once per context.
    ///
    /// Returns `None` when there is nothing to inject or it is already there.
    pub fn inject_agents_context(&self, messages: &[Message]) -> Option<Vec<Message>> {
        let agents_md = self.session()?.agents_md?;
        if messages
            .iter()
            .any(|message| message.user_blocks_contain(REMOTE_AGENTS_MARKER))
        {
            return None;
        }

        let mut injected = Vec::with_capacity(messages.len() + 1);
        injected.push(Message::user_text_block(format!(
            "{REMOTE_AGENTS_MARKER}\n{agents_md}"
        )));
        injected.extend_from_slice(messages);
        Some(injected)
    }
}
