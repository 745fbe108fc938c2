//! The command channel: one short-lived transport process per invocation.
//!
//! Commands are plain shell strings (see [`super::command`]). The channel
//! either hands them to `ssh <options> <endpoint> <command>` or, for local
//! execution and tests, to `sh -c <command>`.

use crate::abort::AbortSignal;
use crate::error::{Error, Result};
use asupersync::time::{sleep, wall_now};
use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default connect timeout passed to ssh, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const POLL_TICK: Duration = Duration::from_millis(10);
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Non-interactive ssh options: never prompt, bounded connect time.
pub fn ssh_options(connect_timeout_secs: u64) -> Vec<String> {
    vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={connect_timeout_secs}"),
    ]
}

/// How the channel reaches a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// `<program> <options...> <endpoint> <command>`
    Ssh {
        program: String,
        options: Vec<String>,
        endpoint: String,
    },
    /// `sh -c <command>` on this machine.
    LocalShell,
}

impl Transport {
    /// Plain `ssh` with the default batch options.
    pub fn ssh(endpoint: impl Into<String>) -> Self {
        Self::Ssh {
            program: "ssh".to_string(),
            options: ssh_options(DEFAULT_CONNECT_TIMEOUT_SECS),
            endpoint: endpoint.into(),
        }
    }

    pub fn program(&self) -> &str {
        match self {
            Self::Ssh { program, .. } => program,
            Self::LocalShell => "sh",
        }
    }

    /// Endpoint for display (`local` for the local shell).
    pub fn describe(&self) -> &str {
        match self {
            Self::Ssh { endpoint, .. } => endpoint,
            Self::LocalShell => "local",
        }
    }

    fn command(&self, line: &str) -> Command {
        match self {
            Self::Ssh {
                program,
                options,
                endpoint,
            } => {
                let mut cmd = Command::new(program);
                cmd.args(options).arg(endpoint).arg(line);
                cmd
            }
            Self::LocalShell => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                cmd
            }
        }
    }
}

/// Collected output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandResult {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Source of "now" for timeout deadlines.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// How a streamed invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Exited(Option<i32>),
    Aborted,
    TimedOut,
}

/// Decide the outcome from the exit-state flags.
///
/// Abort wins over timeout, and both win over whatever exit status the
/// killed process reported.
pub const fn settle(aborted: bool, timed_out: bool, exit: Option<i32>) -> Settlement {
    if aborted {
        Settlement::Aborted
    } else if timed_out {
        Settlement::TimedOut
    } else {
        Settlement::Exited(exit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs shell command strings over a [`Transport`].
#[derive(Debug, Clone)]
pub struct CommandChannel {
    transport: Transport,
}

impl CommandChannel {
    pub const fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Run `command` to completion and collect its output.
    ///
    /// A non-zero exit is an [`Error::Transport`] carrying the exit code and
    /// stderr; failure to start the transport is an [`Error::Spawn`].
    pub async fn run(&self, command: &str) -> Result<CommandResult> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut sink = |stream: Stream, chunk: &[u8]| match stream {
            Stream::Stdout => stdout.extend_from_slice(chunk),
            Stream::Stderr => stderr.extend_from_slice(chunk),
        };

        // No signal or deadline is armed here, so only an exit settles.
        let Settlement::Exited(exit) = self.drive(command, &mut sink, None, None, &SystemClock).await?
        else {
            return Err(Error::Aborted);
        };

        if exit != Some(0) {
            debug!(
                endpoint = self.transport.describe(),
                exit_code = ?exit,
                "Remote command failed"
            );
            return Err(Error::transport(exit, &stderr));
        }

        Ok(CommandResult {
            exit_code: 0,
            stdout,
            stderr,
        })
    }

    /// Run a boolean check (`test -d`, `command -v`, ...).
    ///
    /// Exit 0 is `true`; any failure, including transport failure, is `false`.
    pub async fn check(&self, command: &str) -> bool {
        let ok = self.run(command).await.is_ok();
        trace!(command, ok, "Check");
        ok
    }

    /// Run `command`, streaming interleaved stdout/stderr to `on_data`.
    ///
    /// Resolves with the exit code (non-zero is a normal outcome here), or
    /// fails with [`Error::Aborted`] / [`Error::Timeout`] after killing the
    /// process tree.
    pub async fn run_streaming(
        &self,
        command: &str,
        on_data: &(dyn Fn(&[u8]) + Send + Sync),
        signal: Option<&AbortSignal>,
        timeout_secs: Option<u64>,
        clock: &dyn Clock,
    ) -> Result<Option<i32>> {
        let mut sink = |_: Stream, chunk: &[u8]| on_data(chunk);
        let timeout = timeout_secs.filter(|secs| *secs > 0);
        match self
            .drive(command, &mut sink, signal, timeout, clock)
            .await?
        {
            Settlement::Exited(exit) => Ok(exit),
            Settlement::Aborted => Err(Error::Aborted),
            Settlement::TimedOut => Err(Error::Timeout {
                secs: timeout.unwrap_or_default(),
            }),
        }
    }

    async fn drive(
        &self,
        command: &str,
        sink: &mut (dyn FnMut(Stream, &[u8]) + Send),
        signal: Option<&AbortSignal>,
        timeout_secs: Option<u64>,
        clock: &dyn Clock,
    ) -> Result<Settlement> {
        let program = self.transport.program().to_string();
        debug!(
            endpoint = self.transport.describe(),
            command, "Spawning command channel"
        );

        let mut child = self
            .transport
            .command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::spawn(&program, &err))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::tool(&program, "Missing stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::tool(&program, "Missing stderr"))?;

        let mut guard = ProcessGuard::new(child);

        let (tx, rx) = mpsc::sync_channel::<(Stream, Vec<u8>)>(128);
        let tx_stdout = tx.clone();
        thread::spawn(move || pump_stream(stdout, Stream::Stdout, &tx_stdout));
        thread::spawn(move || pump_stream(stderr, Stream::Stderr, &tx));

        let deadline = timeout_secs.map(|secs| clock.now() + Duration::from_secs(secs));
        let mut aborted = false;
        let mut timed_out = false;
        let mut exit: Option<i32> = None;

        loop {
            while let Ok((stream, chunk)) = rx.try_recv() {
                sink(stream, &chunk);
            }

            if signal.is_some_and(AbortSignal::is_aborted) {
                aborted = true;
                exit = guard.kill()?;
                break;
            }

            if deadline.is_some_and(|deadline| clock.now() >= deadline) {
                timed_out = true;
                exit = guard.kill()?;
                break;
            }

            if let Some(status) = guard.try_wait()? {
                exit = status.code();
                break;
            }

            sleep(wall_now(), POLL_TICK).await;
        }

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        loop {
            match rx.try_recv() {
                Ok((stream, chunk)) => sink(stream, &chunk),
                Err(mpsc::TryRecvError::Empty) => {
                    if Instant::now() >= drain_deadline {
                        break;
                    }
                    sleep(wall_now(), POLL_TICK).await;
                }
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }

        let settlement = settle(aborted, timed_out, exit);
        debug!(
            endpoint = self.transport.describe(),
            ?settlement,
            "Command channel settled"
        );
        Ok(settlement)
    }
}

fn pump_stream<R: Read + Send + 'static>(
    mut reader: R,
    stream: Stream,
    tx: &mpsc::SyncSender<(Stream, Vec<u8>)>,
) {
    let mut buf = vec![0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send((stream, buf[..n].to_vec())).is_err() {
                    break;
                }
            }
        }
    }
}

/// Owns the transport child; kills its whole process tree when dropped
/// while still running.
struct ProcessGuard {
    child: Option<std::process::Child>,
}

impl ProcessGuard {
    const fn new(child: std::process::Child) -> Self {
        Self { child: Some(child) }
    }

    fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child.try_wait()?;
        if status.is_some() {
            self.child = None;
        }
        Ok(status)
    }

    fn kill(&mut self) -> Result<Option<i32>> {
        if let Some(mut child) = self.child.take() {
            kill_process_tree(Some(child.id()));
            let _ = child.kill();
            let status = child.wait()?;
            return Ok(status.code());
        }
        Ok(None)
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(_)) | Err(_) => return,
            }
            kill_process_tree(Some(child.id()));
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Kill `pid` and all of its descendants, children first.
pub fn kill_process_tree(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let root = sysinfo::Pid::from_u32(pid);

    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let mut children_map: HashMap<sysinfo::Pid, Vec<sysinfo::Pid>> = HashMap::new();
    for (p, proc_) in sys.processes() {
        if let Some(parent) = proc_.parent() {
            children_map.entry(parent).or_default().push(*p);
        }
    }

    let mut to_kill = Vec::new();
    collect_process_tree(root, &children_map, &mut to_kill);

    for pid in to_kill.into_iter().rev() {
        if let Some(proc_) = sys.process(pid) {
            match proc_.kill_with(sysinfo::Signal::Kill) {
                Some(true) => {}
                Some(false) | None => {
                    let _ = proc_.kill();
                }
            }
        }
    }
}

fn collect_process_tree(
    pid: sysinfo::Pid,
    children_map: &HashMap<sysinfo::Pid, Vec<sysinfo::Pid>>,
    out: &mut Vec<sysinfo::Pid>,
) {
    out.push(pid);
    if let Some(children) = children_map.get(&pid) {
        for child in children {
            collect_process_tree(*child, children_map, out);
        }
    }
}
