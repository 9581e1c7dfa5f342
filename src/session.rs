//! Persistent interactive shell session.
//!
//! Owns one OS shell process and layers a sentinel-delimited command/response
//! protocol over its raw byte stream, without any cooperation from the shell:
//! each command is followed by an `echo` of a fixed marker, and the response
//! is recognized purely by scanning the accumulated output for that marker.
//!
//! The framing is fragile by construction. A command that prints the sentinel
//! itself, or a shell with `echo` disabled, breaks it. This is a documented
//! limitation kept for compatibility with existing behavior; the session
//! interface is narrow enough that a stricter framing could be substituted
//! later without touching callers.
//!
//! Concurrency contract: at most one `run` call in flight per session. This
//! is enforced structurally by `&mut self` — a session has a single owner and
//! no internal locking.

use std::io::{self, PipeReader};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_io::{Async, Timer};
use async_process::{Child, ChildStdin, Command};
use futures_lite::future;
use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Marker echoed after every command to signal completion. Assumed not to
/// occur in ordinary command output.
const SENTINEL: &str = "<<exit>>";

/// Environment variable overriding the shell binary.
const SHELL_OVERRIDE_ENV: &str = "MCP_SHELL";

/// Default wall-clock budget for a single command.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between output-buffer scans.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors produced by [`ShellSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation was invoked before [`ShellSession::start`].
    #[error("session has not started")]
    NotStarted,

    /// The command did not complete within the budget. The shell has been
    /// killed as a side effect; the next `run` performs a full restart.
    #[error(
        "timed out: the shell has not returned in {} seconds and has been restarted",
        .0.as_secs_f64()
    )]
    Timeout(Duration),

    /// The shell binary could not be spawned. Never retried automatically.
    #[error("failed to start shell process: {0}")]
    RestartFailure(#[source] io::Error),

    /// IO failure on the shell's pipes.
    #[error("shell io error: {0}")]
    Io(#[from] io::Error),
}

/// Session lifecycle state. Never persisted; process liveness is re-checked
/// lazily on every `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    NotStarted,
    Running,
    RequiresRestart,
}

/// The owned shell process with the pipes under this session's control.
/// Stdout and stderr are merged into one pipe at spawn time.
struct Process {
    child: Child,
    stdin: ChildStdin,
    output: Async<PipeReader>,
}

/// A session of an interactive shell.
///
/// The output buffer is written only by the read path inside `run` and
/// cleared only at the end of a successful command; two sequential commands
/// can never observe each other's output.
pub struct ShellSession {
    state: SessionState,
    shell: PathBuf,
    startup_files: Vec<PathBuf>,
    process: Option<Process>,
    buffer: Vec<u8>,
    timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("state", &self.state)
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

impl ShellSession {
    /// Create a session for the user's shell. Nothing is spawned until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new() -> Self {
        let (shell, startup_files) = discover_shell();
        debug!(shell = %shell.display(), ?startup_files, "resolved user shell");
        Self {
            state: SessionState::NotStarted,
            shell,
            startup_files,
            process: None,
            buffer: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the per-command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the output polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the shell. No-op if the session is already running.
    ///
    /// The shell is spawned as a process-group leader in the user's home
    /// directory with all three standard streams redirected to pipes owned
    /// by this session (stderr merged into stdout). The session is marked
    /// running *before* startup files are sourced, so the internal `run`
    /// calls used for sourcing do not trip the not-started precondition.
    /// Output or errors produced while sourcing are logged as warnings and
    /// never fail startup.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RestartFailure`] if the shell cannot be
    /// spawned.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Running {
            return Ok(());
        }

        debug!(shell = %self.shell.display(), "starting shell");
        self.spawn_shell()?;
        self.state = SessionState::Running;

        for path in self.startup_files.clone() {
            debug!(file = %path.display(), "sourcing startup file");
            match self.run_command(&format!("source {}", path.display())).await {
                Ok(output) if !output.trim().is_empty() => {
                    warn!(
                        file = %path.display(),
                        %output,
                        "output while sourcing startup file"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "failed to source startup file");
                }
            }
        }

        Ok(())
    }

    /// Execute a command and return its combined output.
    ///
    /// If the shell is found to have already exited, the session restarts
    /// itself transparently before proceeding; the command that was in
    /// flight when the crash happened is lost, not replayed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if the session was never
    /// started, [`SessionError::Timeout`] if the command exceeded its budget
    /// (the shell is killed and recycled on the next call), or an IO error
    /// from the shell's pipes.
    pub async fn run(&mut self, command: &str) -> Result<String, SessionError> {
        match self.state {
            SessionState::NotStarted => return Err(SessionError::NotStarted),
            SessionState::RequiresRestart => {
                warn!("shell was recycled, restarting before running command");
                self.restart().await?;
            }
            SessionState::Running => {
                let exited = self
                    .process
                    .as_mut()
                    .and_then(|process| process.child.try_status().ok().flatten());
                if let Some(status) = exited {
                    warn!(%status, "shell has exited, restarting");
                    self.restart().await?;
                }
            }
        }

        self.run_command(command).await
    }

    /// Terminate the shell and mark the session as not started.
    ///
    /// Sends a graceful termination signal to the shell's process group if
    /// the process has not already exited. Idempotent with respect to an
    /// already-exited process.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if the session was never
    /// started.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::NotStarted {
            return Err(SessionError::NotStarted);
        }
        if let Some(process) = &mut self.process
            && matches!(process.child.try_status(), Ok(None))
        {
            signal_group(&process.child, libc::SIGTERM);
        }
        self.process = None;
        self.state = SessionState::NotStarted;
        Ok(())
    }

    /// Stop and start the shell again, re-sourcing startup files.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`stop`](Self::stop) and
    /// [`start`](Self::start).
    pub async fn restart(&mut self) -> Result<(), SessionError> {
        debug!("restarting shell session");
        self.stop()?;
        self.start().await
    }

    /// Spawn the shell with merged stdout/stderr and a piped stdin.
    fn spawn_shell(&mut self) -> Result<(), SessionError> {
        let (reader, writer) = io::pipe().map_err(SessionError::RestartFailure)?;
        let writer_stderr = writer.try_clone().map_err(SessionError::RestartFailure)?;

        let mut command = std::process::Command::new(&self.shell);
        command.process_group(0);
        if let Some(home) = dirs::home_dir() {
            command.current_dir(home);
        }

        // Stdio must be configured on the async command: `spawn` overrides any
        // stream not set through the async wrapper with `Stdio::inherit()`.
        let mut command = Command::from(command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(writer_stderr));
        let mut child = command.spawn().map_err(SessionError::RestartFailure)?;
        let stdin = child.stdin.take().ok_or_else(|| {
            SessionError::RestartFailure(io::Error::other("shell stdin was not captured"))
        })?;
        let output = Async::new(reader).map_err(SessionError::RestartFailure)?;

        self.process = Some(Process {
            child,
            stdin,
            output,
        });
        self.buffer.clear();
        Ok(())
    }

    /// Write one framed command and poll the output buffer for the sentinel.
    /// No liveness checks here; `run` and `start` own those.
    async fn run_command(&mut self, command: &str) -> Result<String, SessionError> {
        let timeout = self.timeout;
        let poll_interval = self.poll_interval;
        let Self {
            process, buffer, ..
        } = self;
        let Some(process) = process.as_mut() else {
            return Err(SessionError::NotStarted);
        };

        debug!(%command, "running command");
        let framed = format!("{command}; echo '{SENTINEL}'\n");
        process.stdin.write_all(framed.as_bytes()).await?;
        process.stdin.flush().await?;

        let result = future::or(wait_for_sentinel(process, buffer, poll_interval), async {
            Timer::after(timeout).await;
            Err(SessionError::Timeout(timeout))
        })
        .await;

        match result {
            Err(SessionError::Timeout(_)) => {
                error!(?timeout, "command timed out, killing shell");
                if let Some(mut process) = self.process.take() {
                    signal_group(&process.child, libc::SIGKILL);
                    if let Err(err) = process.child.kill() {
                        warn!(error = %err, "failed to kill timed out shell");
                    }
                }
                self.state = SessionState::RequiresRestart;
                Err(SessionError::Timeout(timeout))
            }
            other => other,
        }
    }
}

impl Default for ShellSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if let Some(process) = &mut self.process
            && matches!(process.child.try_status(), Ok(None))
        {
            signal_group(&process.child, libc::SIGTERM);
        }
    }
}

/// Poll the output pipe until the sentinel shows up, then return everything
/// strictly before it with exactly one trailing newline stripped. Clears the
/// buffer so the next command starts from a clean slate.
async fn wait_for_sentinel(
    process: &mut Process,
    buffer: &mut Vec<u8>,
    poll_interval: Duration,
) -> Result<String, SessionError> {
    let mut chunk = [0_u8; 4096];
    loop {
        Timer::after(poll_interval).await;

        // Drain whatever the pipe currently holds without blocking for EOF.
        while let Some(read) = future::poll_once(process.output.read(&mut chunk)).await {
            match read? {
                // Pipe closed: the shell is gone. Keep polling so the outer
                // timeout fires; the next `run` detects the exit and heals.
                0 => break,
                n => buffer.extend_from_slice(&chunk[..n]),
            }
        }

        if let Some(pos) = find_sentinel(buffer) {
            debug!(bytes = pos, "sentinel found");
            let mut output = String::from_utf8_lossy(&buffer[..pos]).into_owned();
            buffer.clear();
            if output.ends_with('\n') {
                output.pop();
            }
            return Ok(output);
        }
    }
}

/// Byte offset of the sentinel in `buffer`, if present.
fn find_sentinel(buffer: &[u8]) -> Option<usize> {
    let sentinel = SENTINEL.as_bytes();
    buffer
        .windows(sentinel.len())
        .position(|window| window == sentinel)
}

/// Signal the shell's whole process group. The shell was spawned as a group
/// leader, so its pid names the group.
fn signal_group(child: &Child, signal: libc::c_int) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        unsafe {
            libc::killpg(pid, signal);
        }
    }
}

/// Resolve the user's shell and the startup files to source for it.
///
/// Order: the `MCP_SHELL` override, then `$SHELL`, then `/bin/bash`. Only
/// startup files that actually exist are kept, in sourcing order.
fn discover_shell() -> (PathBuf, Vec<PathBuf>) {
    let shell = std::env::var_os(SHELL_OVERRIDE_ENV)
        .or_else(|| std::env::var_os("SHELL"))
        .map(PathBuf::from)
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from("/bin/bash"));

    let candidates: &[&str] = match shell.file_name().and_then(|name| name.to_str()) {
        Some("bash") => &[".bash_profile", ".bashrc"],
        Some("zsh") => &[".zprofile", ".zshrc"],
        _ => &[],
    };

    let startup_files = dirs::home_dir()
        .map(|home| {
            candidates
                .iter()
                .map(|name| home.join(name))
                .filter(|path| path.exists())
                .collect()
        })
        .unwrap_or_default();

    (shell, startup_files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_session() -> ShellSession {
        ShellSession::new()
            .with_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn find_sentinel_locates_marker() {
        assert_eq!(find_sentinel(b"hello\n<<exit>>\n"), Some(6));
        assert_eq!(find_sentinel(b"no marker here"), None);
        assert_eq!(find_sentinel(b"<<exit>>"), Some(0));
    }

    #[test]
    fn run_before_start_fails() {
        let mut session = fast_session();
        let err = futures_lite::future::block_on(session.run("echo hi")).unwrap_err();
        assert!(matches!(err, SessionError::NotStarted));
    }

    #[test]
    fn stop_before_start_fails() {
        let mut session = fast_session();
        assert!(matches!(session.stop(), Err(SessionError::NotStarted)));
    }

    #[tokio::test]
    async fn run_returns_output_without_sentinel() {
        let mut session = fast_session();
        session.start().await.unwrap();

        let output = session.run("echo hello").await.unwrap();
        assert_eq!(output, "hello");
        assert!(!output.contains(SENTINEL));
    }

    #[tokio::test]
    async fn trailing_newline_is_stripped_exactly_once() {
        let mut session = fast_session();
        session.start().await.unwrap();

        let output = session.run("printf 'a\\nb\\n'").await.unwrap();
        assert_eq!(output, "a\nb");
    }

    #[tokio::test]
    async fn sequential_runs_do_not_observe_each_other() {
        let mut session = fast_session();
        session.start().await.unwrap();

        assert_eq!(session.run("echo first").await.unwrap(), "first");
        assert_eq!(session.run("echo second").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn state_persists_across_commands() {
        let mut session = fast_session();
        session.start().await.unwrap();

        session.run("MARKER=42").await.unwrap();
        assert_eq!(session.run("echo $MARKER").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn restart_discards_shell_state() {
        let mut session = fast_session();
        session.start().await.unwrap();

        session.run("MARKER=42").await.unwrap();
        session.restart().await.unwrap();
        assert_eq!(session.run("echo $MARKER").await.unwrap(), "");
    }

    #[tokio::test]
    async fn timeout_recycles_session() {
        let mut session = ShellSession::new()
            .with_timeout(Duration::from_millis(300))
            .with_poll_interval(Duration::from_millis(20));
        session.start().await.unwrap();

        let err = session.run("sleep 10").await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert_eq!(session.state, SessionState::RequiresRestart);

        // The next run transparently restarts the shell.
        assert_eq!(session.run("echo recovered").await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn session_heals_after_external_kill() {
        let mut session = fast_session();
        session.start().await.unwrap();
        session.run("MARKER=42").await.unwrap();

        let pid = session.process.as_ref().unwrap().child.id();
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
        // Wait until the exit is observable.
        loop {
            let status = session.process.as_mut().unwrap().child.try_status().unwrap();
            if status.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        // The crash is masked; the marker set before it is gone.
        assert_eq!(session.run("echo $MARKER").await.unwrap(), "");
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let mut session = fast_session();
        session.start().await.unwrap();
        let pid = session.process.as_ref().unwrap().child.id();
        session.start().await.unwrap();
        assert_eq!(session.process.as_ref().unwrap().child.id(), pid);
    }

    #[tokio::test]
    async fn stop_is_idempotent_for_exited_process() {
        let mut session = fast_session();
        session.start().await.unwrap();

        let pid = session.process.as_ref().unwrap().child.id();
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
        loop {
            let status = session.process.as_mut().unwrap().child.try_status().unwrap();
            if status.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        session.stop().unwrap();
        assert!(matches!(session.stop(), Err(SessionError::NotStarted)));
    }
}
