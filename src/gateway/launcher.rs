//! Process launching and lifecycle control.
//!
//! # Responsibilities
//! - Start the program with exactly the built environment
//! - Wire stdin/stdout/stderr as pipes and hand them to the caller
//! - Terminate the whole process group on demand (SIGTERM, then SIGKILL)
//! - Guarantee the child is killed and reaped on every exit path
//!
//! # Design Decisions
//! - Each program leads its own process group so helpers it forks die with it
//! - `spawn` never waits; the caller owns the handle until it is dropped
//! - Termination is idempotent and safe after a natural exit

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::gateway::environment::ExecutionEnvironment;
use crate::gateway::outcome::ProcessError;

/// Request bodies are written in slices of this size so back-pressure applies per slice.
const STDIN_CHUNK: usize = 64 * 1024;

/// What to run for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    program: PathBuf,
    args: Vec<OsString>,
    script_filename: PathBuf,
    working_dir: Option<PathBuf>,
}

impl ScriptCommand {
    /// Run the script itself as the executable.
    pub fn direct(script: impl AsRef<Path>) -> Self {
        let script = absolute(script.as_ref());
        Self {
            program: script.clone(),
            args: Vec::new(),
            working_dir: script.parent().map(Path::to_path_buf),
            script_filename: script,
        }
    }

    /// Run `interpreter <script>`.
    pub fn interpreted(interpreter: impl AsRef<Path>, script: impl AsRef<Path>) -> Self {
        let script = absolute(script.as_ref());
        Self {
            program: interpreter.as_ref().to_path_buf(),
            args: vec![script.clone().into_os_string()],
            working_dir: script.parent().map(Path::to_path_buf),
            script_filename: script,
        }
    }

    /// Append an extra argument after the script.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Absolute path of the script file (exported as `SCRIPT_FILENAME`).
    pub fn script_filename(&self) -> &Path {
        &self.script_filename
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// True when the script is handed to an interpreter rather than executed.
    pub fn is_interpreted(&self) -> bool {
        self.program != self.script_filename
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// The three standard channels of a running program.
#[derive(Debug)]
pub struct ProcessPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Lifecycle of a spawned program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited on its own and was reaped.
    Exited(ExitStatus),
    /// Killed by the gateway. The status is `None` only if reaping failed.
    Terminated(Option<ExitStatus>),
}

/// Owned handle to one running program.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    pipes: Option<ProcessPipes>,
    state: ProcessState,
}

/// Start `command` with `env` as its entire environment.
///
/// The script file is checked before spawning so a missing script behind an
/// existing interpreter is still a launch failure.
pub fn spawn(
    command: &ScriptCommand,
    env: &ExecutionEnvironment,
) -> Result<ProcessHandle, ProcessError> {
    let launch_failure = |source: io::Error| ProcessError::LaunchFailure {
        program: command.script_filename().to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(command.script_filename()).map_err(launch_failure)?;
    if !metadata.is_file() {
        return Err(launch_failure(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    if command.is_interpreted() {
        // The interpreter opens the script itself; fail here instead of
        // reporting the interpreter's exit status.
        std::fs::File::open(command.script_filename()).map_err(launch_failure)?;
    }

    let mut cmd = Command::new(command.program());
    cmd.args(command.args())
        .env_clear()
        .envs(env.iter())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .process_group(0);
    if let Some(dir) = command.working_dir() {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(launch_failure)?;
    let pipes = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
        (Some(stdin), Some(stdout), Some(stderr)) => ProcessPipes {
            stdin,
            stdout,
            stderr,
        },
        _ => {
            return Err(launch_failure(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "standard channels were not captured",
            )))
        }
    };

    let pid = child.id();
    tracing::debug!(pid = ?pid, program = %command.program().display(), "Process spawned");

    Ok(ProcessHandle {
        child,
        pid,
        pipes: Some(pipes),
        state: ProcessState::Running,
    })
}

impl ProcessHandle {
    /// OS process id, if the process has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Take the standard channels. Returns `None` on the second call.
    pub fn take_pipes(&mut self) -> Option<ProcessPipes> {
        self.pipes.take()
    }

    /// Wait for the program to exit on its own.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        match self.state {
            ProcessState::Exited(status) | ProcessState::Terminated(Some(status)) => Ok(status),
            ProcessState::Terminated(None) => Err(io::Error::other("process status was lost")),
            ProcessState::Running => {
                let status = self.child.wait().await?;
                self.state = ProcessState::Exited(status);
                Ok(status)
            }
        }
    }

    /// Stop the program and everything in its process group.
    ///
    /// Sends SIGTERM, waits up to `grace`, then sends SIGKILL. Any group
    /// members left behind by the leader are killed as well. Calling this
    /// again, or after the program already exited and was reaped, signals
    /// nothing and returns the recorded status.
    pub async fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        self.pipes = None;

        // Once the leader is reaped its pid may be recycled, possibly as the
        // leader of another group, so a group that was never signalled while
        // its leader was alive is left alone.
        match self.state {
            ProcessState::Exited(status) => return Some(status),
            ProcessState::Terminated(status) => return status,
            ProcessState::Running => {}
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.state = ProcessState::Exited(status);
            return Some(status);
        }

        self.signal_group(Signal::SIGTERM);
        let mut status = tokio::time::timeout(grace, self.child.wait())
            .await
            .ok()
            .and_then(Result::ok);
        if status.is_none() {
            tracing::debug!(pid = ?self.pid, "Process outlived SIGTERM, escalating to SIGKILL");
            self.signal_group(Signal::SIGKILL);
            let _ = self.child.start_kill();
            status = self.child.wait().await.ok();
        }

        // Members that ignored SIGTERM keep the group id alive, so it cannot
        // have been reused yet.
        self.signal_group(Signal::SIGKILL);
        self.state = ProcessState::Terminated(status);
        status
    }

    /// Signal the process group. Returns false if the group is already gone.
    fn signal_group(&self, signal: Signal) -> bool {
        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        match killpg(Pid::from_raw(pid), signal) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                tracing::warn!(pid, signal = %signal, error = %e, "Failed to signal process group");
                false
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.state == ProcessState::Running {
            // kill_on_drop handles the leader; this reaches the rest of the group.
            self.signal_group(Signal::SIGKILL);
        }
    }
}

/// How much of the request body reached the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyDelivery {
    Complete { bytes: usize },
    /// The program closed its input after `written` of `total` bytes.
    Partial { written: usize, total: usize },
}

/// Write `body` to the program's input and close it.
///
/// Waits for the program to read (back-pressure); a closed pipe is reported
/// as [`BodyDelivery::Partial`] rather than as an error.
pub async fn feed_stdin(mut stdin: ChildStdin, body: Bytes) -> io::Result<BodyDelivery> {
    let total = body.len();
    let mut written = 0;

    for chunk in body.chunks(STDIN_CHUNK) {
        match stdin.write_all(chunk).await {
            Ok(()) => written += chunk.len(),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                return Ok(BodyDelivery::Partial { written, total });
            }
            Err(e) => return Err(e),
        }
    }
    match stdin.flush().await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            return Ok(BodyDelivery::Partial { written, total });
        }
        Err(e) => return Err(e),
    }

    Ok(BodyDelivery::Complete { bytes: total })
}
