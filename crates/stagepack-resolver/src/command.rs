use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use stagepack_core::{Resolve, ResolveRequest};
use tracing::debug;

const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Delegates resolution to an external program invoked as
/// `<program> <args..> --descriptor <file> --output <staging dir>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResolver {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn build_command(&self, request: &ResolveRequest<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--descriptor")
            .arg(request.descriptor_path)
            .arg("--output")
            .arg(request.output_dir);
        if let Some(config_file) = &request.options.config_file {
            command.arg("--config").arg(config_file);
        }
        if let Some(source) = &request.options.source {
            command.arg("--source").arg(source);
        }
        if let Some(verbosity) = &request.options.verbosity {
            command.arg("--verbosity").arg(verbosity);
        }
        command
    }
}

impl Resolve for CommandResolver {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<()> {
        let mut command = self.build_command(request);
        let context_message = format!("resolve command '{}' failed", self.program.display());
        debug!(
            program = %self.program.display(),
            output_dir = %request.output_dir.display(),
            "running resolve command"
        );

        match self.timeout {
            Some(timeout) => run_command_with_timeout(&mut command, timeout, &context_message),
            None => run_command(&mut command, &context_message),
        }
    }
}

fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    check_status(context_message, output.status, &output.stdout, &output.stderr)
}

/// Like [`run_command`], but gives up once `timeout` elapses, counting both
/// the wait for exit and the drain of its output. The child leads its own
/// process group on unix so background processes it left holding the pipes
/// are killed with it.
fn run_command_with_timeout(
    command: &mut Command,
    timeout: Duration,
    context_message: &str,
) -> Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command
        .spawn()
        .with_context(|| format!("{context_message}: command failed to start"))?;

    let (sender, receiver) = mpsc::channel();
    let mut pending = 0;
    if let Some(pipe) = child.stdout.take() {
        spawn_reader(Stream::Stdout, pipe, sender.clone());
        pending += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        spawn_reader(Stream::Stderr, pipe, sender.clone());
        pending += 1;
    }
    drop(sender);

    let deadline = Instant::now() + timeout;
    let timed_out = || anyhow!("{context_message}: timed out after {timeout:?}");
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("{context_message}: failed to poll command"))?
        {
            break status;
        }
        if Instant::now() >= deadline {
            kill_process_group(&mut child);
            return Err(timed_out());
        }
        thread::sleep(TIMEOUT_POLL_INTERVAL);
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    while pending > 0 {
        match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Stream::Stdout, buffer)) => {
                stdout = buffer;
                pending -= 1;
            }
            Ok((Stream::Stderr, buffer)) => {
                stderr = buffer;
                pending -= 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!("command exited but its output pipes are still held open");
                kill_process_group(&mut child);
                return Err(timed_out());
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    check_status(context_message, status, &stdout, &stderr)
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(stream: Stream, mut pipe: R, sender: Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        let _ = sender.send((stream, buffer));
    });
}

/// Kills the child and everything still running in its process group, then
/// reaps the child. Reader threads exit once the last pipe holder is gone.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill(2) takes no pointers; a negative pid addresses the
            // group the child was spawned into.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn check_status(
    context_message: &str,
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(stderr);
    let stdout = String::from_utf8_lossy(stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        status,
        stdout.trim(),
        stderr.trim()
    ))
}
