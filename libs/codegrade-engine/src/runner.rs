/// Process Runner - the only place that touches process primitives
///
/// Spawns one external process with all three streams piped in memory,
/// feeds stdin, drains stdout/stderr concurrently and races the exit
/// against a wall-clock deadline. However the leader ends, the whole
/// process group gets SIGKILL afterwards, so nothing it backgrounded
/// outlives the run; untrusted code is never asked nicely.
///
/// Knows nothing about languages.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep draining pipes once the process is gone
const PIPE_GRACE: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 8 * 1024;

/// Program, arguments and working directory of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables stripped from the inherited environment
    pub env_remove: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env_remove: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Human-readable command line for logs and diagnostics
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// What came back from one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Terminating signal, if the process did not exit normally
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    /// Output beyond the configured cap was discarded
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl RunnerError {
    /// The executable itself does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, RunnerError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    max_output_bytes: usize,
}

impl ProcessRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    /// Run `command` to completion or until `deadline` elapses
    pub async fn run(
        &self,
        command: &CommandSpec,
        stdin: &str,
        deadline: Duration,
    ) -> Result<ProcessOutput, RunnerError> {
        let program = command.program.display().to_string();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        for key in &command.env_remove {
            cmd.env_remove(key);
        }
        // Own process group so a timeout takes compiler subprocesses and
        // anything the submission forked down with it
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: program.clone(),
            source,
        })?;
        let start = Instant::now();
        let pid = child.id();
        debug!(pid = ?pid, command = %command.display(), deadline_ms = deadline.as_millis() as u64, "Process spawned");

        // Feed stdin from its own task: a child that never reads must not
        // stall the deadline race
        let stdin_task = child.stdin.take().map(|mut pipe| {
            let data = stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                // EPIPE is expected when the child exits without reading
                let _ = pipe.write_all(&data).await;
                let _ = pipe.shutdown().await;
            })
        });

        let limit = self.max_output_bytes;
        let stdout_reader = child.stdout.take().map(|pipe| PipeReader::spawn(pipe, limit));
        let stderr_reader = child.stderr.take().map(|pipe| PipeReader::spawn(pipe, limit));

        let (status, timed_out) = match tokio::time::timeout(deadline, child.wait()).await {
            Ok(status) => {
                // the leader is gone; take down whatever it left running
                kill_group(pid);
                let status = status.map_err(|source| RunnerError::Wait {
                    program: program.clone(),
                    source,
                })?;
                (Some(status), false)
            }
            Err(_) => {
                let status = kill_and_reap(&mut child, pid).await;
                (status, true)
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if let Some(task) = stdin_task {
            task.abort();
        }
        let (stdout, stdout_truncated) = collect(stdout_reader).await;
        let (stderr, stderr_truncated) = collect(stderr_reader).await;

        let (exit_code, signal) = match status {
            Some(status) => split_status(status),
            None => (None, None),
        };

        debug!(
            pid = ?pid,
            exit_code = ?exit_code,
            signal = ?signal,
            timed_out,
            elapsed_ms,
            "Process finished"
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code,
            signal,
            timed_out,
            elapsed_ms,
            truncated: stdout_truncated || stderr_truncated,
        })
    }
}

/// SIGKILL every process left in the child's group. ESRCH just means the
/// group is already empty.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = pid {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => debug!(pid, error = %e, "killpg failed"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// SIGKILL the process group, then the child itself, and wait for it so
/// it is confirmed gone before returning
async fn kill_and_reap(child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
    kill_group(pid);

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed, child likely already exited");
    }
    match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(error = %e, "Failed to reap killed process");
            None
        }
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Background reader for one pipe. The buffer is shared with the task so
/// whatever arrived before a cut-off survives an abort.
struct PipeReader {
    captured: Arc<Mutex<Captured>>,
    task: JoinHandle<()>,
}

impl PipeReader {
    fn spawn<R>(pipe: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let task = tokio::spawn(drain(pipe, limit, Arc::clone(&captured)));
        Self { captured, task }
    }

    fn take(&self) -> (String, bool) {
        let captured = self.captured.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        (
            String::from_utf8_lossy(&captured.bytes).into_owned(),
            captured.truncated,
        )
    }
}

async fn drain<R>(mut pipe: R, limit: usize, captured: Arc<Mutex<Captured>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let mut captured = captured.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let room = limit.saturating_sub(captured.bytes.len());
        if n <= room {
            captured.bytes.extend_from_slice(&chunk[..n]);
        } else {
            // keep reading so the child never blocks on a full pipe
            captured.bytes.extend_from_slice(&chunk[..room]);
            captured.truncated = true;
        }
    }
}

async fn collect(reader: Option<PipeReader>) -> (String, bool) {
    let Some(mut reader) = reader else {
        return (String::new(), false);
    };
    match tokio::time::timeout(PIPE_GRACE, &mut reader.task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Pipe reader task failed"),
        Err(_) => {
            // something outside our process group still holds the pipe
            reader.task.abort();
            warn!("Pipe still open after process exit, keeping partial output");
        }
    }
    reader.take()
}

#[cfg(unix)]
fn split_status(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn split_status(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(1024 * 1024)
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_stdin_is_piped_through() {
        let output = runner()
            .run(&CommandSpec::new("cat"), "hello\nworld", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "hello\nworld");
        assert_eq!(output.exit_code, Some(0));
        assert!(!output.timed_out);
    }

    #[tokio::test]
    async fn test_non_zero_exit_and_stderr() {
        let output = runner()
            .run(&sh("echo oops >&2; exit 3"), "", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr, "oops\n");
        assert!(output.signal.is_none());
    }

    #[tokio::test]
    async fn test_signal_termination() {
        let output = runner()
            .run(&sh("kill -9 $$"), "", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(output.exit_code, None);
        assert_eq!(output.signal, Some(9));
        assert!(!output.timed_out);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_keeps_partial_output() {
        let output = runner()
            .run(
                &sh("echo $$; echo started; exec sleep 10"),
                "",
                Duration::from_millis(300),
            )
            .await
            .unwrap();

        assert!(output.timed_out);
        assert!(!output.success());
        assert!(output.stdout.contains("started"));
        assert!(output.elapsed_ms >= 300, "elapsed {}ms", output.elapsed_ms);
        assert!(output.elapsed_ms < 1500, "elapsed {}ms", output.elapsed_ms);

        // the process is gone, not just abandoned
        let pid: i32 = output.stdout.lines().next().unwrap().trim().parse().unwrap();
        let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok();
        assert!(!alive, "process {} still running", pid);
    }

    #[tokio::test]
    async fn test_timeout_takes_background_children_down() {
        let start = Instant::now();
        let output = runner()
            .run(&sh("sleep 10 & sleep 10 & wait"), "", Duration::from_millis(200))
            .await
            .unwrap();

        assert!(output.timed_out);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    /// Running, as opposed to gone or a zombie waiting for init to reap it
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .map_or(false, |state| state != "Z"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_normal_exit_takes_background_children_down() {
        let start = Instant::now();
        let output = runner()
            .run(&sh("echo hi; (exec sleep 30) & echo $!"), "", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success());
        assert!(!output.timed_out);
        // the background sleep held stdout open; what was written must survive
        assert!(output.stdout.starts_with("hi\n"), "stdout {:?}", output.stdout);
        assert!(start.elapsed() < Duration::from_secs(3));

        let pid: i32 = output.stdout.lines().nth(1).unwrap().trim().parse().unwrap();
        let mut running = is_running(pid);
        for _ in 0..20 {
            if !running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            running = is_running(pid);
        }
        assert!(!running, "background process {} still running", pid);
    }

    #[tokio::test]
    async fn test_collect_keeps_partial_output_of_an_open_pipe() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"partial").await.unwrap();

        let pipe = PipeReader::spawn(reader, 1024);
        let start = Instant::now();
        let (text, truncated) = collect(Some(pipe)).await;

        // writer is still alive, so the grace period had to expire
        assert!(start.elapsed() >= PIPE_GRACE);
        assert_eq!(text, "partial");
        assert!(!truncated);
        drop(writer);
    }

    #[tokio::test]
    async fn test_unread_stdin_does_not_block() {
        let big_input = "x".repeat(4 * 1024 * 1024);
        let output = runner()
            .run(&CommandSpec::new("true"), &big_input, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success());
        assert!(!output.timed_out);
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let output = ProcessRunner::new(10)
            .run(&sh("printf 'aaaaaaaaaaaaaaaaaaaa'"), "", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "aaaaaaaaaa");
        assert!(output.truncated);
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = runner()
            .run(&CommandSpec::new("pwd").current_dir(dir.path()), "", Duration::from_secs(5))
            .await
            .unwrap();

        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = runner()
            .run(
                &CommandSpec::new("/nonexistent/bin/codegrade-missing"),
                "",
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("codegrade-missing"));
    }

    #[test]
    fn test_command_display() {
        let spec = CommandSpec::new("gcc").args(["-O2", "-o", "out"]).arg("main.c");
        assert_eq!(spec.display(), "gcc -O2 -o out main.c");
    }
}
