//! External process runner.
//!
//! Spawns a tool with piped output, reads both standard streams
//! incrementally, hands every complete line to a callback as it arrives, and
//! kills the child, along with anything it started, as soon as the
//! cancellation token fires.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const READ_CHUNK_SIZE: usize = 4096;

/// Which standard stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Everything a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    /// Full standard output.
    pub stdout: String,
    /// Full standard error.
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the process exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Splits a byte stream into lines on `\n` or `\r`.
///
/// Tools that redraw a status line end it with a bare carriage return, so
/// both characters terminate a line. Empty lines are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Create an empty splitter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.flush() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Return the trailing unterminated line, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        if line.trim().is_empty() { None } else { Some(line) }
    }
}

/// A tool invocation: executable, arguments and extra environment.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    name: String,
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
}

impl ToolCommand {
    /// Create a command for `program`; `name` is used in errors and logs.
    #[must_use]
    pub fn new(name: impl Into<String>, program: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Tool name used in errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments in order.
    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Extra environment variables.
    #[must_use]
    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Run the tool to completion, calling `on_line` for each output line as
    /// it is read.
    ///
    /// Both streams are also collected in full into the returned
    /// [`ToolOutput`]. A non-zero exit is not an error here; callers decide.
    pub async fn run<F>(&self, cancel: &CancellationToken, mut on_line: F) -> Result<ToolOutput>
    where
        F: FnMut(OutputStream, &str) + Send,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(
            "Running {} {:?}",
            self.program.display(),
            self.args
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // New group, so cancellation also reaches ffmpeg children of yt-dlp.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| Error::ToolInvocation {
                tool: self.name.clone(),
                reason: e.to_string(),
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| Error::ToolInvocation {
            tool: self.name.clone(),
            reason: "failed to capture stdout".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| Error::ToolInvocation {
            tool: self.name.clone(),
            reason: "failed to capture stderr".to_string(),
        })?;

        let mut out = StreamState::new(OutputStream::Stdout);
        let mut err = StreamState::new(OutputStream::Stderr);
        let mut out_buf = [0_u8; READ_CHUNK_SIZE];
        let mut err_buf = [0_u8; READ_CHUNK_SIZE];

        while out.open || err.open {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(self.terminate(&mut child).await);
                }
                read = stdout.read(&mut out_buf), if out.open => {
                    out.consume(read, &out_buf, &self.name, &mut on_line);
                }
                read = stderr.read(&mut err_buf), if err.open => {
                    err.consume(read, &err_buf, &self.name, &mut on_line);
                }
            }
        }

        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(self.terminate(&mut child).await);
            }
            status = child.wait() => status.map_err(|e| Error::ToolInvocation {
                tool: self.name.clone(),
                reason: format!("failed to wait for process: {e}"),
            })?,
        };

        let output = ToolOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.raw).into_owned(),
            stderr: String::from_utf8_lossy(&err.raw).into_owned(),
        };
        debug!("{} finished with exit code {}", self.name, output.exit_code);
        Ok(output)
    }

    /// Kill the child and its process group after cancellation, then reap
    /// the child.
    async fn terminate(&self, child: &mut Child) -> Error {
        debug!("Cancellation requested, killing {}", self.name);
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            kill_process_group(pid).await;
        }
        if let Err(e) = child.kill().await {
            warn!("Failed to kill {}: {}", self.name, e);
        }
        Error::Cancelled
    }
}

/// Send `SIGKILL` to the process group led by `pid`.
#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let group = format!("-{pid}");
    let status = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!("Killed process group {}", pid),
        Ok(status) => debug!("kill for process group {} exited with {}", pid, status),
        Err(e) => warn!("Failed to signal process group {}: {}", pid, e),
    }
}

/// Read state of one stream.
struct StreamState {
    stream: OutputStream,
    open: bool,
    raw: Vec<u8>,
    splitter: LineSplitter,
}

impl StreamState {
    const fn new(stream: OutputStream) -> Self {
        Self {
            stream,
            open: true,
            raw: Vec::new(),
            splitter: LineSplitter::new(),
        }
    }

    fn consume<F>(
        &mut self,
        read: std::io::Result<usize>,
        buf: &[u8],
        tool: &str,
        on_line: &mut F,
    ) where
        F: FnMut(OutputStream, &str),
    {
        match read {
            Ok(0) => {
                self.open = false;
                if let Some(line) = self.splitter.flush() {
                    on_line(self.stream, &line);
                }
            }
            Ok(n) => {
                let chunk = &buf[..n];
                self.raw.extend_from_slice(chunk);
                for line in self.splitter.push(chunk) {
                    on_line(self.stream, &line);
                }
            }
            Err(e) => {
                warn!("Failed to read {:?} of {}: {}", self.stream, tool, e);
                self.open = false;
            }
        }
    }
}
