// crates/core/src/process.rs
//! External command execution with combined, line-ordered output.
//!
//! stdout and stderr of the child share a single pipe, so lines are observed
//! in exactly the order the process wrote them. A blocking reader forwards
//! each line over a channel while the caller is free to await other work.

use std::collections::VecDeque;
use std::future::Future;
use std::io::{BufRead, BufReader, PipeReader};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::ProcessError;

/// Lines of output kept for diagnostics when a streamed command fails.
const TAIL_LINES: usize = 200;

/// Program, arguments, working directory and environment of a command.
///
/// Strings registered with [`CommandSpec::secret`] are masked in the display
/// form and in captured output, which is all that reaches logs and errors.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            secrets: Vec::new(),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Mask `secret` wherever the command line or its output is shown.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// `text` with every registered secret replaced by `***`.
    pub fn redact(&self, text: &str) -> String {
        mask(text, &self.secrets)
    }

    /// Human-readable command line with secrets masked, used in logs and errors.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        self.redact(&line)
    }
}

/// Runs external commands, optionally bounded by a deadline.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every command run through this runner. `None` blocks until exit.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a command and expose its combined output as a line feed.
    pub fn spawn(&self, spec: &CommandSpec) -> Result<OutputStream, ProcessError> {
        let command = spec.display();
        let (reader, writer) = std::io::pipe().map_err(|source| ProcessError::Io {
            command: command.clone(),
            source,
        })?;
        let writer_err = writer.try_clone().map_err(|source| ProcessError::Io {
            command: command.clone(),
            source,
        })?;

        // `cmd` owns the parent's write ends; it must be dropped before the
        // reader can ever observe EOF.
        let child = {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args)
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(writer_err)
                .kill_on_drop(true);
            if let Some(dir) = &spec.cwd {
                cmd.current_dir(dir);
            }
            for (key, value) in &spec.envs {
                cmd.env(key, value);
            }
            cmd.spawn().map_err(|source| {
                tracing::error!(command = %command, error = %source, "failed to launch command");
                ProcessError::Launch {
                    command: command.clone(),
                    source,
                }
            })?
        };

        let (tx, rx) = mpsc::channel(256);
        tokio::task::spawn_blocking(move || forward_lines(reader, tx));

        tracing::debug!(command = %command, pid = ?child.id(), "command started");
        Ok(OutputStream {
            command,
            secrets: spec.secrets.clone(),
            child,
            lines: rx,
            tail: VecDeque::new(),
        })
    }

    /// Run a command to completion, handing every output line to `on_line`
    /// as it arrives. All output is consumed before the exit status is read.
    pub async fn run_streaming<F>(&self, spec: &CommandSpec, mut on_line: F) -> Result<(), ProcessError>
    where
        F: FnMut(&str),
    {
        let mut stream = self.spawn(spec)?;
        let command = stream.command.clone();
        let drive = async move {
            while let Some(line) = stream.next_line().await {
                on_line(&line);
            }
            stream.finish().await
        };
        self.with_deadline(command, drive).await
    }

    /// Run a command to completion and return its combined output.
    ///
    /// A non-zero exit carries the full captured output in the error.
    pub async fn run(&self, spec: &CommandSpec) -> Result<String, ProcessError> {
        let mut output: Vec<String> = Vec::new();
        let result = self
            .run_streaming(spec, |line| output.push(line.to_string()))
            .await;
        match result {
            Ok(()) => Ok(spec.redact(&output.join("\n"))),
            Err(ProcessError::ExternalTool { command, exit, .. }) => Err(ProcessError::ExternalTool {
                command,
                exit,
                output: spec.redact(&output.join("\n")),
            }),
            Err(e) => Err(e),
        }
    }

    /// Run a command and report only whether it exited successfully.
    pub async fn succeeds(&self, spec: &CommandSpec) -> bool {
        self.run_streaming(spec, |_| {}).await.is_ok()
    }

    async fn with_deadline<T, Fut>(&self, command: String, fut: Fut) -> Result<T, ProcessError>
    where
        Fut: Future<Output = Result<T, ProcessError>>,
    {
        let Some(limit) = self.timeout else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(command = %command, timeout_secs = limit.as_secs(), "command timed out");
                Err(ProcessError::Timeout {
                    command,
                    secs: limit.as_secs(),
                })
            }
        }
    }
}

/// A running command whose combined output is read line by line.
///
/// Dropping the stream kills the child.
pub struct OutputStream {
    command: String,
    secrets: Vec<String>,
    child: Child,
    lines: mpsc::Receiver<String>,
    tail: VecDeque<String>,
}

impl OutputStream {
    /// Next line of output, or `None` once the output is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        let line = self.lines.recv().await?;
        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.clone());
        Some(line)
    }

    /// Drain any unread output, then wait for the process to exit.
    pub async fn finish(mut self) -> Result<(), ProcessError> {
        while self.next_line().await.is_some() {}

        let status = self.child.wait().await.map_err(|source| ProcessError::Io {
            command: self.command.clone(),
            source,
        })?;
        if status.success() {
            tracing::debug!(command = %self.command, "command finished");
            return Ok(());
        }

        tracing::warn!(command = %self.command, exit = %status, "command exited unsuccessfully");
        Err(ProcessError::ExternalTool {
            command: self.command,
            exit: status.to_string(),
            output: mask(&Vec::from(self.tail).join("\n"), &self.secrets),
        })
    }
}

fn mask(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
}

fn forward_lines(reader: PipeReader, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "output reader stopped");
                break;
            }
        }
    }
}
