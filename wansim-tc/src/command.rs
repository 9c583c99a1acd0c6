//! Utilities for running external tools such as `tc` and the interface lister.
//!
//! Every invocation goes through an [`Executor`], so the engine can be driven against a real
//! host with [`Runner`] or against an in-memory model under test.

use std::{fmt, io, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _},
    process,
};

/// Failure to run a command to a successful end.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The program could not be spawned or its pipes failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The program exited unsuccessfully.
    #[error("non-zero exit status ({}): {}", .0.status_code(), .0.stderr.trim())]
    NonZero(Output),
    /// The bound elapsed. Carries whatever output was captured until then.
    #[error("command timed out after {0:?}")]
    TimedOut(Duration, Output),
}

/// Result of running a command.
pub type Result<T> = std::result::Result<T, Error>;

/// Captured result of a finished (or timed out) command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Exit code, `None` if the process was killed by a signal or did not finish.
    pub code: Option<i32>,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl Output {
    /// A successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self { code: Some(0), stdout: stdout.into(), stderr: String::new() }
    }

    /// Returns `true` if the process exited with status 0.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_code(&self) -> String {
        self.code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
    }
}

/// A program, its arguments and optional data fed to its stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path, resolved through `PATH` when relative.
    pub program: String,
    /// Arguments, passed as-is without a shell.
    pub args: Vec<String>,
    /// Data written to the child's stdin, which is closed afterwards.
    pub stdin: Option<String>,
}

impl Invocation {
    /// Creates an invocation of `program` without arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), stdin: None }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the data written to the child's stdin before waiting on it.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Prefixes the invocation with `sudo` when `sudo` is set.
    pub fn with_sudo(self, sudo: bool) -> Self {
        if !sudo {
            return self;
        }

        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);

        Self { program: "sudo".to_string(), args, stdin: self.stdin }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Shared, type-erased executor handle.
pub type BoxedExecutor = Arc<dyn Executor>;

/// Runs an [`Invocation`] and returns its captured output.
///
/// Implementations must bound the execution by `timeout` and report an elapsed bound as
/// [`Error::TimedOut`], never as a plain failure: the command may still have taken effect.
#[async_trait]
pub trait Executor: fmt::Debug + Send + Sync {
    /// Runs `invocation`, waiting at most `timeout` for it to finish.
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<Output>;
}

/// Executor spawning real processes on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner;

impl Runner {
    /// Returns a shared [`Runner`] as a [`BoxedExecutor`].
    pub fn boxed() -> BoxedExecutor {
        Arc::new(Self)
    }
}

#[async_trait]
impl Executor for Runner {
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> Result<Output> {
        let mut cmd = process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(%invocation, "running command");

        let mut child = cmd.spawn()?;

        let mut stdin = child.stdin.take();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let mut out = Vec::new();
        let mut err = Vec::new();

        let finished = tokio::time::timeout(timeout, async {
            if let (Some(pipe), Some(input)) = (stdin.as_mut(), invocation.stdin.as_deref()) {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            // Close stdin so tools reading until EOF (`tc -batch -`) can finish.
            drop(stdin.take());

            tokio::try_join!(drain(stdout.as_mut(), &mut out), drain(stderr.as_mut(), &mut err))?;
            child.wait().await
        })
        .await;

        let captured = |code| Output {
            code,
            stdout: String::from_utf8_lossy(&out).to_string(),
            stderr: String::from_utf8_lossy(&err).to_string(),
        };

        match finished {
            Ok(status) => {
                let output = captured(status?.code());
                tracing::debug!(?output.code, stdout = %output.stdout.trim(), "command finished");

                if !output.is_success() {
                    tracing::debug!(?output.stderr, ?output.code, %invocation, "command returned non-zero status");
                    return Err(Error::NonZero(output));
                }

                Ok(output)
            }
            Err(_) => {
                tracing::warn!(%invocation, ?timeout, "command did not complete in time, outcome undetermined");
                Err(Error::TimedOut(timeout, captured(None)))
            }
        }
    }
}

/// Reads `reader` to the end into `buf`. Bytes read before a cancellation stay in `buf`.
async fn drain<R: AsyncRead + Unpin>(reader: Option<&mut R>, buf: &mut Vec<u8>) -> io::Result<()> {
    if let Some(reader) = reader {
        reader.read_to_end(buf).await?;
    }
    Ok(())
}
