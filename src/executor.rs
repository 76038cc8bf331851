//! Process Executor Module
//!
//! Runs the external CA tool. The child receives exactly the environment described by
//! its [`ProcessInvocation`] (nothing is inherited), stdout and stderr are drained
//! concurrently into one buffer, and the exit status is mapped onto [`PkiError`]:
//!
//! - spawn failure → [`PkiError::Spawn`]
//! - exit code other than 0, or death by signal → [`PkiError::NonZeroExit`]
//! - configured bound exceeded → [`PkiError::Timeout`] (the child is killed and reaped)
//!
//! Every error carries whatever output was captured up to that point.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::error::{CapturedOutput, PkiError, Result};

const READ_CHUNK: usize = 8192;

/// One external command, built fresh for every call
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    command: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ProcessInvocation {
    pub fn new(
        command: impl Into<PathBuf>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            env,
        }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The complete environment of the child process
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Command and arguments joined for logs and error messages
    pub fn command_line(&self) -> String {
        let mut line = self.command.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

// Environment values can hold a key passphrase, so only the keys are printed.
impl fmt::Debug for ProcessInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessInvocation")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of a successful invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub output: CapturedOutput,
}

/// Runs a [`ProcessInvocation`] to completion
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, invocation: &ProcessInvocation) -> Result<ProcessResult>;
}

/// [`Execute`] implementation backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// Executor without a bound on process runtime
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Kill the child and fail with [`PkiError::Timeout`] once `timeout` elapses.
    /// `None` waits indefinitely.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Execute for ProcessExecutor {
    async fn execute(&self, invocation: &ProcessInvocation) -> Result<ProcessResult> {
        let command_line = invocation.command_line();
        info!("Executing {}", command_line);

        let mut child = Command::new(invocation.command())
            .args(invocation.args())
            .env_clear()
            .envs(invocation.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                error!("Failed to spawn {}: {}", command_line, source);
                PkiError::Spawn {
                    command: command_line.clone(),
                    source,
                    output: CapturedOutput::default(),
                }
            })?;

        let mut buffer = Vec::new();
        let waited = match self.timeout {
            Some(limit) => {
                let bounded =
                    tokio::time::timeout(limit, drain_and_wait(&mut child, &mut buffer)).await;
                match bounded {
                    Ok(waited) => waited,
                    Err(_) => {
                        warn!("{} timed out after {:?}, killing it", command_line, limit);
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill timed out child: {}", e);
                        }
                        let output = CapturedOutput::from(buffer);
                        log_failure(&output);
                        return Err(PkiError::Timeout {
                            command: command_line,
                            after: limit,
                            output,
                        });
                    }
                }
            }
            None => drain_and_wait(&mut child, &mut buffer).await,
        };

        let output = CapturedOutput::from(buffer);
        let status = match waited {
            Ok(status) => status,
            Err(source) => {
                log_failure(&output);
                return Err(PkiError::Wait {
                    command: command_line,
                    source,
                    output,
                });
            }
        };

        debug!("Child process exited with {}", status);
        match status.code() {
            Some(0) => Ok(ProcessResult {
                exit_code: 0,
                output,
            }),
            exit_code => {
                log_failure(&output);
                Err(PkiError::NonZeroExit {
                    command: command_line,
                    exit_code,
                    output,
                })
            }
        }
    }
}

fn log_failure(output: &CapturedOutput) {
    error!("Child process failed, see output below");
    error!("{}", output);
}

/// Drain stdout and stderr in arrival order until both close, then reap the child
async fn drain_and_wait(child: &mut Child, buffer: &mut Vec<u8>) -> io::Result<ExitStatus> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_chunk = [0u8; READ_CHUNK];
    let mut err_chunk = [0u8; READ_CHUNK];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_chunk) => match read? {
                0 => stdout = None,
                n => buffer.extend_from_slice(&out_chunk[..n]),
            },
            read = read_chunk(&mut stderr, &mut err_chunk) => match read? {
                0 => stderr = None,
                n => buffer.extend_from_slice(&err_chunk[..n]),
            },
        }
    }

    child.wait().await
}

/// Read from an open pipe; a closed one never resolves
async fn read_chunk<R>(pipe: &mut Option<R>, chunk: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read(chunk).await,
        None => std::future::pending().await,
    }
}
