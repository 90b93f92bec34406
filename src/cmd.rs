// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Everything chored does to a repository goes through `git` subprocesses run
//! by a [`CommandRunner`]. Keeping this behind a trait lets the version bump
//! logic be exercised against scripted command output instead of real
//! repositories.

use std::{
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Layer of indirection for running external commands.
pub trait CommandRunner: Send + Sync {
    /// Run command with inherited standard I/O.
    ///
    /// # Errors
    ///
    /// - Return [`CmdError::Subprocess`] if command exits unsuccessfully.
    /// - Return [`CmdError::Spawn`] if command cannot be started.
    fn run(&self, cmd: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Run command and capture its standard output.
    ///
    /// Trailing newline is chomped. If `allow_failure` is set, then an
    /// unsuccessful exit yields an empty string instead of an error.
    ///
    /// # Errors
    ///
    /// - Return [`CmdError::Subprocess`] if command exits unsuccessfully, and
    ///   failure is not allowed.
    /// - Return [`CmdError::Spawn`] if command cannot be started.
    fn run_output(
        &self,
        cmd: &[String],
        allow_failure: bool,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Check if path exists relative to working directory of runner.
    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send;
}

/// Build command line out of string slices.
pub fn cmdline<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter().map(Into::into).collect()
}

/// Command runner through real subprocesses.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner {
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl ProcessRunner {
    /// Construct new process runner in current working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `cwd` instead.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add environment variables to every command.
    pub fn with_envs(
        mut self,
        envs: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.envs
            .extend(envs.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    fn command(&self, cmd: &[String]) -> Result<Command> {
        let (program, args) = cmd.split_first().ok_or(CmdError::EmptyCommand)?;
        let mut command = Command::new(program);
        command.args(args).envs(self.envs.iter().cloned());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        Ok(command)
    }
}

impl CommandRunner for ProcessRunner {
    #[instrument(skip(self), level = "debug")]
    async fn run(&self, cmd: &[String]) -> Result<()> {
        debug!("run {}", cmd.join(" "));
        let status = self
            .command(cmd)?
            .status()
            .await
            .map_err(|source| CmdError::Spawn {
                command: cmd.join(" "),
                source,
            })?;

        if !status.success() {
            return Err(CmdError::Subprocess {
                command: cmd.join(" "),
                status: status.code(),
                stderr: String::new(),
            });
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn run_output(&self, cmd: &[String], allow_failure: bool) -> Result<String> {
        debug!("run {}", cmd.join(" "));
        let output = self
            .command(cmd)?
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CmdError::Spawn {
                command: cmd.join(" "),
                source,
            })?;

        if !output.status.success() {
            let stderr = chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned());
            if allow_failure {
                debug!("ignoring failure of {}: {stderr}", cmd.join(" "));
                return Ok(String::new());
            }

            return Err(CmdError::Subprocess {
                command: cmd.join(" "),
                status: output.status.code(),
                stderr,
            });
        }

        Ok(chomp(
            String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
        ))
    }

    async fn exists(&self, path: &Path) -> bool {
        let path = match &self.cwd {
            Some(cwd) => cwd.join(path),
            None => path.to_path_buf(),
        };

        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

impl<T: CommandRunner> CommandRunner for &T {
    async fn run(&self, cmd: &[String]) -> Result<()> {
        (**self).run(cmd).await
    }

    async fn run_output(&self, cmd: &[String], allow_failure: bool) -> Result<String> {
        (**self).run_output(cmd, allow_failure).await
    }

    async fn exists(&self, path: &Path) -> bool {
        (**self).exists(path).await
    }
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// Command error types.
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// Command line has no program to run.
    #[error("cannot run empty command")]
    EmptyCommand,

    /// Command could not be started.
    #[error("failed to start {command:?}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command exited unsuccessfully.
    #[error("command {command:?} failed with status {}{}", display_status(.status), display_stderr(.stderr))]
    Subprocess {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

fn display_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "<signal>".into(), |code| code.to_string())
}

fn display_stderr(stderr: &String) -> String {
    if stderr.is_empty() {
        return String::new();
    }

    format!(":\n{stderr}")
}

/// Friendly result alias :3
type Result<T, E = CmdError> = std::result::Result<T, E>;
