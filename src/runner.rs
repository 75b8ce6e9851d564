//! External command execution.
//!
//! Every git and gh invocation goes through [`CommandRunner`], which captures
//! both output streams in full while optionally echoing them to this
//! process's own stdout/stderr.

use crate::errors::CommandError;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs programs and turns non-zero exits into [`CommandError::Failed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner {
    quiet: bool,
}

impl CommandRunner {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Run `program args..` in `cwd`, teeing output unless quiet.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, CommandError> {
        self.run_inner(program, args, cwd, !self.quiet).await
    }

    /// Run a command whose stdout is JSON and decode it.
    ///
    /// Stdout is never echoed here; stderr is, unless quiet.
    pub async fn run_json<T: DeserializeOwned>(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<T, CommandError> {
        let output = self.run_inner(program, args, cwd, false).await?;
        serde_json::from_str(&output.stdout).map_err(|source| CommandError::Decode {
            command: render_command(program, args),
            source,
        })
    }

    async fn run_inner(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        echo_stdout: bool,
    ) -> Result<CommandOutput, CommandError> {
        let command = render_command(program, args);
        if self.quiet {
            debug!(%command, "Running command");
        } else {
            info!(%command, "Running command");
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(CommandError::Spawn {
                command,
                source: std::io::Error::other("child output was not captured"),
            });
        };

        let echo_stderr = !self.quiet;
        let (stdout, stderr, status) = tokio::join!(
            pump(stdout, echo_stdout.then(tokio::io::stdout)),
            pump(stderr, echo_stderr.then(tokio::io::stderr)),
            child.wait(),
        );

        let io_err = |source| CommandError::Spawn {
            command: command.clone(),
            source,
        };
        let stdout = String::from_utf8_lossy(&stdout.map_err(io_err)?).into_owned();
        let stderr = String::from_utf8_lossy(&stderr.map_err(io_err)?).into_owned();
        let status = status.map_err(io_err)?;

        if !status.success() {
            return Err(CommandError::Failed {
                command,
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Drain `reader` to the end, copying each chunk to `echo` when present.
async fn pump<R, W>(mut reader: R, mut echo: Option<W>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        captured.extend_from_slice(&buf[..n]);
        if let Some(out) = echo.as_mut() {
            // Echo is advisory; a closed terminal must not fail the command.
            if out.write_all(&buf[..n]).await.is_err() {
                echo = None;
            }
        }
    }
    if let Some(out) = echo.as_mut() {
        out.flush().await.ok();
    }
    Ok(captured)
}

/// Human-readable command line for logs and error messages.
pub fn render_command(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}
