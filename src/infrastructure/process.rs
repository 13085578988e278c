//! Child process execution for the container engine CLI.
//!
//! [`run_command`] streams a long-running command (the master's log output)
//! and honours the `grizzly.returncode=<n>` token the test run prints as its
//! last line: the line is hidden and `<n>` becomes the return code.
//! [`capture`] is for short commands whose output is parsed.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::LaunchError;

/// Marker the test run prints with its real return code.
pub const RETURNCODE_TOKEN: &str = "grizzly.returncode=";

/// Return code used when the token carries no usable number.
pub const UNPARSEABLE_RETURNCODE: i32 = 123;

/// Result of a streamed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code of the process itself.
    pub exit_code: i32,
    /// Code announced with [`RETURNCODE_TOKEN`], if any line carried it.
    pub token: Option<i32>,
}

impl CommandOutcome {
    /// The token code when present, otherwise the exit code.
    pub fn code(&self) -> i32 {
        self.token.unwrap_or(self.exit_code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Do not echo output lines.
    pub silent: bool,
    /// Log the command line before running it.
    pub verbose: bool,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
}

/// Extract the return code from a line containing [`RETURNCODE_TOKEN`].
///
/// Returns `None` when the token is absent.
pub fn returncode_token(line: &str) -> Option<i32> {
    let start = line.find(RETURNCODE_TOKEN)? + RETURNCODE_TOKEN.len();
    let rest = &line[start..];
    let end = rest
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(rest.len(), |(i, _)| i);

    Some(rest[..end].parse().unwrap_or(UNPARSEABLE_RETURNCODE))
}

/// Run `program`, echoing merged stdout/stderr to our stdout line by line.
pub async fn run_command(
    program: &str,
    args: &[String],
    options: &RunOptions,
) -> Result<CommandOutcome, LaunchError> {
    let silent = options.silent;
    run_with_sink(program, args, options, |line| {
        if !silent {
            println!("{line}");
        }
    })
    .await
}

/// Like [`run_command`], but hands every visible line to `sink`.
pub async fn run_with_sink<F>(
    program: &str,
    args: &[String],
    options: &RunOptions,
    mut sink: F,
) -> Result<CommandOutcome, LaunchError>
where
    F: FnMut(&str),
{
    if options.verbose {
        info!(command = %command_line(program, args), "run_command");
    }

    let mut child = Command::new(program)
        .args(args)
        .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx));
    } else {
        drop(tx);
    }

    let mut token = None;
    while let Some(line) = rx.recv().await {
        match returncode_token(&line) {
            Some(code) => token = Some(code),
            None => sink(&line),
        }
    }

    let status = child.wait().await?;
    let outcome = CommandOutcome {
        exit_code: exit_code(status),
        token,
    };
    debug!(program, code = outcome.code(), "Command finished");
    Ok(outcome)
}

/// Run a short command and return its stdout. Non-zero exit is an error.
pub async fn capture(program: &str, args: &[String]) -> Result<String, LaunchError> {
    debug!(command = %command_line(program, args), "capture");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| LaunchError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(LaunchError::CommandFailed {
            command: command_line(program, args),
            code: exit_code(output.status),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

// Killed by a signal: no code, report a generic failure.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}
