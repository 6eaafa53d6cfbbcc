//! Command execution
//!
//! All external commands go through a `CommandRunner`. The production
//! implementation, `SystemRunner`, spawns each command in its own process
//! group, registers the PID with `ChildRegistry::global()`, feeds stdin and
//! captures output. Tests substitute a recording runner.
//!
//! In dry-run mode mutating commands are logged and reported as successful
//! without being spawned; read-only probes still execute so the preview
//! reflects the real host.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::command_args::CommandArgs;
use crate::error::{ProvisionError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// A fully resolved command, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub mutating: bool,
    pub sensitive: bool,
}

impl Invocation {
    pub fn from_args<T: CommandArgs + ?Sized>(args: &T) -> Self {
        Self {
            program: args.program().to_string(),
            args: args.to_cli_args(),
            env: args.get_env_vars(),
            stdin: args.stdin(),
            mutating: args.is_mutating(),
            sensitive: args.is_sensitive(),
        }
    }

    /// Program and arguments joined for logging.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output from a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
    /// True when the command was skipped by dry-run mode.
    pub dry_run: bool,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
            dry_run: false,
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
            success: false,
            dry_run: false,
        }
    }

    /// Return a `CommandFailed` error unless the command succeeded.
    pub fn ensure_success(&self, program: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(ProvisionError::CommandFailed {
                program: program.to_string(),
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Executes invocations.
///
/// Returns `Ok` for any command that ran, successful or not; `Err` only when
/// the command could not be executed at all.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Run a typed command and return its output, whatever the exit status.
pub fn run_command<T: CommandArgs + ?Sized>(
    runner: &dyn CommandRunner,
    args: &T,
) -> Result<CommandOutput> {
    runner.run(&Invocation::from_args(args))
}

/// Run a typed command and fail fast on a non-zero exit.
pub fn run_checked<T: CommandArgs + ?Sized>(
    runner: &dyn CommandRunner,
    args: &T,
) -> Result<CommandOutput> {
    let output = run_command(runner, args)?;
    output.ensure_success(args.program())?;
    Ok(output)
}

/// Run a read-only probe and report whether it exited 0.
pub fn probe<T: CommandArgs + ?Sized>(runner: &dyn CommandRunner, args: &T) -> Result<bool> {
    Ok(run_command(runner, args)?.success)
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let command_line = invocation.command_line();

        if self.dry_run && invocation.mutating {
            info!("[DRY RUN] Skipped: {}", command_line);
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
                success: true,
                dry_run: true,
            });
        }

        let env_keys: Vec<&str> = invocation.env.iter().map(|(k, _)| k.as_str()).collect();
        info!(env = ?env_keys, "exec: {}", command_line);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let mut child = cmd.spawn().map_err(|source| ProvisionError::CommandSpawn {
            program: invocation.program.clone(),
            source,
        })?;
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        if let (Some(input), Some(mut pipe)) = (&invocation.stdin, child.stdin.take()) {
            // A child that exits before reading all of stdin is reported by its exit status
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                warn!(error = %e, "failed to write stdin for {}", invocation.program);
            }
        }

        let waited = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let output = waited?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        if invocation.sensitive {
            debug!("{} stdout: <redacted>", invocation.program);
        } else if !stdout.trim().is_empty() {
            debug!("{} stdout:\n{}", invocation.program, stdout.trim_end());
        }

        if output.status.success() {
            debug!("{} exited successfully", invocation.program);
        } else {
            warn!(
                code = exit_code.unwrap_or(-1),
                "{} failed: {}",
                invocation.program,
                stderr.trim()
            );
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
            success: output.status.success(),
            dry_run: false,
        })
    }
}
