//! Typed process invocations.
//!
//! Every external tool the pipeline shells out to (curl, tar, mount, chroot,
//! mksquashfs, the ISO tools, the delegated builder) is described by a
//! [`Cmd`] and executed through a [`Runner`]. Whether a nonzero exit aborts
//! the build is decided by the command's [`Policy`], applied in exactly one
//! place: `BuildContext::run`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::error::BuildError;

/// How a nonzero exit status is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Nonzero exit aborts the current stage.
    Mandatory,
    /// Nonzero exit is logged as a warning and the pipeline continues.
    Advisory,
}

/// Which error a mandatory failure turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Command,
    Transfer,
    Archive,
    Mount,
    ImageBuild,
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for one external invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    policy: Policy,
    kind: FailureKind,
    /// Nonzero exit codes that are answers rather than failures.
    accepted: Vec<i32>,
    /// Custom error message prefix.
    error_prefix: Option<String>,
}

impl Cmd {
    /// Create a new command builder. Mandatory by default.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            policy: Policy::Mandatory,
            kind: FailureKind::Command,
            accepted: Vec::new(),
            error_prefix: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Log nonzero exit instead of failing.
    pub fn advisory(mut self) -> Self {
        self.policy = Policy::Advisory;
        self
    }

    /// Treat exit `code` like success, e.g. `pgrep` exiting 1 for no match.
    pub fn accept_exit(mut self, code: i32) -> Self {
        self.accepted.push(code);
        self
    }

    /// Whether `result` needs no policy decision.
    pub fn accepts(&self, result: &CommandResult) -> bool {
        result.success() || self.accepted.contains(&result.code())
    }

    /// Map a mandatory failure to a specific error class.
    pub fn fails_as(mut self, kind: FailureKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Value following `flag` in the argument list, e.g. `-o <file>`.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Turn a failed result into the error this command maps to.
    pub fn failure(&self, result: &CommandResult) -> BuildError {
        let prefix = self
            .error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.program));
        let code = result.code();
        let stderr = result.stderr_trimmed().to_string();
        let detail = if stderr.is_empty() {
            format!("{prefix} (exit code {code})")
        } else {
            format!("{prefix} (exit code {code}): {stderr}")
        };

        match self.kind {
            FailureKind::Command => BuildError::CommandFailed {
                context: prefix,
                code,
                stderr,
            },
            FailureKind::Transfer => BuildError::Transfer {
                url: self.args.last().cloned().unwrap_or_default(),
                reason: detail,
            },
            FailureKind::Archive => BuildError::Archive(detail),
            FailureKind::Mount => BuildError::Mount {
                target: self.args.last().map(PathBuf::from).unwrap_or_default(),
                reason: detail,
            },
            FailureKind::ImageBuild => BuildError::ImageBuild(detail),
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes commands. The host implementation spawns processes; tests
/// substitute a recording fake.
pub trait Runner {
    /// Run to completion and capture output. Only spawn failures are errors;
    /// the exit status is reported in the result.
    fn run(&self, cmd: &Cmd) -> io::Result<CommandResult>;
}

/// Runs commands on the host with captured stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl Runner for HostRunner {
    fn run(&self, cmd: &Cmd) -> io::Result<CommandResult> {
        let output = cmd.to_command().output()?;
        Ok(CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}
