//! Build context shared across all pipeline stages.
//!
//! Bundles the configuration, the on-disk layout, the process runner and the
//! build log, and is the single place where a command's fatal/advisory policy
//! is applied.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::buildlog::BuildLog;
use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::layout::Layout;
use crate::process::{Cmd, CommandResult, Policy, Runner};
use crate::signal;

pub struct BuildContext<'a> {
    pub config: &'a Config,
    pub layout: Layout,
    runner: &'a dyn Runner,
    log: BuildLog,
    interrupt: &'a AtomicBool,
}

impl<'a> BuildContext<'a> {
    /// Create a context wired to the process-wide signal flag.
    pub fn new(config: &'a Config, runner: &'a dyn Runner) -> Self {
        Self::with_interrupt(config, runner, signal::flag())
    }

    /// Create a context polling a caller-supplied interrupt flag.
    pub fn with_interrupt(
        config: &'a Config,
        runner: &'a dyn Runner,
        interrupt: &'a AtomicBool,
    ) -> Self {
        let layout = config.layout();
        let log = BuildLog::new(&layout.logs_dir());
        Self {
            config,
            layout,
            runner,
            log,
            interrupt,
        }
    }

    /// Print a stage banner and route subsequent output to its log.
    pub fn begin_stage(&self, stage: &str) {
        println!("\n=== {} ===", stage);
        self.log.begin_stage(&stage.to_ascii_lowercase().replace(' ', "-"));
    }

    pub fn log(&self) -> &BuildLog {
        &self.log
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Run a command, record it, and apply its policy.
    ///
    /// Mandatory failures become the error selected by the command's
    /// `FailureKind`; advisory failures are logged and returned as `Ok`.
    pub fn run(&self, cmd: Cmd) -> Result<CommandResult> {
        if self.interrupted() {
            return Err(BuildError::Interrupted);
        }
        let result = self.execute(&cmd)?;
        if self.interrupted() {
            return Err(BuildError::Interrupted);
        }
        self.apply_policy(&cmd, result)
    }

    /// Like [`run`](Self::run) but ignores a pending interrupt. Only for
    /// teardown, which must proceed after a signal.
    pub fn run_uninterruptible(&self, cmd: Cmd) -> Result<CommandResult> {
        let result = self.execute(&cmd)?;
        self.apply_policy(&cmd, result)
    }

    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        debug!(command = %cmd, "running");
        let result = self.runner.run(cmd).map_err(|source| BuildError::Spawn {
            program: cmd.program().to_string(),
            source,
        })?;
        self.log.record(cmd, &result);
        Ok(result)
    }

    fn apply_policy(&self, cmd: &Cmd, result: CommandResult) -> Result<CommandResult> {
        if cmd.accepts(&result) {
            return Ok(result);
        }
        match cmd.policy() {
            Policy::Advisory => {
                self.log
                    .note(&format!("advisory step failed (exit code {}), continuing", result.code()));
                warn!(
                    command = %cmd,
                    code = result.code(),
                    stage = %self.log.current_stage(),
                    "advisory step failed, continuing"
                );
                println!("  [WARN] {} (exit code {}), continuing", cmd, result.code());
                Ok(result)
            }
            Policy::Mandatory => Err(cmd.failure(&result)),
        }
    }
}
