//! Per-stage capture of external process output.
//!
//! Each stage gets `work/logs/<stage>.log`. The file is truncated the first
//! time a stage begins in a run and only appended to afterwards, so a failed
//! build leaves the full transcript of the failing stage behind.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use crate::process::{Cmd, CommandResult};

pub struct BuildLog {
    dir: PathBuf,
    current: RefCell<String>,
    started: RefCell<HashSet<String>>,
}

impl BuildLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            current: RefCell::new("general".to_string()),
            started: RefCell::new(HashSet::new()),
        }
    }

    /// Switch the stage subsequent invocations are recorded under.
    pub fn begin_stage(&self, stage: &str) {
        *self.current.borrow_mut() = stage.to_string();
        if self.started.borrow_mut().insert(stage.to_string()) {
            let path = self.path_for(stage);
            if let Err(e) = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, "")) {
                warn!(path = %path.display(), error = %e, "cannot reset stage log");
            }
        }
    }

    pub fn current_stage(&self) -> String {
        self.current.borrow().clone()
    }

    pub fn path_for(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{stage}.log"))
    }

    /// Append one invocation. Logging problems never fail the build.
    pub fn record(&self, cmd: &Cmd, result: &CommandResult) {
        let path = self.path_for(&self.current.borrow());
        if let Err(e) = self.append(&path, cmd, result) {
            warn!(path = %path.display(), error = %e, "cannot write build log");
        }
    }

    /// Append a remark about the last invocation.
    pub fn note(&self, line: &str) {
        let path = self.path_for(&self.current.borrow());
        let written = fs::create_dir_all(&self.dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path))
            .and_then(|mut file| writeln!(file, "! {line}\n"));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "cannot write build log");
        }
    }

    fn append(&self, path: &Path, cmd: &Cmd, result: &CommandResult) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "-".to_string());
        writeln!(file, "[{stamp}] $ {cmd}")?;
        if !result.stdout.is_empty() {
            writeln!(file, "--- stdout ---")?;
            file.write_all(result.stdout.as_bytes())?;
            if !result.stdout.ends_with('\n') {
                writeln!(file)?;
            }
        }
        if !result.stderr.is_empty() {
            writeln!(file, "--- stderr ---")?;
            file.write_all(result.stderr.as_bytes())?;
            if !result.stderr.ends_with('\n') {
                writeln!(file)?;
            }
        }
        writeln!(file, "--- exit code {} ---\n", result.code())?;
        Ok(())
    }
}
