//! Mount guard and mount-table inspection.
//!
//! [`MountStack`] records every mount it establishes and unmounts them in
//! exact reverse order when dropped, whichever way the owning scope exits.
//! Teardown problems are logged and never turned into errors, so a stuck
//! mount cannot hide the failure that caused the unwind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::process::{Cmd, FailureKind};

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// What to mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// `mount --bind <host path>`
    Bind(PathBuf),
    /// Fresh tmpfs with the given options.
    Tmpfs { name: &'static str, options: &'static str },
    /// The kernel's process-information filesystem.
    Proc,
    /// Read-only loopback mount of a filesystem image.
    LoopReadOnly { image: PathBuf, fstype: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Human name used in messages (`dev`, `snapshot`, ...).
    pub label: &'static str,
    pub source: MountSource,
    pub target: PathBuf,
}

impl MountSpec {
    pub fn new(label: &'static str, source: MountSource, target: PathBuf) -> Self {
        Self { label, source, target }
    }

    fn command(&self) -> Cmd {
        let cmd = Cmd::new("mount");
        let cmd = match &self.source {
            MountSource::Bind(host) => cmd.arg("--bind").arg_path(host),
            MountSource::Tmpfs { name, options } => {
                cmd.args(["-t", "tmpfs", "-o", options, name])
            }
            MountSource::Proc => cmd.args(["-t", "proc", "proc"]),
            MountSource::LoopReadOnly { image, fstype } => {
                cmd.args(["-t", fstype, "-o", "loop,ro"]).arg_path(image)
            }
        };
        cmd.arg_path(&self.target)
            .fails_as(FailureKind::Mount)
            .error_msg(format!("Mounting {} failed", self.label))
    }
}

/// Ordered set of live mounts with guaranteed reverse-order release.
pub struct MountStack<'c, 'a> {
    ctx: &'c BuildContext<'a>,
    active: Vec<PathBuf>,
}

impl<'c, 'a> MountStack<'c, 'a> {
    pub fn new(ctx: &'c BuildContext<'a>) -> Self {
        Self {
            ctx,
            active: Vec::new(),
        }
    }

    /// Establish one mount. On failure nothing is pushed; the caller's `?`
    /// drops the stack, which releases everything mounted so far.
    pub fn mount(&mut self, spec: &MountSpec) -> Result<()> {
        fs::create_dir_all(&spec.target)
            .io_context(|| format!("Failed to create mount point {}", spec.target.display()))?;
        if self.ctx.interrupted() {
            return Err(BuildError::Interrupted);
        }
        // A mount that completed must be recorded even if a signal arrived
        // while it ran, or teardown would skip it.
        self.ctx.run_uninterruptible(spec.command())?;
        debug!(target = %spec.target.display(), label = spec.label, "mounted");
        self.active.push(spec.target.clone());
        if self.ctx.interrupted() {
            return Err(BuildError::Interrupted);
        }
        Ok(())
    }

    /// Mount points in establishment order.
    pub fn active(&self) -> &[PathBuf] {
        &self.active
    }

    /// Unmount everything in reverse order. Returns how many mount points
    /// could not be released; each is logged.
    pub fn teardown(&mut self) -> usize {
        let mut stuck = 0;
        while let Some(target) = self.active.pop() {
            if !self.unmount(&target) {
                stuck += 1;
            }
        }
        stuck
    }

    fn unmount(&self, target: &Path) -> bool {
        let attempt = |cmd: Cmd| match self.ctx.run_uninterruptible(cmd) {
            Ok(result) => result.success(),
            Err(e) => {
                warn!(target = %target.display(), error = %e, "umount could not run");
                false
            }
        };

        if attempt(Cmd::new("umount").arg_path(target).advisory()) {
            debug!(target = %target.display(), "unmounted");
            return true;
        }
        // Busy mounts are detached lazily so the rest of the stack still drains.
        if attempt(Cmd::new("umount").arg("-l").arg_path(target).advisory()) {
            warn!(target = %target.display(), "mount was busy, detached lazily");
            return true;
        }
        warn!(target = %target.display(), "could not unmount; left in place");
        println!("  [WARN] Could not unmount {}", target.display());
        false
    }
}

impl Drop for MountStack<'_, '_> {
    fn drop(&mut self) {
        if !self.active.is_empty() {
            debug!(count = self.active.len(), "tearing down mounts");
            self.teardown();
        }
    }
}

/// Mount points at or below `path`, according to the host mount table.
pub fn mounts_under(path: &Path) -> Result<Vec<PathBuf>> {
    let table = match fs::read_to_string(MOUNTINFO) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).io_context(|| format!("Failed to read {MOUNTINFO}"));
        }
    };
    let root = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Ok(filter_under(parse_mountinfo(&table), &root))
}

fn filter_under(points: Vec<PathBuf>, root: &Path) -> Vec<PathBuf> {
    let mut under: Vec<PathBuf> = points.into_iter().filter(|p| p.starts_with(root)).collect();
    // Deepest first, the order they would have to be released in.
    under.sort_by(|a, b| b.components().count().cmp(&a.components().count()));
    under.dedup();
    under
}

/// Mount points (field 5) from `/proc/self/mountinfo` content.
pub fn parse_mountinfo(table: &str) -> Vec<PathBuf> {
    table
        .lines()
        .filter_map(|line| line.split(' ').nth(4))
        .map(|field| PathBuf::from(unescape_octal(field)))
        .collect()
}

/// Undo the kernel's `\040`-style escaping of space, tab, newline and backslash.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
