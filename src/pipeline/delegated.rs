//! Tool-delegated pipeline driver.
//!
//! Steps run in a fixed order whatever order the flags came in:
//! clean, fetch-seed, snapshot, stage3 (builder phase one), livecd (builder
//! phase two). Before either builder phase the host is scanned for a running
//! builder; the lock file alone does not see builders started by hand.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::clean::clean_work;
use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::finalize::{publish, BootableImage};
use crate::lock::BuildLock;
use crate::process::{Cmd, FailureKind};
use crate::seed::fetch_seed;
use crate::snapshot::build_snapshot;
use crate::timing::Timer;

use super::require_inputs;
use super::specs::{write_specs, SpecPaths, REL_TYPE};

/// Which steps of the delegated pipeline to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelegatedPlan {
    pub clean: bool,
    pub fetch_seed: bool,
    pub snapshot: bool,
    pub stage3: bool,
    pub livecd: bool,
}

impl DelegatedPlan {
    /// fetch-seed, snapshot, stage3 and livecd.
    pub fn all() -> Self {
        Self {
            clean: false,
            fetch_seed: true,
            snapshot: true,
            stage3: true,
            livecd: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.clean || self.fetch_seed || self.snapshot || self.stage3 || self.livecd)
    }

    fn runs_builder(&self) -> bool {
        self.stage3 || self.livecd
    }
}

/// Run the requested steps. Returns the published image when the livecd
/// phase ran.
pub fn run_delegated(ctx: &BuildContext, plan: DelegatedPlan) -> Result<Option<BootableImage>> {
    let _lock = BuildLock::acquire(&ctx.layout.lock_file())?;

    // Refuse before touching anything.
    if plan.runs_builder() {
        refuse_running_builder(ctx)?;
    }

    if plan.clean {
        let timer = Timer::start("Clean");
        clean_work(ctx)?;
        timer.finish();
    }
    if plan.fetch_seed {
        let timer = Timer::start("Fetch seed");
        fetch_seed(ctx)?;
        timer.finish();
    }
    if plan.snapshot {
        let timer = Timer::start("Snapshot");
        build_snapshot(ctx)?;
        timer.finish();
    }
    if !plan.runs_builder() {
        return Ok(None);
    }

    let paths = SpecPaths::new(ctx.config, &ctx.layout);
    let builder_iso = paths
        .builds_dir
        .join(REL_TYPE)
        .join(ctx.layout.iso_file_name());
    write_specs(ctx.config, &paths, &builder_iso)?;

    if plan.stage3 {
        require_inputs(&ctx.layout)?;
        let timer = Timer::start("Builder phase 1: livecd-stage1");
        stage_inputs(ctx, &paths)?;
        refuse_running_builder(ctx)?;
        run_builder(ctx, "Builder stage 1", &paths.stage1_spec, FailureKind::Command)?;
        timer.finish();
    }

    if !plan.livecd {
        return Ok(None);
    }
    let timer = Timer::start("Builder phase 2: livecd-stage2");
    refuse_running_builder(ctx)?;
    run_builder(ctx, "Builder stage 2", &paths.stage2_spec, FailureKind::ImageBuild)?;
    let iso = newest_iso(&paths.builds_dir)?.ok_or_else(|| {
        BuildError::ArtifactMissing(format!(
            "builder finished but no .iso exists under {}",
            paths.builds_dir.display()
        ))
    })?;
    info!(iso = %iso.display(), "builder produced ISO");
    let image = publish(ctx, &iso, "delegated")?;
    timer.finish();
    Ok(Some(image))
}

fn run_builder(ctx: &BuildContext, stage: &str, spec: &Path, kind: FailureKind) -> Result<()> {
    ctx.begin_stage(stage);
    ctx.run(
        Cmd::new(&ctx.config.builder)
            .arg("-f")
            .arg_path(spec)
            .fails_as(kind)
            .error_msg(format!("{} failed ({})", ctx.config.builder, spec.display())),
    )?;
    Ok(())
}

/// Copy the cached seed and snapshot to where the builder expects them.
fn stage_inputs(ctx: &BuildContext, paths: &SpecPaths) -> Result<()> {
    copy_if_changed(&ctx.layout.seed_archive(), &paths.seed)?;
    copy_if_changed(&ctx.layout.snapshot(), &paths.snapshot)
}

fn copy_if_changed(src: &Path, dst: &Path) -> Result<()> {
    let same_size = match (fs::metadata(src), fs::metadata(dst)) {
        (Ok(a), Ok(b)) => a.len() == b.len(),
        _ => false,
    };
    if same_size {
        debug!(dst = %dst.display(), "already staged");
        return Ok(());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).io_context(|| format!("Failed to create {}", parent.display()))?;
    }
    println!("  Staging {} -> {}", src.display(), dst.display());
    fs::copy(src, dst)
        .io_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Fail with `Busy` if a builder process is already running.
fn refuse_running_builder(ctx: &BuildContext) -> Result<()> {
    let result = ctx.run(
        Cmd::new("pgrep")
            .args(["-af", ctx.config.builder.as_str()])
            .accept_exit(1)
            .advisory(),
    )?;
    let conflicts = builder_processes(&result.stdout, std::process::id());
    if conflicts.is_empty() {
        return Ok(());
    }
    Err(BuildError::Busy(
        conflicts
            .iter()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
    ))
}

/// `pgrep -a` lines, excluding our own pid.
pub fn builder_processes(pgrep_output: &str, own_pid: u32) -> Vec<String> {
    pgrep_output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            line.split_whitespace()
                .next()
                .and_then(|pid| pid.parse::<u32>().ok())
                .is_some_and(|pid| pid != own_pid)
        })
        .map(str::to_string)
        .collect()
}

/// Most recently modified `.iso` below `dir`.
pub fn newest_iso(dir: &Path) -> Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("iso")
        {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| BuildError::Io {
                context: format!("Failed to stat {}", entry.path().display()),
                source: e.into(),
            })?
            .modified()
            .io_context(|| format!("Failed to read mtime of {}", entry.path().display()))?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.into_path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn pgrep_output_excludes_self_and_noise() {
        let output = "4242 /usr/bin/python3 /usr/bin/catalyst -f stage1.spec\n\
                      100 livecd build --livecd\n\
                      \n\
                      garbage line\n";
        let found = builder_processes(output, 100);
        assert_eq!(found, vec!["4242 /usr/bin/python3 /usr/bin/catalyst -f stage1.spec"]);
        assert!(builder_processes("", 1).is_empty());
    }

    #[test]
    fn newest_iso_wins() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("default/old.iso");
        let new = temp.path().join("default/nested/new.iso");
        fs::create_dir_all(new.parent().unwrap()).unwrap();
        fs::write(&old, b"old").unwrap();
        fs::write(temp.path().join("default/notes.txt"), b"x").unwrap();
        fs::write(&new, b"new").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(newest_iso(temp.path()).unwrap(), Some(new));
    }

    #[test]
    fn no_iso_is_none() {
        let temp = TempDir::new().unwrap();
        assert_eq!(newest_iso(temp.path()).unwrap(), None);
        assert_eq!(newest_iso(&temp.path().join("absent")).unwrap(), None);
    }

    #[test]
    fn plan_all_excludes_clean() {
        let plan = DelegatedPlan::all();
        assert!(!plan.clean && plan.fetch_seed && plan.livecd);
        assert!(DelegatedPlan::default().is_empty());
    }
}
