//! Manual pipeline driver.
//!
//! `stage1` turns the seed into a configured root with packages installed,
//! then releases every mount. `stage2` compresses that root into an ISO and
//! publishes it. `all` runs both back to back.

use tracing::info;

use crate::chroot::{configure_system, install_packages, provision};
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::finalize::{publish, BootableImage};
use crate::image::{assemble_with, default_strategies, IsoStrategy};
use crate::lock::BuildLock;
use crate::timing::Timer;

use super::require_inputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualTarget {
    Stage1,
    Stage2,
    All,
}

impl ManualTarget {
    fn runs_stage1(self) -> bool {
        matches!(self, Self::Stage1 | Self::All)
    }

    fn runs_stage2(self) -> bool {
        matches!(self, Self::Stage2 | Self::All)
    }
}

/// Run the manual driver. Returns the published image when stage 2 ran.
pub fn run_manual(ctx: &BuildContext, target: ManualTarget) -> Result<Option<BootableImage>> {
    run_manual_with(ctx, target, &default_strategies())
}

/// [`run_manual`] with an explicit ISO strategy list.
pub fn run_manual_with(
    ctx: &BuildContext,
    target: ManualTarget,
    strategies: &[Box<dyn IsoStrategy>],
) -> Result<Option<BootableImage>> {
    if target.runs_stage1() {
        require_inputs(&ctx.layout)?;
    }
    let _lock = BuildLock::acquire(&ctx.layout.lock_file())?;

    if target.runs_stage1() {
        let timer = Timer::start("Stage 1: root filesystem");
        stage1(ctx)?;
        timer.finish();
    }

    if !target.runs_stage2() {
        return Ok(None);
    }
    let timer = Timer::start("Stage 2: ISO");
    let image = stage2(ctx, strategies)?;
    timer.finish();
    Ok(Some(image))
}

fn stage1(ctx: &BuildContext) -> Result<()> {
    let root = provision(ctx)?;

    configure_system(ctx, root.path())?;
    let report = install_packages(ctx, root.path())?;
    info!(
        installed = report.installed.len(),
        failed = report.failed.len(),
        "package phase complete"
    );

    let path = root.path().to_path_buf();
    let stuck = root.teardown();
    if stuck > 0 {
        return Err(BuildError::mount(
            &path,
            format!("{stuck} mount(s) could not be released; run: umount -R {}", path.display()),
        ));
    }
    Ok(())
}

fn stage2(ctx: &BuildContext, strategies: &[Box<dyn IsoStrategy>]) -> Result<BootableImage> {
    let layout = &ctx.layout;
    if !layout.extraction_marker().exists() {
        return Err(BuildError::precondition(
            format!("No prepared build root at {}.", layout.build_root().display()),
            "livecd manual stage1",
        ));
    }

    let assembled = assemble_with(ctx, &layout.build_root(), strategies)?;
    publish(ctx, &assembled.path, "manual")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_stage_selection() {
        assert!(ManualTarget::Stage1.runs_stage1());
        assert!(!ManualTarget::Stage1.runs_stage2());
        assert!(!ManualTarget::Stage2.runs_stage1());
        assert!(ManualTarget::All.runs_stage1() && ManualTarget::All.runs_stage2());
    }
}
