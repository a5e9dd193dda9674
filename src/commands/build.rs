//! Build command - tool-delegated pipeline.

use anyhow::{bail, Result};

use livecd_builder::config::Config;
use livecd_builder::context::BuildContext;
use livecd_builder::pipeline::{run_delegated, DelegatedPlan};
use livecd_builder::process::HostRunner;

use super::StageContext;

/// Execute the build command.
pub fn cmd_build(config: &Config, plan: DelegatedPlan) -> Result<()> {
    if plan.is_empty() {
        bail!(
            "Nothing to do. Pass at least one of --fetch-seed, --snapshot, --stage3, --livecd, --all, --clean"
        );
    }

    println!("=== Delegated LiveCD Build ({}) ===", config.builder);
    let runner = HostRunner;
    let ctx = BuildContext::new(config, &runner);
    match run_delegated(&ctx, plan).in_stage(&ctx)? {
        Some(image) => println!("\n[OK] Published {}", image.path.display()),
        None => println!("\n[OK] Requested steps complete"),
    }
    Ok(())
}
