//! Clean command - removes the work area.

use anyhow::Result;

use livecd_builder::clean;
use livecd_builder::config::Config;
use livecd_builder::context::BuildContext;
use livecd_builder::process::HostRunner;

use super::StageContext;

pub fn cmd_clean(config: &Config) -> Result<()> {
    let runner = HostRunner;
    let ctx = BuildContext::new(config, &runner);
    let removed = clean::clean(&ctx).in_stage(&ctx)?;
    println!(
        "Clean complete ({} removed; seeds, snapshots and output preserved).",
        removed.len()
    );
    Ok(())
}
