//! Fetch-seed and snapshot commands.

use anyhow::Result;

use livecd_builder::config::Config;
use livecd_builder::context::BuildContext;
use livecd_builder::files::human_size;
use livecd_builder::process::HostRunner;
use livecd_builder::seed::fetch_seed;
use livecd_builder::snapshot::build_snapshot;

use super::StageContext;

pub fn cmd_fetch_seed(config: &Config) -> Result<()> {
    let runner = HostRunner;
    let ctx = BuildContext::new(config, &runner);
    let seed = fetch_seed(&ctx).in_stage(&ctx)?;
    if seed.downloaded {
        println!("[OK] Seed downloaded: {} ({})", seed.path.display(), human_size(seed.size));
    } else {
        println!("[OK] Seed cached: {}", seed.path.display());
    }
    Ok(())
}

pub fn cmd_snapshot(config: &Config) -> Result<()> {
    let runner = HostRunner;
    let ctx = BuildContext::new(config, &runner);
    let snapshot = build_snapshot(&ctx).in_stage(&ctx)?;
    if snapshot.created {
        println!("[OK] Snapshot created: {} ({})", snapshot.path.display(), human_size(snapshot.size));
    } else {
        println!("[OK] Snapshot reused: {}", snapshot.path.display());
    }
    Ok(())
}
