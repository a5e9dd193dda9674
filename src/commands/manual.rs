//! Manual command - sequences the pipeline without an external builder.

use anyhow::Result;

use livecd_builder::config::Config;
use livecd_builder::context::BuildContext;
use livecd_builder::pipeline::{run_manual, ManualTarget};
use livecd_builder::process::HostRunner;

use super::StageContext;

pub fn cmd_manual(config: &Config, target: ManualTarget) -> Result<()> {
    println!("=== Manual LiveCD Build ({target:?}) ===");
    let runner = HostRunner;
    let ctx = BuildContext::new(config, &runner);
    match run_manual(&ctx, target).in_stage(&ctx)? {
        Some(image) => println!("\n[OK] Published {}", image.path.display()),
        None => println!("\n[OK] Build root ready; run `livecd manual stage2` to produce the ISO"),
    }
    Ok(())
}
