//! Show command - displays information.

use anyhow::{Context, Result};

use livecd_builder::config::Config;
use livecd_builder::status::BuildStatus;

/// Show target for the show command.
pub enum ShowTarget {
    /// Effective configuration
    Config,
    /// Cached inputs, build root, mounts and last image
    Status,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Status => {
            BuildStatus::collect(config)
                .context("Failed to collect build status")?
                .print();
        }
    }
    Ok(())
}
