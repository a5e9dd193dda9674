//! Work-area cleaning.
//!
//! Removes `work/` and the delegated builder's `tmp/`. Seeds, snapshots and
//! published images are never touched. Deleting a tree that still has a
//! mount below it would recurse into the host's /dev or /sys, so any active
//! mount is a hard refusal.

use std::fs;
use std::path::PathBuf;

use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::lock::BuildLock;
use crate::mounts::mounts_under;

/// Take the build lock and clean. Refuses while another build runs.
pub fn clean(ctx: &BuildContext) -> Result<Vec<PathBuf>> {
    let _lock = BuildLock::acquire(&ctx.layout.lock_file())?;
    clean_work(ctx)
}

/// Clean without taking the lock; the caller must already hold it.
pub fn clean_work(ctx: &BuildContext) -> Result<Vec<PathBuf>> {
    ctx.begin_stage("Clean");
    let targets = [
        ctx.layout.work_dir.clone(),
        ctx.config.builder_storedir.join("tmp"),
    ];

    for target in &targets {
        let active = mounts_under(target)?;
        if let Some(first) = active.first() {
            return Err(BuildError::mount(
                first,
                format!(
                    "{} mount(s) active under {}; refusing to delete. Release them with: umount -R {}",
                    active.len(),
                    target.display(),
                    target.display()
                ),
            ));
        }
    }

    let mut removed = Vec::new();
    for target in targets {
        if target.exists() {
            println!("  Removing {}", target.display());
            fs::remove_dir_all(&target)
                .io_context(|| format!("Failed to remove {}", target.display()))?;
            removed.push(target);
        }
    }
    if removed.is_empty() {
        println!("  Nothing to clean");
    }
    Ok(removed)
}
