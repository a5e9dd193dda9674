//! Snapshot builder - freezes the package repository into a squashfs.
//!
//! The snapshot is loop-mounted read-only inside the build root, so builds
//! never resolve dependencies against a live, changing tree. It is built once
//! and reused by every later build; delete the file to re-snapshot.

use std::fs;
use std::path::PathBuf;

use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::files::{file_size, human_size, is_non_empty_file};
use crate::process::{Cmd, FailureKind};

/// Compression arguments. The snapshot is reused across many builds, so the
/// slowest, tightest settings pay off.
pub const SNAPSHOT_COMPRESSION: &[&str] = &["-comp", "xz", "-b", "1M", "-Xdict-size", "100%"];

#[derive(Debug, Clone)]
pub struct RepositorySnapshot {
    pub path: PathBuf,
    pub size: u64,
    /// False when an existing snapshot was reused.
    pub created: bool,
}

/// Build the repository snapshot unless it already exists.
pub fn build_snapshot(ctx: &BuildContext) -> Result<RepositorySnapshot> {
    ctx.begin_stage("Snapshot");
    let repo = &ctx.config.repo_dir;
    let output = ctx.layout.snapshot();

    if output.exists() {
        let size = file_size(&output);
        println!("Snapshot already exists at {} ({})", output.display(), human_size(size));
        return Ok(RepositorySnapshot {
            path: output,
            size,
            created: false,
        });
    }

    if !repo.is_dir() {
        return Err(BuildError::precondition(
            format!(
                "Package repository not found at {}. Synchronize the repository first.",
                repo.display()
            ),
            "emerge --sync",
        ));
    }

    fs::create_dir_all(&ctx.layout.snapshots_dir)
        .io_context(|| format!("Failed to create {}", ctx.layout.snapshots_dir.display()))?;

    println!("Snapshotting {} -> {}", repo.display(), output.display());
    let result = ctx.run(
        Cmd::new("mksquashfs")
            .arg_path(repo)
            .arg_path(&output)
            .args(SNAPSHOT_COMPRESSION)
            .args(["-noappend", "-no-progress"])
            .fails_as(FailureKind::Archive)
            .error_msg("mksquashfs failed. Install squashfs-tools"),
    );
    if let Err(e) = result {
        // A partial file would pass the existence check on the next run.
        let _ = fs::remove_file(&output);
        return Err(e);
    }

    if !is_non_empty_file(&output) {
        let _ = fs::remove_file(&output);
        return Err(BuildError::Archive(format!(
            "mksquashfs reported success but {} is missing or empty",
            output.display()
        )));
    }

    let size = file_size(&output);
    println!("Snapshot created: {}", human_size(size));
    Ok(RepositorySnapshot {
        path: output,
        size,
        created: true,
    })
}
