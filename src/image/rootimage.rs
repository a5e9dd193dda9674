//! RootImage - the build root compressed into the ISO's squashfs.

use std::fs;
use std::path::Path;

use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::files::{file_size, human_size, is_non_empty_file};
use crate::process::{Cmd, FailureKind};

/// Paths (relative to the root, mksquashfs wildcard syntax) left out of the
/// image. Directories stay as empty mount points.
pub const ROOT_IMAGE_EXCLUDES: &[&str] = &[
    "proc/*",
    "sys/*",
    "dev/*",
    "run/*",
    "tmp/*",
    "var/tmp/*",
    "var/cache/distfiles/*",
    "var/cache/binpkgs/*",
    "usr/src/linux*",
    "var/db/repos/gentoo/*",
];

/// `-e` takes every remaining argument as an exclude, so it comes last.
pub fn root_image_command(root: &Path, output: &Path) -> Cmd {
    Cmd::new("mksquashfs")
        .arg_path(root)
        .arg_path(output)
        .args(["-comp", "xz", "-b", "1M", "-noappend", "-no-progress", "-wildcards"])
        .arg("-e")
        .args(ROOT_IMAGE_EXCLUDES)
        .fails_as(FailureKind::Archive)
        .error_msg("Compressing build root failed")
}

/// Compress `root` into `output`, replacing any image from an earlier run.
pub fn build_root_image(ctx: &BuildContext, root: &Path, output: &Path) -> Result<u64> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).io_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if output.exists() {
        fs::remove_file(output).io_context(|| format!("Failed to remove {}", output.display()))?;
    }

    println!("  Compressing {} (xz)", root.display());
    if let Err(e) = ctx.run(root_image_command(root, output)) {
        let _ = fs::remove_file(output);
        return Err(e);
    }

    if !is_non_empty_file(output) {
        return Err(BuildError::Archive(format!(
            "mksquashfs reported success but {} is missing or empty",
            output.display()
        )));
    }
    let size = file_size(output);
    println!("  Root image: {}", human_size(size));
    Ok(size)
}
