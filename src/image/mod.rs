//! Image assembler.
//!
//! ```text
//! work/iso-staging/
//! ├── boot/
//! │   ├── vmlinuz
//! │   ├── initramfs.img        # when the root has one
//! │   ├── efiboot.img          # xorriso strategy only
//! │   └── grub/grub.cfg
//! ├── isolinux/                # isolinux.cfg (+ loader files for xorriso)
//! └── live/image.squashfs      # RootImage
//! ```
//!
//! Boot artifacts are located before anything is compressed, so a root
//! without a kernel fails in seconds rather than after the squashfs pass.

pub mod bootloader;
pub mod iso;
pub mod kernel;
pub mod rootimage;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::checksum::{sha256_file, write_sidecar};
use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::files::{file_size, human_size, is_non_empty_file};
use crate::mounts::mounts_under;

pub use iso::{build_iso, default_strategies, IsoRequest, IsoStrategy};
pub use kernel::{locate_boot_artifacts, BootArtifacts};

/// An ISO produced in the work area, not yet published.
#[derive(Debug, Clone)]
pub struct AssembledIso {
    pub path: PathBuf,
    pub label: String,
    pub sha256: String,
    pub size: u64,
    /// Name of the ISO strategy that succeeded.
    pub tool: &'static str,
}

/// Assemble an ISO from `root` with the default strategy order.
pub fn assemble_image(ctx: &BuildContext, root: &Path) -> Result<AssembledIso> {
    assemble_with(ctx, root, &default_strategies())
}

/// Assemble an ISO from `root`, trying `strategies` in order.
pub fn assemble_with(
    ctx: &BuildContext,
    root: &Path,
    strategies: &[Box<dyn IsoStrategy>],
) -> Result<AssembledIso> {
    ctx.begin_stage("Assemble image");
    let layout = &ctx.layout;
    let config = ctx.config;

    let active = mounts_under(root)?;
    if !active.is_empty() {
        return Err(BuildError::mount(
            root,
            format!(
                "{} filesystem(s) still mounted; the image would capture them. Tear down first",
                active.len()
            ),
        ));
    }

    let boot = locate_boot_artifacts(root)?;
    println!("  Kernel: {}", boot.kernel.display());
    match &boot.initramfs {
        Some(initramfs) => println!("  Initramfs: {}", initramfs.display()),
        None => println!("  [WARN] No initramfs found; the live entries may not find their root"),
    }

    let staging = layout.iso_staging();
    if staging.exists() {
        fs::remove_dir_all(&staging)
            .io_context(|| format!("Failed to clear {}", staging.display()))?;
    }
    stage_boot_files(&staging, &boot)?;
    rootimage::build_root_image(ctx, root, &layout.root_image())?;
    bootloader::write_boot_configs(
        &staging,
        &config.iso_name,
        &config.iso_label,
        boot.initramfs.is_some(),
    )?;

    let output = layout.intermediate_iso();
    let request = IsoRequest {
        staging: staging.clone(),
        output: output.clone(),
        label: config.iso_label.clone(),
        arch: config.arch.clone(),
        syslinux_dir: config.syslinux_dir.clone(),
        scratch: layout.work_dir.join("iso/efi"),
    };
    let tool = build_iso(ctx, strategies, &request)?;

    if !is_non_empty_file(&output) {
        return Err(BuildError::ImageBuild(format!(
            "{} is missing or empty after {}",
            output.display(),
            tool
        )));
    }
    let sha256 = sha256_file(&output)?;
    write_sidecar(&output, &sha256)?;
    let size = file_size(&output);

    info!(iso = %output.display(), tool, size, "image assembled");
    println!("  [OK] {} ({}, via {})", output.display(), human_size(size), tool);
    Ok(AssembledIso {
        path: output,
        label: config.iso_label.clone(),
        sha256,
        size,
        tool,
    })
}

fn stage_boot_files(staging: &Path, boot: &BootArtifacts) -> Result<()> {
    let boot_dir = staging.join("boot");
    fs::create_dir_all(&boot_dir)
        .io_context(|| format!("Failed to create {}", boot_dir.display()))?;

    fs::copy(&boot.kernel, boot_dir.join("vmlinuz"))
        .io_context(|| format!("Failed to copy kernel {}", boot.kernel.display()))?;
    if let Some(initramfs) = &boot.initramfs {
        fs::copy(initramfs, boot_dir.join("initramfs.img"))
            .io_context(|| format!("Failed to copy initramfs {}", initramfs.display()))?;
    }
    Ok(())
}
