//! ISO generation as an ordered list of strategies.
//!
//! `grub-mkrescue` is tried first. If it fails for any reason (missing tool,
//! nonzero exit, empty output) the xorriso strategy builds a hybrid image
//! itself: ISOLINUX for BIOS, an El Torito EFI image for UEFI, MBR and GPT
//! for USB sticks. A signal stops the sequence immediately.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::files::is_non_empty_file;
use crate::process::{Cmd, FailureKind};

use super::bootloader::GRUB_CFG;

/// Files the BIOS path needs from the host's syslinux installation.
const ISOLINUX_FILES: &[&str] = &["isolinux.bin", "ldlinux.c32"];
const ISOHYBRID_MBR: &str = "isohdpfx.bin";
const EFI_IMAGE: &str = "boot/efiboot.img";
/// FAT image size in KiB.
const EFI_IMAGE_KIB: &str = "16384";

/// Everything a strategy needs to produce one ISO.
#[derive(Debug, Clone)]
pub struct IsoRequest {
    pub staging: PathBuf,
    pub output: PathBuf,
    pub label: String,
    pub arch: String,
    pub syslinux_dir: PathBuf,
    /// Scratch space outside the staging tree.
    pub scratch: PathBuf,
}

pub trait IsoStrategy {
    fn name(&self) -> &'static str;
    fn build(&self, ctx: &BuildContext, req: &IsoRequest) -> Result<()>;
}

/// `grub-mkrescue`: one call, GRUB for both BIOS and UEFI.
pub struct GrubMkrescue;

impl GrubMkrescue {
    pub fn command(req: &IsoRequest) -> Cmd {
        Cmd::new("grub-mkrescue")
            .arg("-o")
            .arg_path(&req.output)
            .arg_path(&req.staging)
            .args(["--", "-volid", req.label.as_str()])
            .fails_as(FailureKind::ImageBuild)
            .error_msg("grub-mkrescue failed")
    }
}

impl IsoStrategy for GrubMkrescue {
    fn name(&self) -> &'static str {
        "grub-mkrescue"
    }

    fn build(&self, ctx: &BuildContext, req: &IsoRequest) -> Result<()> {
        ctx.run(Self::command(req)).map(|_| ())
    }
}

/// `xorriso -as mkisofs` with explicit hybrid-boot parameters.
pub struct XorrisoHybrid;

impl XorrisoHybrid {
    pub fn command(req: &IsoRequest) -> Cmd {
        Cmd::new("xorriso")
            .args(["-as", "mkisofs", "-iso-level", "3", "-full-iso9660-filenames"])
            .args(["-volid", req.label.as_str()])
            .arg("-isohybrid-mbr")
            .arg_path(&req.syslinux_dir.join(ISOHYBRID_MBR))
            .args(["-c", "isolinux/boot.cat", "-b", "isolinux/isolinux.bin"])
            .args(["-no-emul-boot", "-boot-load-size", "4", "-boot-info-table"])
            .args(["-eltorito-alt-boot", "-e", EFI_IMAGE, "-no-emul-boot"])
            .arg("-isohybrid-gpt-basdat")
            .arg("-o")
            .arg_path(&req.output)
            .arg_path(&req.staging)
            .fails_as(FailureKind::ImageBuild)
            .error_msg("xorriso failed")
    }

    fn stage_isolinux(req: &IsoRequest) -> Result<()> {
        let target = req.staging.join("isolinux");
        fs::create_dir_all(&target).io_context(|| format!("Failed to create {}", target.display()))?;
        for name in ISOLINUX_FILES.iter().chain([ISOHYBRID_MBR].iter()) {
            let src = req.syslinux_dir.join(name);
            if !src.is_file() {
                return Err(BuildError::ImageBuild(format!(
                    "{} not found; install syslinux or set LIVECD_SYSLINUX_DIR",
                    src.display()
                )));
            }
        }
        for name in ISOLINUX_FILES {
            let src = req.syslinux_dir.join(name);
            fs::copy(&src, target.join(name))
                .io_context(|| format!("Failed to copy {}", src.display()))?;
        }
        Ok(())
    }

    fn build_efi_image(ctx: &BuildContext, req: &IsoRequest) -> Result<()> {
        let (target, loader) = efi_target(&req.arch);
        fs::create_dir_all(&req.scratch)
            .io_context(|| format!("Failed to create {}", req.scratch.display()))?;
        let efi_binary = req.scratch.join(loader);
        let image = req.staging.join(EFI_IMAGE);
        if image.exists() {
            fs::remove_file(&image).io_context(|| format!("Failed to remove {}", image.display()))?;
        }
        if let Some(parent) = image.parent() {
            fs::create_dir_all(parent).io_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let grub_cfg = req.staging.join(GRUB_CFG);
        let image_build = |cmd: Cmd, what: &str| {
            ctx.run(cmd.fails_as(FailureKind::ImageBuild).error_msg(what))
        };

        image_build(
            Cmd::new("grub-mkstandalone")
                .args(["-O", target, "-o"])
                .arg_path(&efi_binary)
                .arg(format!("boot/grub/grub.cfg={}", grub_cfg.display())),
            "Building the EFI loader failed",
        )?;
        image_build(
            Cmd::new("mkfs.fat")
                .args(["-F", "16", "-n", "EFIBOOT", "-C"])
                .arg_path(&image)
                .arg(EFI_IMAGE_KIB),
            "Creating the EFI image failed",
        )?;
        image_build(
            Cmd::new("mmd").arg("-i").arg_path(&image).args(["::/EFI", "::/EFI/BOOT"]),
            "Creating EFI directories failed",
        )?;
        image_build(
            Cmd::new("mcopy")
                .arg("-i")
                .arg_path(&image)
                .arg_path(&efi_binary)
                .arg(format!("::/EFI/BOOT/{loader}")),
            "Copying the EFI loader failed",
        )?;
        Ok(())
    }
}

impl IsoStrategy for XorrisoHybrid {
    fn name(&self) -> &'static str {
        "xorriso"
    }

    fn build(&self, ctx: &BuildContext, req: &IsoRequest) -> Result<()> {
        Self::stage_isolinux(req)?;
        Self::build_efi_image(ctx, req)?;
        ctx.run(Self::command(req)).map(|_| ())
    }
}

/// GRUB platform and removable-media loader name for `arch`.
fn efi_target(arch: &str) -> (&'static str, &'static str) {
    match arch {
        "arm64" => ("arm64-efi", "BOOTAA64.EFI"),
        _ => ("x86_64-efi", "BOOTX64.EFI"),
    }
}

pub fn default_strategies() -> Vec<Box<dyn IsoStrategy>> {
    vec![Box::new(GrubMkrescue), Box::new(XorrisoHybrid)]
}

/// Try each strategy in order; return the name of the one that produced a
/// non-empty ISO.
pub fn build_iso(
    ctx: &BuildContext,
    strategies: &[Box<dyn IsoStrategy>],
    req: &IsoRequest,
) -> Result<&'static str> {
    if let Some(parent) = req.output.parent() {
        fs::create_dir_all(parent).io_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut last_failure = String::from("no ISO strategy configured");
    for strategy in strategies {
        discard(&req.output)?;
        println!("  Creating ISO with {}", strategy.name());

        let outcome = strategy.build(ctx, req).and_then(|()| {
            if is_non_empty_file(&req.output) {
                Ok(())
            } else {
                Err(BuildError::ImageBuild(format!(
                    "{} exited cleanly but {} is missing or empty",
                    strategy.name(),
                    req.output.display()
                )))
            }
        });

        match outcome {
            Ok(()) => {
                info!(strategy = strategy.name(), iso = %req.output.display(), "ISO created");
                return Ok(strategy.name());
            }
            Err(BuildError::Interrupted) => return Err(BuildError::Interrupted),
            Err(e) => {
                warn!(strategy = strategy.name(), error = %e, "ISO strategy failed");
                println!("  [WARN] {} failed, trying next ISO tool", strategy.name());
                last_failure = format!("{}: {}", strategy.name(), e);
            }
        }
    }

    discard(&req.output)?;
    Err(BuildError::ImageBuild(format!(
        "every ISO tool failed; last was {last_failure}"
    )))
}

fn discard(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).io_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> IsoRequest {
        IsoRequest {
            staging: PathBuf::from("/w/iso-staging"),
            output: PathBuf::from("/w/iso/livecd-amd64.iso"),
            label: "LIVECD_AMD64".into(),
            arch: "amd64".into(),
            syslinux_dir: PathBuf::from("/usr/share/syslinux"),
            scratch: PathBuf::from("/w/iso/efi"),
        }
    }

    #[test]
    fn primary_sets_volume_label() {
        let cmd = GrubMkrescue::command(&request());
        assert_eq!(
            cmd.to_string(),
            "grub-mkrescue -o /w/iso/livecd-amd64.iso /w/iso-staging -- -volid LIVECD_AMD64"
        );
    }

    #[test]
    fn fallback_carries_hybrid_boot_parameters() {
        let cmd = XorrisoHybrid::command(&request());
        let args = cmd.get_args();
        for flag in ["-isohybrid-mbr", "-eltorito-alt-boot", "-isohybrid-gpt-basdat"] {
            assert!(args.iter().any(|a| a == flag), "missing {flag}");
        }
        assert_eq!(cmd.arg_after("-isohybrid-mbr"), Some("/usr/share/syslinux/isohdpfx.bin"));
        assert_eq!(cmd.arg_after("-c"), Some("isolinux/boot.cat"));
        assert_eq!(cmd.arg_after("-b"), Some("isolinux/isolinux.bin"));
        assert_eq!(cmd.arg_after("-e"), Some("boot/efiboot.img"));
        assert_eq!(cmd.arg_after("-volid"), Some("LIVECD_AMD64"));
        assert_eq!(cmd.arg_after("-o"), Some("/w/iso/livecd-amd64.iso"));
        assert_eq!(args.last().map(String::as_str), Some("/w/iso-staging"));
    }

    #[test]
    fn strategy_order_is_primary_then_fallback() {
        let names: Vec<_> = default_strategies().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["grub-mkrescue", "xorriso"]);
    }

    #[test]
    fn efi_loader_names() {
        assert_eq!(efi_target("amd64"), ("x86_64-efi", "BOOTX64.EFI"));
        assert_eq!(efi_target("arm64"), ("arm64-efi", "BOOTAA64.EFI"));
    }
}
