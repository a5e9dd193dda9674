//! Bootloader configuration for the ISO.
//!
//! GRUB (`boot/grub/grub.cfg`) serves UEFI and the grub-mkrescue image;
//! ISOLINUX (`isolinux/isolinux.cfg`) serves legacy BIOS on the xorriso
//! fallback. Both carry the same three entries.

use std::path::Path;

use crate::error::Result;
use crate::files::write_file_with_dirs;
use crate::layout::ROOT_IMAGE_ISO_PATH;

pub const KERNEL_ISO_PATH: &str = "/boot/vmlinuz";
pub const INITRAMFS_ISO_PATH: &str = "/boot/initramfs.img";
pub const GRUB_CFG: &str = "boot/grub/grub.cfg";
pub const ISOLINUX_CFG: &str = "isolinux/isolinux.cfg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    pub id: &'static str,
    pub title: String,
    pub extra_params: &'static str,
}

/// Default live, safe graphics, installer.
pub fn boot_entries(name: &str) -> Vec<BootEntry> {
    vec![
        BootEntry {
            id: "live",
            title: format!("{name} (live)"),
            extra_params: "",
        },
        BootEntry {
            id: "safe",
            title: format!("{name} (live, safe graphics)"),
            extra_params: "nomodeset",
        },
        BootEntry {
            id: "install",
            title: format!("Install {name}"),
            extra_params: "livecd.installer=1",
        },
    ]
}

/// dracut arguments pointing dmsquash-live at the root image, which does not
/// sit at its default `LiveOS/squashfs.img`.
pub fn live_image_params() -> String {
    let (dir, file) = ROOT_IMAGE_ISO_PATH
        .rsplit_once('/')
        .unwrap_or(("", ROOT_IMAGE_ISO_PATH));
    format!("rd.live.dir={dir} rd.live.squashimg={file}")
}

/// Kernel command line of one entry.
pub fn kernel_params(label: &str, entry: &BootEntry) -> String {
    let base = format!("root=live:CDLABEL={label} rd.live.image {}", live_image_params());
    if entry.extra_params.is_empty() {
        base
    } else {
        format!("{base} {}", entry.extra_params)
    }
}

pub fn grub_cfg(label: &str, entries: &[BootEntry], with_initramfs: bool) -> String {
    let mut cfg = format!(
        "set default=0\n\
         set timeout=5\n\
         insmod all_video\n\
         search --no-floppy --set=root --label {label}\n"
    );
    for entry in entries {
        cfg.push_str(&format!(
            "\nmenuentry \"{}\" --id {} {{\n    linux {} {}\n",
            entry.title,
            entry.id,
            KERNEL_ISO_PATH,
            kernel_params(label, entry)
        ));
        if with_initramfs {
            cfg.push_str(&format!("    initrd {INITRAMFS_ISO_PATH}\n"));
        }
        cfg.push_str("}\n");
    }
    cfg
}

pub fn isolinux_cfg(label: &str, entries: &[BootEntry], with_initramfs: bool) -> String {
    let mut cfg = String::from("DEFAULT live\nPROMPT 1\nTIMEOUT 50\n");
    for entry in entries {
        let initrd = if with_initramfs {
            format!("initrd={INITRAMFS_ISO_PATH} ")
        } else {
            String::new()
        };
        cfg.push_str(&format!(
            "\nLABEL {}\n  MENU LABEL {}\n  KERNEL {}\n  APPEND {}{}\n",
            entry.id,
            entry.title,
            KERNEL_ISO_PATH,
            initrd,
            kernel_params(label, entry)
        ));
    }
    cfg
}

/// Write both configurations into the staging tree.
pub fn write_boot_configs(staging: &Path, name: &str, label: &str, with_initramfs: bool) -> Result<()> {
    let entries = boot_entries(name);
    write_file_with_dirs(staging.join(GRUB_CFG), grub_cfg(label, &entries, with_initramfs))?;
    write_file_with_dirs(staging.join(ISOLINUX_CFG), isolinux_cfg(label, &entries, with_initramfs))
}
