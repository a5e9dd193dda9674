//! Host tool availability.

use crate::process;

use super::types::CheckResult;
use super::Driver;

/// (tool, package, purpose)
type Tool = (&'static str, &'static str, &'static str);

const COMMON_TOOLS: &[Tool] = &[
    ("curl", "net-misc/curl", "downloads the seed archive"),
    ("mksquashfs", "sys-fs/squashfs-tools", "builds the repository snapshot"),
];

const MANUAL_TOOLS: &[Tool] = &[
    ("tar", "app-arch/tar", "extracts the seed"),
    ("xz", "app-arch/xz-utils", "decompresses the seed"),
    ("mount", "sys-apps/util-linux", "mounts pseudo-filesystems into the root"),
    ("umount", "sys-apps/util-linux", "releases mounts"),
    ("chroot", "sys-apps/coreutils", "runs commands inside the root"),
    ("xorriso", "dev-libs/libisoburn", "writes the ISO"),
];

/// Needed only by the xorriso fallback; missing ones degrade, not fail.
const FALLBACK_TOOLS: &[Tool] = &[
    ("grub-mkstandalone", "sys-boot/grub", "builds the EFI loader"),
    ("mkfs.fat", "sys-fs/dosfstools", "formats the EFI image"),
    ("mmd", "sys-fs/mtools", "populates the EFI image"),
    ("mcopy", "sys-fs/mtools", "populates the EFI image"),
];

pub fn check_host_tools(driver: Driver, builder: &str) -> Vec<CheckResult> {
    let mut results: Vec<CheckResult> = COMMON_TOOLS
        .iter()
        .map(|t| check_tool(t, true))
        .collect();

    match driver {
        Driver::Manual => {
            results.extend(MANUAL_TOOLS.iter().map(|t| check_tool(t, true)));
            results.push(check_tool(
                &("grub-mkrescue", "sys-boot/grub", "primary ISO tool, xorriso is used without it"),
                false,
            ));
            results.extend(FALLBACK_TOOLS.iter().map(|t| check_tool(t, false)));
            results.push(CheckResult::skip(builder, "not used by the manual driver"));
        }
        Driver::Delegated => {
            results.push(check_tool(&("pgrep", "sys-process/procps", "detects running builders"), true));
            results.push(match process::which(builder) {
                Some(path) => CheckResult::pass_with(builder, &path.display().to_string()),
                None => CheckResult::fail(
                    builder,
                    "Not found. Install dev-util/catalyst or set LIVECD_BUILDER.",
                ),
            });
        }
    }
    results
}

fn check_tool(&(tool, package, purpose): &Tool, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => {
            let msg = format!("Not found. Install {package} ({purpose}).");
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}
