//! Kernel and initramfs discovery under `<root>/boot`.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{BuildError, Result};

const KERNEL_PREFIXES: &[&str] = &["vmlinuz", "kernel-"];
const INITRAMFS_PREFIXES: &[&str] = &["initramfs", "initrd"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootArtifacts {
    pub kernel: PathBuf,
    pub initramfs: Option<PathBuf>,
}

/// Find the kernel (required) and initramfs (optional) in `<root>/boot`.
///
/// Symlinks are ignored: inside a build root they point at paths that only
/// resolve after `chroot`. When several kernels are present the highest
/// version wins.
pub fn locate_boot_artifacts(root: &Path) -> Result<BootArtifacts> {
    let boot = root.join("boot");
    let files = boot_files(&boot);

    let mut kernels = matching(&files, KERNEL_PREFIXES);
    let Some(kernel) = kernels.pop() else {
        return Err(BuildError::ArtifactMissing(format!(
            "no kernel (vmlinuz*, kernel-*) under {}; did the kernel package install?",
            boot.display()
        )));
    };
    if !kernels.is_empty() {
        warn!(
            chosen = %kernel.display(),
            ignored = kernels.len(),
            "several kernels installed, using the newest"
        );
    }

    let initramfs = pick_initramfs(&kernel, matching(&files, INITRAMFS_PREFIXES));
    Ok(BootArtifacts { kernel, initramfs })
}

fn boot_files(boot: &Path) -> Vec<PathBuf> {
    WalkDir::new(boot)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Files whose name starts with one of `prefixes`, in ascending version order.
fn matching(files: &[PathBuf], prefixes: &[&str]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = files
        .iter()
        .filter(|p| {
            let name = file_name(p);
            prefixes.iter().any(|prefix| name.starts_with(prefix))
        })
        .cloned()
        .collect();
    found.sort_by(|a, b| version_cmp(&file_name(a), &file_name(b)));
    found
}

/// Prefer the initramfs built for this kernel's version.
fn pick_initramfs(kernel: &Path, mut candidates: Vec<PathBuf>) -> Option<PathBuf> {
    let name = file_name(kernel);
    let version = KERNEL_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .map(|rest| rest.trim_start_matches('-'))
        .unwrap_or("");

    if !version.is_empty() {
        if let Some(exact) = candidates.iter().find(|p| file_name(p).contains(version)) {
            return Some(exact.clone());
        }
    }
    candidates.pop()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compare names treating digit runs as numbers, so 6.10 sorts after 6.9.
fn version_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (na, ra) = split_number(a);
                let (nb, rb) = split_number(b);
                match na.cmp(&nb) {
                    Ordering::Equal => {}
                    other => return other,
                }
                a = ra;
                b = rb;
            }
            (Some(x), Some(y)) => {
                match x.cmp(y) {
                    Ordering::Equal => {}
                    other => return other,
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn split_number(s: &[u8]) -> (u64, &[u8]) {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    let value = s[..end]
        .iter()
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d - b'0')));
    (value, &s[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn empty_boot_is_artifact_missing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("boot")).unwrap();
        let err = locate_boot_artifacts(temp.path()).unwrap_err();
        assert!(matches!(err, BuildError::ArtifactMissing(_)));
    }

    #[test]
    fn missing_boot_dir_is_artifact_missing() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            locate_boot_artifacts(temp.path()),
            Err(BuildError::ArtifactMissing(_))
        ));
    }

    #[test]
    fn kernel_without_initramfs() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "boot/vmlinuz-6.6.30-gentoo-dist");
        touch(temp.path(), "boot/config-6.6.30-gentoo-dist");
        let found = locate_boot_artifacts(temp.path()).unwrap();
        assert!(found.kernel.ends_with("vmlinuz-6.6.30-gentoo-dist"));
        assert_eq!(found.initramfs, None);
    }

    #[test]
    fn newest_kernel_and_matching_initramfs() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "boot/vmlinuz-6.9.1-gentoo-dist");
        touch(temp.path(), "boot/vmlinuz-6.10.2-gentoo-dist");
        touch(temp.path(), "boot/initramfs-6.9.1-gentoo-dist.img");
        touch(temp.path(), "boot/initramfs-6.10.2-gentoo-dist.img");

        let found = locate_boot_artifacts(temp.path()).unwrap();
        assert!(found.kernel.ends_with("vmlinuz-6.10.2-gentoo-dist"));
        assert!(found
            .initramfs
            .unwrap()
            .ends_with("initramfs-6.10.2-gentoo-dist.img"));
    }

    #[test]
    fn symlinked_kernel_is_ignored() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "boot/vmlinuz-6.6.30");
        std::os::unix::fs::symlink("/boot/vmlinuz-6.6.30", temp.path().join("boot/vmlinuz")).unwrap();
        let found = locate_boot_artifacts(temp.path()).unwrap();
        assert!(found.kernel.ends_with("vmlinuz-6.6.30"));
    }

    #[test]
    fn natural_version_order() {
        assert_eq!(version_cmp("vmlinuz-6.10", "vmlinuz-6.9"), Ordering::Greater);
        assert_eq!(version_cmp("vmlinuz-6.9", "vmlinuz-6.9"), Ordering::Equal);
        assert_eq!(version_cmp("vmlinuz", "vmlinuz-6.9"), Ordering::Less);
    }
}
