//! File helpers with automatic parent directory creation.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{IoContext, Result};

/// Write a file, creating parent directories as needed.
///
/// Always a whole-file overwrite, so repeating a write is idempotent.
pub fn write_file_with_dirs<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .io_context(|| format!("Failed to create {}", parent.display()))?;
    }
    // A dangling or foreign symlink (e.g. resolv.conf -> /run/...) must not
    // redirect the write outside the tree.
    if path.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        fs::remove_file(path).io_context(|| format!("Failed to replace {}", path.display()))?;
    }
    fs::write(path, content).io_context(|| format!("Failed to write {}", path.display()))
}

/// Write a file with specific Unix permissions, creating parent directories as needed.
pub fn write_file_mode<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
    mode: u32,
) -> Result<()> {
    let path = path.as_ref();
    write_file_with_dirs(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .io_context(|| format!("Failed to set mode on {}", path.display()))
}

/// Size of a file in bytes, or 0 when it does not exist.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// True when `path` is a regular file with at least one byte.
pub fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Human-readable size for progress output.
pub fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= 1024 * MIB {
        format!("{:.1} GiB", bytes as f64 / (1024 * MIB) as f64)
    } else if bytes >= MIB {
        format!("{} MiB", bytes / MIB)
    } else {
        format!("{} KiB", bytes.div_ceil(1024))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn write_creates_parents_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("etc/conf.d/hostname");
        write_file_with_dirs(&path, "one").unwrap();
        write_file_with_dirs(&path, "two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn write_replaces_symlinks_instead_of_following() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::write(&outside, "host").unwrap();
        let link = temp.path().join("root/etc/resolv.conf");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        symlink(&outside, &link).unwrap();

        write_file_with_dirs(&link, "nameserver 1.1.1.1\n").unwrap();

        assert_eq!(fs::read_to_string(&outside).unwrap(), "host");
        assert!(!link.symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn write_mode_sets_permissions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sudoers.d/wheel");
        write_file_mode(&path, "%wheel ALL=(ALL:ALL) ALL\n", 0o440).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o440);
    }

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), "1 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5 MiB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024 / 2), "1.5 GiB");
    }
}
