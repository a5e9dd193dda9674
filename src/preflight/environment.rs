//! Build environment checks: privileges, cached inputs, space, syslinux.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::files::{file_size, human_size, is_non_empty_file};

use super::types::CheckResult;
use super::Driver;

/// Warn below this much free space in the base directory.
const MIN_FREE_BYTES: u64 = 20 * 1024 * 1024 * 1024;

pub fn check_build_environment(config: &Config, driver: Driver) -> Vec<CheckResult> {
    let layout = config.layout();
    let mut results = Vec::new();

    results.push(if nix::unistd::geteuid().is_root() {
        CheckResult::pass("root privileges")
    } else {
        CheckResult::fail("root privileges", "Mounting and chroot require root. Re-run with sudo.")
    });

    results.push(check_writable("base directory", &config.base_dir));
    results.push(check_writable("output directory", &layout.output_dir));

    let seed = layout.seed_archive();
    results.push(if seed.exists() {
        CheckResult::pass_with("seed archive", &human_size(file_size(&seed)))
    } else {
        CheckResult::warn("seed archive", "Not cached yet. Run: livecd fetch-seed")
    });

    let snapshot = layout.snapshot();
    results.push(if is_non_empty_file(&snapshot) {
        CheckResult::pass_with("repository snapshot", &human_size(file_size(&snapshot)))
    } else if config.repo_dir.is_dir() {
        CheckResult::warn("repository snapshot", "Not built yet. Run: livecd snapshot")
    } else {
        CheckResult::fail(
            "repository snapshot",
            &format!(
                "Not built and {} is missing. Run: emerge --sync",
                config.repo_dir.display()
            ),
        )
    });

    if driver == Driver::Manual {
        let missing: Vec<&str> = ["isolinux.bin", "ldlinux.c32", "isohdpfx.bin"]
            .into_iter()
            .filter(|f| !config.syslinux_dir.join(f).is_file())
            .collect();
        results.push(if missing.is_empty() {
            CheckResult::pass_with("syslinux files", &config.syslinux_dir.display().to_string())
        } else {
            CheckResult::warn(
                "syslinux files",
                &format!(
                    "{} missing from {}; the xorriso fallback cannot run",
                    missing.join(", "),
                    config.syslinux_dir.display()
                ),
            )
        });
    }

    results.push(check_free_space(&config.base_dir));
    results
}

fn check_writable(name: &str, dir: &Path) -> CheckResult {
    if let Err(e) = fs::create_dir_all(dir) {
        return CheckResult::fail(name, &format!("Cannot create {}: {}", dir.display(), e));
    }
    let marker = dir.join(".preflight-write-check");
    match fs::write(&marker, b"check") {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
            CheckResult::pass_with(name, &dir.display().to_string())
        }
        Err(e) => CheckResult::fail(name, &format!("Cannot write to {}: {}", dir.display(), e)),
    }
}

fn check_free_space(dir: &Path) -> CheckResult {
    match nix::sys::statvfs::statvfs(dir) {
        Ok(stat) => {
            let free = u64::from(stat.blocks_available()) * u64::from(stat.fragment_size());
            if free < MIN_FREE_BYTES {
                CheckResult::warn("disk space", &format!("{} free, a build needs ~20 GiB", human_size(free)))
            } else {
                CheckResult::pass_with("disk space", &format!("{} free", human_size(free)))
            }
        }
        Err(e) => CheckResult::warn("disk space", &format!("Cannot stat {}: {}", dir.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;

    #[test]
    fn writable_temp_dir_passes() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = check_writable("scratch", &temp.path().join("nested"));
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(!temp.path().join("nested/.preflight-write-check").exists());
    }

    #[test]
    fn missing_inputs_point_at_their_commands() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::with_base_dir(temp.path());
        config.repo_dir = temp.path().join("repo");
        fs::create_dir_all(&config.repo_dir).unwrap();

        let results = check_build_environment(&config, Driver::Delegated);
        let seed = results.iter().find(|r| r.name == "seed archive").unwrap();
        assert_eq!(seed.status, CheckStatus::Warn);
        assert!(seed.details.as_deref().unwrap().contains("livecd fetch-seed"));
        let snapshot = results.iter().find(|r| r.name == "repository snapshot").unwrap();
        assert!(snapshot.details.as_deref().unwrap().contains("livecd snapshot"));
        assert!(!results.iter().any(|r| r.name == "syslinux files"));
    }
}
