//! Environment provisioner - turns a seed archive into a live build root.
//!
//! # Protocol
//!
//! 1. Refuse to touch a root that still has mounts from an earlier run
//! 2. Extract the seed once (marker: `etc/gentoo-release`), preserving
//!    xattrs and numeric ownership
//! 3. Mount, in order: dev, dev/pts, dev/shm, proc, sys, run, snapshot
//! 4. Copy the host's resolv.conf in (a copy, not a bind, so it survives
//!    teardown)
//!
//! The mount guard is created before the first mount; any failure drops it
//! and everything mounted so far is released in reverse order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::files::write_file_with_dirs;
use crate::layout::IN_ROOT_REPO_DIR;
use crate::mounts::{mounts_under, MountSource, MountSpec, MountStack};
use crate::pipeline::require_inputs;
use crate::process::{Cmd, FailureKind};

/// A provisioned build root. Dropping it unmounts everything.
pub struct ProvisionedRoot<'c, 'a> {
    path: PathBuf,
    mounts: MountStack<'c, 'a>,
}

impl ProvisionedRoot<'_, '_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active mount points in establishment order.
    pub fn mounts(&self) -> &[PathBuf] {
        self.mounts.active()
    }

    /// Release all mounts now. Returns the number that could not be released.
    pub fn teardown(mut self) -> usize {
        self.mounts.teardown()
    }
}

/// The ordered mount set for `root`.
pub fn standard_mounts(root: &Path, snapshot: &Path) -> Vec<MountSpec> {
    vec![
        MountSpec::new("dev", MountSource::Bind("/dev".into()), root.join("dev")),
        MountSpec::new("dev/pts", MountSource::Bind("/dev/pts".into()), root.join("dev/pts")),
        MountSpec::new(
            "shm",
            MountSource::Tmpfs {
                name: "shm",
                options: "nosuid,nodev,mode=1777",
            },
            root.join("dev/shm"),
        ),
        MountSpec::new("proc", MountSource::Proc, root.join("proc")),
        MountSpec::new("sys", MountSource::Bind("/sys".into()), root.join("sys")),
        MountSpec::new(
            "run",
            MountSource::Tmpfs {
                name: "run",
                options: "nosuid,nodev,mode=0755",
            },
            root.join("run"),
        ),
        MountSpec::new(
            "snapshot",
            MountSource::LoopReadOnly {
                image: snapshot.to_path_buf(),
                fstype: "squashfs",
            },
            root.join(IN_ROOT_REPO_DIR),
        ),
    ]
}

/// Provision the build root and return it with its mounts established.
pub fn provision<'c, 'a>(ctx: &'c BuildContext<'a>) -> Result<ProvisionedRoot<'c, 'a>> {
    ctx.begin_stage("Provision");
    let layout = &ctx.layout;
    let root = layout.build_root();
    let seed = layout.seed_archive();
    let snapshot = layout.snapshot();

    require_inputs(layout)?;

    // Registered before anything is mounted so every exit path releases.
    let mut mounts = MountStack::new(ctx);

    refuse_dangling_mounts(&root)?;
    fs::create_dir_all(&root).io_context(|| format!("Failed to create {}", root.display()))?;
    extract_seed(ctx, &seed, &root)?;

    for spec in standard_mounts(&root, &snapshot) {
        mounts.mount(&spec)?;
    }
    println!("  Mounted {} filesystems", mounts.active().len());

    copy_resolver_config(&ctx.config.host_resolv_conf, &root)?;

    Ok(ProvisionedRoot { path: root, mounts })
}

/// Mounts left by a crashed run must be handled by the operator; extracting
/// or deleting over them would write into the host's /dev or /sys.
fn refuse_dangling_mounts(root: &Path) -> Result<()> {
    let dangling = mounts_under(root)?;
    if dangling.is_empty() {
        return Ok(());
    }
    let list = dangling
        .iter()
        .map(|p| format!("    {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(BuildError::mount(
        root,
        format!(
            "{} mount(s) still active from a previous run:\n{}\n  Release them with: umount -R {}",
            dangling.len(),
            list,
            root.display()
        ),
    ))
}

fn extract_seed(ctx: &BuildContext, seed: &Path, root: &Path) -> Result<()> {
    let marker = ctx.layout.extraction_marker();
    if marker.exists() {
        println!("  Seed already extracted at {}", root.display());
        return Ok(());
    }

    // No marker but content: an interrupted extraction. Start over.
    let partial = fs::read_dir(root)
        .io_context(|| format!("Failed to read {}", root.display()))?
        .next()
        .is_some();
    if partial {
        warn!(root = %root.display(), "removing partially extracted build root");
        fs::remove_dir_all(root).io_context(|| format!("Failed to clear {}", root.display()))?;
        fs::create_dir_all(root).io_context(|| format!("Failed to create {}", root.display()))?;
    }

    println!("  Extracting {}", seed.display());
    ctx.run(
        Cmd::new("tar")
            .arg("-xpf")
            .arg_path(seed)
            .args(["--xattrs-include=*.*", "--numeric-owner", "-C"])
            .arg_path(root)
            .fails_as(FailureKind::Archive)
            .error_msg("Extracting seed archive failed"),
    )?;

    if !marker.exists() {
        return Err(BuildError::Archive(format!(
            "seed extracted but {} is missing; is {} a stage3 archive?",
            marker.display(),
            seed.display()
        )));
    }
    info!(root = %root.display(), "seed extracted");
    Ok(())
}

fn copy_resolver_config(host: &Path, root: &Path) -> Result<()> {
    let target = root.join("etc/resolv.conf");
    match fs::read(host) {
        Ok(content) => write_file_with_dirs(&target, content),
        Err(e) => {
            warn!(host = %host.display(), error = %e, "no host resolver config; name resolution may fail in the root");
            println!("  [WARN] Could not read {}: {}", host.display(), e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_order_is_fixed() {
        let specs = standard_mounts(Path::new("/r"), Path::new("/s/repo.sqfs"));
        let labels: Vec<_> = specs.iter().map(|s| s.label).collect();
        assert_eq!(labels, ["dev", "dev/pts", "shm", "proc", "sys", "run", "snapshot"]);
        assert_eq!(specs[6].target, PathBuf::from("/r/var/db/repos/gentoo"));
        // Every target lives inside the root.
        assert!(specs.iter().all(|s| s.target.starts_with("/r")));
    }

    #[test]
    fn resolver_copy_is_a_plain_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let host = temp.path().join("host-resolv.conf");
        fs::write(&host, "nameserver 192.0.2.53\n").unwrap();
        let root = temp.path().join("root");

        copy_resolver_config(&host, &root).unwrap();

        let copied = root.join("etc/resolv.conf");
        assert_eq!(fs::read_to_string(&copied).unwrap(), "nameserver 192.0.2.53\n");
        assert!(copied.symlink_metadata().unwrap().file_type().is_file());
    }

    #[test]
    fn missing_host_resolver_is_not_fatal() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(copy_resolver_config(&temp.path().join("absent"), temp.path()).is_ok());
    }
}
