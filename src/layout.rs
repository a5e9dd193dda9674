//! On-disk layout of cached inputs, the work area and published outputs.
//!
//! ```text
//! <base>/
//! ├── livecd.lock                      # build lock (never cleaned)
//! ├── seeds/stage3-<arch>-<variant>.tar.xz
//! ├── snapshots/repo.sqfs
//! ├── work/                            # transient, removed by `clean`
//! │   ├── root/                        # BuildRoot
//! │   ├── iso-staging/                 # ISO tree, live/image.squashfs
//! │   ├── iso/                         # intermediate ISO
//! │   ├── specs/                       # delegated builder specs
//! │   └── logs/<stage>.log             # BuildLog
//! └── output/                          # published ISO + sidecars
//! ```

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Marker proving a seed was fully extracted into the build root.
pub const EXTRACTION_MARKER: &str = "etc/gentoo-release";
/// Mount point of the repository snapshot inside the build root.
pub const IN_ROOT_REPO_DIR: &str = "var/db/repos/gentoo";
/// RootImage location relative to the ISO staging tree.
pub const ROOT_IMAGE_ISO_PATH: &str = "live/image.squashfs";

#[derive(Debug, Clone)]
pub struct Layout {
    pub base_dir: PathBuf,
    pub seeds_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    seed_name: String,
    iso_name: String,
}

impl Layout {
    pub fn new(config: &Config) -> Self {
        let base = config.base_dir.clone();
        Self {
            seeds_dir: base.join("seeds"),
            snapshots_dir: base.join("snapshots"),
            work_dir: base.join("work"),
            output_dir: config.output_dir.clone(),
            seed_name: format!("stage3-{}-{}.tar.xz", config.arch, config.variant),
            iso_name: format!("{}-{}.iso", config.iso_name, config.arch),
            base_dir: base,
        }
    }

    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("livecd.lock")
    }

    /// Deterministic cache path of the SeedArchive.
    pub fn seed_archive(&self) -> PathBuf {
        self.seeds_dir.join(&self.seed_name)
    }

    pub fn snapshot(&self) -> PathBuf {
        self.snapshots_dir.join("repo.sqfs")
    }

    pub fn build_root(&self) -> PathBuf {
        self.work_dir.join("root")
    }

    pub fn extraction_marker(&self) -> PathBuf {
        self.build_root().join(EXTRACTION_MARKER)
    }

    pub fn iso_staging(&self) -> PathBuf {
        self.work_dir.join("iso-staging")
    }

    pub fn root_image(&self) -> PathBuf {
        self.iso_staging().join(ROOT_IMAGE_ISO_PATH)
    }

    /// Intermediate ISO written by the assembler before publication.
    pub fn intermediate_iso(&self) -> PathBuf {
        self.work_dir.join("iso").join(&self.iso_name)
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.work_dir.join("specs")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }

    pub fn published_iso(&self) -> PathBuf {
        self.output_dir.join(&self.iso_name)
    }

    pub fn iso_file_name(&self) -> &str {
        &self.iso_name
    }
}

/// `<file>.<suffix>` without replacing the existing extension.
pub fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_documented_layout() {
        let config = Config::with_base_dir(Path::new("/b"));
        let layout = config.layout();
        assert_eq!(layout.seed_archive(), PathBuf::from("/b/seeds/stage3-amd64-openrc.tar.xz"));
        assert_eq!(layout.snapshot(), PathBuf::from("/b/snapshots/repo.sqfs"));
        assert_eq!(layout.build_root(), PathBuf::from("/b/work/root"));
        assert_eq!(layout.root_image(), PathBuf::from("/b/work/iso-staging/live/image.squashfs"));
        assert_eq!(layout.published_iso(), PathBuf::from("/b/output/livecd-amd64.iso"));
        assert_eq!(layout.lock_file(), PathBuf::from("/b/livecd.lock"));
        assert!(!layout.lock_file().starts_with(&layout.work_dir));
        assert!(!layout.output_dir.starts_with(&layout.work_dir));
    }

    #[test]
    fn sidecar_appends_suffix() {
        assert_eq!(
            sidecar(Path::new("/out/livecd-amd64.iso"), "sha256"),
            PathBuf::from("/out/livecd-amd64.iso.sha256")
        );
    }
}
