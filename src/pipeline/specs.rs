//! Stage specification files for the delegated builder.
//!
//! The builder reads `key: value` specs. Inputs are referenced relative to
//! its store directory: seeds under `builds/<rel_type>/`, snapshots as
//! `snapshots/gentoo-<treeish>.sqfs`.

use std::path::{Path, PathBuf};

use crate::config::{Config, InitSystem};
use crate::error::Result;
use crate::files::write_file_with_dirs;
use crate::layout::Layout;

pub const REL_TYPE: &str = "default";
pub const VERSION_STAMP: &str = "livecd";
pub const SNAPSHOT_TREEISH: &str = "livecd";

/// Where staged inputs and rendered specs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecPaths {
    /// Seed copy inside the builder store.
    pub seed: PathBuf,
    /// Snapshot copy inside the builder store.
    pub snapshot: PathBuf,
    pub stage1_spec: PathBuf,
    pub stage2_spec: PathBuf,
    /// Directory the builder writes its results under.
    pub builds_dir: PathBuf,
}

impl SpecPaths {
    pub fn new(config: &Config, layout: &Layout) -> Self {
        let store = &config.builder_storedir;
        Self {
            seed: store
                .join("builds")
                .join(REL_TYPE)
                .join(format!("{}.tar.xz", seed_subpath_name(config))),
            snapshot: store.join("snapshots").join(format!("gentoo-{SNAPSHOT_TREEISH}.sqfs")),
            stage1_spec: layout.specs_dir().join("livecd-stage1.spec"),
            stage2_spec: layout.specs_dir().join("livecd-stage2.spec"),
            builds_dir: store.join("builds"),
        }
    }
}

fn seed_subpath_name(config: &Config) -> String {
    format!("stage3-{}-{}-{VERSION_STAMP}", config.arch, config.variant)
}

fn common_header(config: &Config, target: &str) -> String {
    format!(
        "subarch: {arch}\n\
         target: {target}\n\
         version_stamp: {VERSION_STAMP}\n\
         rel_type: {REL_TYPE}\n\
         profile: {profile}\n\
         snapshot_treeish: {SNAPSHOT_TREEISH}\n",
        arch = config.arch,
        profile = config.profile,
    )
}

fn indented_list(items: &[String]) -> String {
    items.iter().map(|i| format!("\t{i}\n")).collect()
}

pub fn render_stage1(config: &Config) -> String {
    let mut spec = common_header(config, "livecd-stage1");
    spec.push_str(&format!(
        "source_subpath: {REL_TYPE}/{}\n",
        seed_subpath_name(config)
    ));
    spec.push_str("livecd/use:\n\tlivecd\n\tsocks5\n");
    spec.push_str("livecd/packages:\n");
    spec.push_str(&indented_list(&config.packages));
    spec
}

pub fn render_stage2(config: &Config, iso: &Path) -> String {
    let mut spec = common_header(config, "livecd-stage2");
    spec.push_str(&format!(
        "source_subpath: {REL_TYPE}/livecd-stage1-{}-{VERSION_STAMP}\n",
        config.arch
    ));
    spec.push_str(&format!(
        "livecd/fstype: squashfs\n\
         livecd/iso: {iso}\n\
         livecd/volid: {label}\n\
         livecd/type: generic-livecd\n\
         livecd/hostname: {hostname}\n\
         livecd/users: {user}\n\
         livecd/bootargs: dokeymap\n",
        iso = iso.display(),
        label = config.iso_label,
        hostname = config.hostname,
        user = config.user,
    ));
    if config.init == InitSystem::OpenRc && !config.services.is_empty() {
        let rcadd: Vec<String> = config.services.iter().map(|s| format!("{s}|default")).collect();
        spec.push_str(&format!("livecd/rcadd: {}\n", rcadd.join(" ")));
    }
    spec.push_str("boot/kernel: gentoo\nboot/kernel/gentoo/distkernel: yes\n");
    spec
}

/// Write both specs; the ISO lands at `iso` inside the builder store.
pub fn write_specs(config: &Config, paths: &SpecPaths, iso: &Path) -> Result<()> {
    write_file_with_dirs(&paths.stage1_spec, render_stage1(config))?;
    write_file_with_dirs(&paths.stage2_spec, render_stage2(config, iso))
}
