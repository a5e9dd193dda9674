//! Configuration management for livecd.
//!
//! Reads configuration from the environment. `main` loads a `.env` file with
//! dotenvy first, so values there act as defaults that real environment
//! variables override.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::layout::Layout;

pub const DEFAULT_BASE_DIR: &str = "/var/tmp/livecd-builder";
pub const DEFAULT_MIRROR: &str = "https://distfiles.gentoo.org/releases";
pub const DEFAULT_REPO_DIR: &str = "/var/db/repos/gentoo";
pub const DEFAULT_SYSLINUX_DIR: &str = "/usr/share/syslinux";
pub const DEFAULT_BUILDER: &str = "catalyst";
pub const DEFAULT_BUILDER_STOREDIR: &str = "/var/tmp/catalyst";

const DEFAULT_PACKAGES: &[&str] = &[
    "sys-kernel/gentoo-kernel-bin",
    "sys-kernel/linux-firmware",
    "sys-apps/dracut",
    "app-admin/sudo",
    "net-misc/dhcpcd",
    "net-misc/openssh",
    "app-editors/nano",
    "sys-fs/dosfstools",
    "sys-block/parted",
];

const DEFAULT_SERVICES: &[&str] = &["sshd", "dhcpcd"];

/// Init system of the target root; decides service and network configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    OpenRc,
    Systemd,
}

impl InitSystem {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrc" => Some(Self::OpenRc),
            "systemd" => Some(Self::Systemd),
            _ => None,
        }
    }
}

/// Effective build configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of cached seeds, snapshots, the work area and the lock file.
    pub base_dir: PathBuf,
    /// Where published ISOs land (outside the work area).
    pub output_dir: PathBuf,
    /// Release mirror base URL.
    pub mirror: String,
    pub arch: String,
    /// Seed flavour, e.g. `openrc` or `systemd`.
    pub variant: String,
    /// Host package repository tree that gets snapshotted.
    pub repo_dir: PathBuf,
    pub init: InitSystem,
    pub hostname: String,
    pub iso_name: String,
    /// ISO volume label; also referenced by the live kernel command line.
    pub iso_label: String,
    pub user: String,
    pub password: String,
    pub root_password: String,
    pub admin_group: String,
    pub packages: Vec<String>,
    pub services: Vec<String>,
    pub locales: Vec<String>,
    /// Host directory with isolinux.bin, ldlinux.c32 and isohdpfx.bin.
    pub syslinux_dir: PathBuf,
    /// Host resolver configuration copied into the build root.
    pub host_resolv_conf: PathBuf,
    /// External declarative builder used by the delegated driver.
    pub builder: String,
    pub builder_storedir: PathBuf,
    pub profile: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(|key| vars.get(key).cloned())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let list = |key: &str, default: &[&str]| match get(key) {
            Some(v) => v.split_whitespace().map(str::to_string).collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        };

        let base_dir = expand_home(&get_or("LIVECD_BASE_DIR", DEFAULT_BASE_DIR));
        let output_dir = get("LIVECD_OUTPUT_DIR")
            .map(|p| expand_home(&p))
            .unwrap_or_else(|| base_dir.join("output"));

        let arch = get_or("LIVECD_ARCH", "amd64");
        let variant = get_or("LIVECD_VARIANT", "openrc");
        let init = get("LIVECD_INIT")
            .and_then(|s| InitSystem::parse(&s))
            .unwrap_or(if variant.contains("systemd") {
                InitSystem::Systemd
            } else {
                InitSystem::OpenRc
            });

        let iso_name = get_or("LIVECD_ISO_NAME", "livecd");
        let iso_label = get("LIVECD_ISO_LABEL")
            .unwrap_or_else(|| default_label(&iso_name, &arch));

        Self {
            base_dir,
            output_dir,
            mirror: get_or("LIVECD_MIRROR", DEFAULT_MIRROR)
                .trim_end_matches('/')
                .to_string(),
            profile: get_or("LIVECD_PROFILE", &format!("default/linux/{arch}/23.0")),
            arch,
            variant,
            repo_dir: expand_home(&get_or("LIVECD_REPO_DIR", DEFAULT_REPO_DIR)),
            init,
            hostname: get_or("LIVECD_HOSTNAME", "livecd"),
            iso_name,
            iso_label,
            user: get_or("LIVECD_USER", "live"),
            password: get_or("LIVECD_PASSWORD", "live"),
            root_password: get_or("LIVECD_ROOT_PASSWORD", "live"),
            admin_group: get_or("LIVECD_ADMIN_GROUP", "wheel"),
            packages: list("LIVECD_PACKAGES", DEFAULT_PACKAGES),
            services: list("LIVECD_SERVICES", DEFAULT_SERVICES),
            locales: list("LIVECD_LOCALES", &["en_US.UTF-8"]),
            syslinux_dir: expand_home(&get_or("LIVECD_SYSLINUX_DIR", DEFAULT_SYSLINUX_DIR)),
            host_resolv_conf: PathBuf::from("/etc/resolv.conf"),
            builder: get_or("LIVECD_BUILDER", DEFAULT_BUILDER),
            builder_storedir: expand_home(&get_or(
                "LIVECD_BUILDER_STOREDIR",
                DEFAULT_BUILDER_STOREDIR,
            )),
        }
    }

    /// Defaults rooted at `base_dir`; used by tests and embedding callers.
    pub fn with_base_dir(base_dir: &Path) -> Self {
        let base = base_dir.to_string_lossy().into_owned();
        Self::from_vars(|key| (key == "LIVECD_BASE_DIR").then(|| base.clone()))
    }

    /// On-disk layout derived from this configuration.
    pub fn layout(&self) -> Layout {
        Layout::new(self)
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  LIVECD_BASE_DIR:   {}", self.base_dir.display());
        println!("  LIVECD_OUTPUT_DIR: {}", self.output_dir.display());
        println!("  LIVECD_MIRROR:     {}", self.mirror);
        println!("  LIVECD_ARCH:       {}", self.arch);
        println!("  LIVECD_VARIANT:    {}", self.variant);
        println!("  LIVECD_INIT:       {:?}", self.init);
        println!("  LIVECD_REPO_DIR:   {}", self.repo_dir.display());
        println!("  LIVECD_HOSTNAME:   {}", self.hostname);
        println!("  LIVECD_ISO_NAME:   {}", self.iso_name);
        println!("  LIVECD_ISO_LABEL:  {}", self.iso_label);
        println!("  LIVECD_USER:       {} (group {})", self.user, self.admin_group);
        println!("  LIVECD_PACKAGES:   {}", self.packages.join(" "));
        println!("  LIVECD_SERVICES:   {}", self.services.join(" "));
        println!("  LIVECD_BUILDER:    {} ({})", self.builder, self.builder_storedir.display());
    }
}

/// ISO 9660 volume IDs are limited to 32 upper-case characters.
fn default_label(iso_name: &str, arch: &str) -> String {
    let label: String = format!("{iso_name}_{arch}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .take(32)
        .collect();
    label
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
