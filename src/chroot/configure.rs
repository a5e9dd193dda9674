//! System configurator.
//!
//! Identity files are whole-file overwrites written from the host side.
//! Account, locale and service changes go through the in-root executor so the
//! root's own tools (useradd, chpasswd, rc-update/systemctl) apply them.

use std::fs;
use std::path::Path;

use tracing::info;

use super::exec::run_in_root;
use crate::config::{Config, InitSystem};
use crate::context::BuildContext;
use crate::error::{IoContext, Result};
use crate::files::{write_file_mode, write_file_with_dirs};
use crate::process::Policy;

/// Interface names that get a DHCP stanza on OpenRC.
const DHCP_INTERFACES: &[&str] = &["eth0", "eth1", "enp0s3", "enp1s0", "ens3", "ens33", "wlan0"];

/// Staging path (inside the root) for the chpasswd input.
const CREDENTIALS_FILE: &str = "tmp/.livecd-credentials";

/// Write hostname, hosts, login banners, sudo policy and network defaults.
pub fn write_identity_files(root: &Path, config: &Config) -> Result<()> {
    let hostname = &config.hostname;

    write_file_with_dirs(root.join("etc/hostname"), format!("{hostname}\n"))?;
    if config.init == InitSystem::OpenRc {
        write_file_with_dirs(root.join("etc/conf.d/hostname"), format!("hostname=\"{hostname}\"\n"))?;
    }

    write_file_with_dirs(
        root.join("etc/hosts"),
        format!(
            "127.0.0.1\tlocalhost\n\
             ::1\t\tlocalhost\n\
             127.0.1.1\t{hostname}.localdomain {hostname}\n"
        ),
    )?;

    write_file_with_dirs(root.join("etc/issue"), issue_banner(config))?;
    write_file_with_dirs(root.join("etc/motd"), motd(config))?;

    write_file_mode(
        root.join("etc/sudoers.d/livecd"),
        format!("%{} ALL=(ALL:ALL) NOPASSWD: ALL\n", config.admin_group),
        0o440,
    )?;

    write_network_defaults(root, config.init)
}

fn issue_banner(config: &Config) -> String {
    format!(
        "\n{name} ({arch}) \\n \\l\n\n\
         Log in as '{user}' or 'root'. Network comes up via DHCP.\n\n",
        name = config.iso_name,
        arch = config.arch,
        user = config.user,
    )
}

fn motd(config: &Config) -> String {
    format!(
        "Welcome to {name}.\n\n\
         Administrative access: members of '{group}' may use sudo.\n\
         To install, boot the \"Install\" entry or run the installer from this shell.\n",
        name = config.iso_name,
        group = config.admin_group,
    )
}

fn write_network_defaults(root: &Path, init: InitSystem) -> Result<()> {
    match init {
        InitSystem::OpenRc => {
            let stanza: String = DHCP_INTERFACES
                .iter()
                .map(|iface| format!("config_{iface}=\"dhcp\"\n"))
                .collect();
            write_file_with_dirs(root.join("etc/conf.d/net"), stanza)
        }
        InitSystem::Systemd => write_file_with_dirs(
            root.join("etc/systemd/network/50-dhcp.network"),
            "[Match]\nName=en* eth* wl*\n\n[Network]\nDHCP=yes\n",
        ),
    }
}

fn locale_gen(locales: &[String]) -> String {
    locales
        .iter()
        .map(|locale| {
            let charset = locale.split('.').nth(1).unwrap_or("UTF-8");
            format!("{locale} {charset}\n")
        })
        .collect()
}

fn service_script(init: InitSystem, service: &str) -> String {
    match init {
        InitSystem::OpenRc => format!("rc-update add {service} default"),
        InitSystem::Systemd => format!("systemctl enable {service}"),
    }
}

/// Apply the full system configuration to a provisioned root.
pub fn configure_system(ctx: &BuildContext, root: &Path) -> Result<()> {
    ctx.begin_stage("Configure");
    let config = ctx.config;

    write_identity_files(root, config)?;
    println!("  Wrote identity files for {}", config.hostname);

    write_file_with_dirs(root.join("etc/locale.gen"), locale_gen(&config.locales))?;
    run_in_root(ctx, root, "Locale generation", "locale-gen", Policy::Mandatory)?;

    let groups = [config.admin_group.as_str(), "audio", "video", "users"].join(",");
    run_in_root(
        ctx,
        root,
        "User creation",
        &format!(
            "id -u {user} >/dev/null 2>&1 || useradd -m -G {groups} -s /bin/bash {user}",
            user = config.user
        ),
        Policy::Mandatory,
    )?;

    set_credentials(ctx, root, config)?;

    for service in &config.services {
        run_in_root(
            ctx,
            root,
            &format!("Enabling {service}"),
            &service_script(config.init, service),
            Policy::Advisory,
        )?;
    }

    info!(hostname = %config.hostname, user = %config.user, "system configured");
    println!("  [OK] System configured");
    Ok(())
}

/// Passwords go through a mode-600 file so they never appear on a command
/// line or in the build log.
fn set_credentials(ctx: &BuildContext, root: &Path, config: &Config) -> Result<()> {
    let staged = root.join(CREDENTIALS_FILE);
    write_file_mode(
        &staged,
        format!(
            "root:{}\n{}:{}\n",
            config.root_password, config.user, config.password
        ),
        0o600,
    )?;

    let result = run_in_root(
        ctx,
        root,
        "Setting account passwords",
        &format!("chpasswd < /{CREDENTIALS_FILE}"),
        Policy::Mandatory,
    );

    if staged.exists() {
        fs::remove_file(&staged)
            .io_context(|| format!("Failed to remove {}", staged.display()))?;
    }
    result.map(|_| ())
}
