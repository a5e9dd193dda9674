//! Package installation inside the build root.
//!
//! One `emerge` per package, each advisory: a package that fails to build
//! is reported and skipped, and the image is still produced. Whether the
//! result boots is checked later, when the assembler looks for a kernel.

use std::path::Path;

use tracing::warn;

use super::exec::run_in_root;
use crate::context::BuildContext;
use crate::error::Result;
use crate::process::Policy;

const EMERGE: &str = "emerge --noreplace --getbinpkg --usepkg --quiet-build=y";

/// Outcome of the package phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageReport {
    pub installed: Vec<String>,
    pub failed: Vec<String>,
}

impl PackageReport {
    pub fn all_installed(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn emerge_script(package: &str) -> String {
    format!("{EMERGE} {package}")
}

/// Install every configured package, continuing past failures.
pub fn install_packages(ctx: &BuildContext, root: &Path) -> Result<PackageReport> {
    ctx.begin_stage("Packages");
    let mut report = PackageReport::default();

    for package in &ctx.config.packages {
        println!("  Installing {package}");
        let result = run_in_root(
            ctx,
            root,
            &format!("Installing {package}"),
            &emerge_script(package),
            Policy::Advisory,
        )?;
        if result.success() {
            report.installed.push(package.clone());
        } else {
            report.failed.push(package.clone());
        }
    }

    if report.all_installed() {
        println!("  [OK] {} packages installed", report.installed.len());
    } else {
        warn!(failed = ?report.failed, "some packages failed to install");
        println!(
            "  [WARN] {} of {} packages failed: {}",
            report.failed.len(),
            ctx.config.packages.len(),
            report.failed.join(", ")
        );
    }
    Ok(report)
}
