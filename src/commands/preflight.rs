//! Preflight command - runs preflight checks.

use anyhow::{bail, Result};

use livecd_builder::config::Config;
use livecd_builder::preflight::{self, Driver};

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, driver: Driver, strict: bool) -> Result<()> {
    let report = preflight::run_preflight(config, driver);
    report.print();

    if report.all_passed() {
        println!("All preflight checks passed!");
    } else if strict {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    } else {
        println!("Some checks failed. Use --strict to fail with a nonzero exit code.");
    }
    Ok(())
}
