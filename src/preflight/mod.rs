//! Preflight checks.
//!
//! Validates host tools, privileges and cached inputs for the chosen driver
//! before a build starts. Run with `livecd preflight`.

mod environment;
mod host_tools;
pub mod types;

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Which pipeline driver the checks are for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Manual,
    Delegated,
}

/// Run all preflight checks.
pub fn run_preflight(config: &Config, driver: Driver) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks ({driver:?} driver)...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(driver, &config.builder));

    println!("Checking build environment...");
    checks.extend(environment::check_build_environment(config, driver));

    println!();
    PreflightReport { checks }
}
