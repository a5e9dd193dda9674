//! Pipeline drivers.
//!
//! Two ways to get from cached inputs to a published ISO:
//!
//! - [`manual`] sequences provisioning, configuration, package installation
//!   and assembly directly on the managed build root
//! - [`delegated`] hands two rendered stage specs to an external declarative
//!   builder and publishes what it produces
//!
//! Both hold the host build lock for their whole run.

pub mod delegated;
pub mod manual;
pub mod specs;

use crate::error::{BuildError, Result};
use crate::files::is_non_empty_file;
use crate::layout::Layout;

pub use delegated::{run_delegated, DelegatedPlan};
pub use manual::{run_manual, ManualTarget};

/// Fail fast, naming the step that produces whichever input is missing.
pub fn require_inputs(layout: &Layout) -> Result<()> {
    let seed = layout.seed_archive();
    if !seed.exists() {
        return Err(BuildError::precondition(
            format!("Seed archive not found at {}.", seed.display()),
            "livecd fetch-seed",
        ));
    }
    let snapshot = layout.snapshot();
    if !is_non_empty_file(&snapshot) {
        return Err(BuildError::precondition(
            format!("Repository snapshot missing or empty at {}.", snapshot.display()),
            "livecd snapshot",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    #[test]
    fn names_the_missing_step() {
        let temp = tempfile::TempDir::new().unwrap();
        let layout = Config::with_base_dir(temp.path()).layout();

        match require_inputs(&layout).unwrap_err() {
            BuildError::Precondition { remedy, .. } => assert_eq!(remedy, "livecd fetch-seed"),
            other => panic!("unexpected: {other:?}"),
        }

        fs::create_dir_all(&layout.seeds_dir).unwrap();
        fs::write(layout.seed_archive(), b"seed").unwrap();
        match require_inputs(&layout).unwrap_err() {
            BuildError::Precondition { remedy, .. } => assert_eq!(remedy, "livecd snapshot"),
            other => panic!("unexpected: {other:?}"),
        }

        // An empty snapshot counts as missing.
        fs::create_dir_all(&layout.snapshots_dir).unwrap();
        fs::write(layout.snapshot(), b"").unwrap();
        assert!(require_inputs(&layout).is_err());

        fs::write(layout.snapshot(), b"sqsh").unwrap();
        assert!(require_inputs(&layout).is_ok());
    }
}
