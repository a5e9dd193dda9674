//! CLI command handlers.
//!
//! Each submodule handles one CLI command:
//! - `build` - tool-delegated pipeline
//! - `manual` - manual pipeline (stage1 / stage2 / all)
//! - `fetch` - fetch-seed and snapshot on their own
//! - `clean` - remove the work area
//! - `show` - configuration and status
//! - `preflight` - host checks

pub mod build;
pub mod clean;
pub mod fetch;
pub mod manual;
mod preflight;
pub mod show;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use fetch::{cmd_fetch_seed, cmd_snapshot};
pub use manual::cmd_manual;
pub use preflight::cmd_preflight;
pub use show::cmd_show;

use livecd_builder::context::BuildContext;
use livecd_builder::error::BuildError;

/// Attach the failing stage and its log file to a library error.
pub(crate) trait StageContext<T> {
    fn in_stage(self, ctx: &BuildContext) -> anyhow::Result<T>;
}

impl<T> StageContext<T> for Result<T, BuildError> {
    fn in_stage(self, ctx: &BuildContext) -> anyhow::Result<T> {
        self.map_err(|err| {
            let stage = ctx.log().current_stage();
            let log = ctx.log().path_for(&stage);
            let kind = err.kind();
            anyhow::Error::new(err).context(format!(
                "Stage '{}' failed ({} error; log: {})",
                stage,
                kind,
                log.display()
            ))
        })
    }
}
