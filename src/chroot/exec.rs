//! In-root executor.
//!
//! Commands run as `chroot <root> env -i ... /bin/bash -lc <script>` with a
//! scrubbed environment, so nothing from the host shell leaks into package
//! builds. Callers pick the policy: mandatory steps abort, advisory steps
//! (service registration, package installation) only warn.

use std::path::Path;

use crate::context::BuildContext;
use crate::error::Result;
use crate::process::{Cmd, CommandResult, Policy};

const IN_ROOT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Build the invocation for `script` inside `root`.
pub fn in_root(root: &Path, script: &str) -> Cmd {
    Cmd::new("chroot")
        .arg_path(root)
        .args(["/usr/bin/env", "-i", "HOME=/root", "TERM=linux", "LC_ALL=C.UTF-8"])
        .arg(format!("PATH={IN_ROOT_PATH}"))
        .args(["/bin/bash", "-lc", script])
}

/// Run `script` inside `root` under `policy`.
///
/// `what` names the step in error messages and warnings.
pub fn run_in_root(
    ctx: &BuildContext,
    root: &Path,
    what: &str,
    script: &str,
    policy: Policy,
) -> Result<CommandResult> {
    let cmd = in_root(root, script).error_msg(format!("{what} failed inside the build root"));
    let cmd = match policy {
        Policy::Mandatory => cmd,
        Policy::Advisory => cmd.advisory(),
    };
    ctx.run(cmd)
}
