//! Interrupt handling.
//!
//! The handler only records that a signal arrived. Child processes share our
//! foreground process group and receive the signal themselves; once the
//! current child exits, `BuildContext::run` reports `Interrupted` and normal
//! unwinding drops the mount guard, which unmounts everything in reverse.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::debug;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
pub fn install_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only touches an atomic, which is async-signal-safe.
        unsafe { sigaction(sig, &action) }?;
    }
    debug!("signal handlers installed");
    Ok(())
}

/// The flag the handlers set; `BuildContext` polls it between commands.
pub fn flag() -> &'static AtomicBool {
    &INTERRUPTED
}
