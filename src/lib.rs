//! livecd-builder library.
//!
//! Exposes the pipeline components to the `livecd` binary and to the
//! integration tests under `tests/`.

pub mod buildlog;
pub mod checksum;
pub mod chroot;
pub mod clean;
pub mod config;
pub mod context;
pub mod error;
pub mod files;
pub mod finalize;
pub mod image;
pub mod layout;
pub mod lock;
pub mod mounts;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod seed;
pub mod signal;
pub mod snapshot;
pub mod status;
pub mod timing;

pub use config::Config;
pub use context::BuildContext;
pub use error::{BuildError, Result};
