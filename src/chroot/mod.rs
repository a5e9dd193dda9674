//! Build root lifecycle: provisioning, in-root execution and configuration.
//!
//! - [`provision`] extracts the seed and establishes the mount set
//! - [`exec`] runs commands inside the root via `chroot`
//! - [`configure`] writes identity files, users, locales and services
//! - [`packages`] installs the package set (advisory per package)

pub mod configure;
pub mod exec;
pub mod packages;
pub mod provision;

pub use configure::configure_system;
pub use exec::{in_root, run_in_root};
pub use packages::{install_packages, PackageReport};
pub use provision::{provision, standard_mounts, ProvisionedRoot};
