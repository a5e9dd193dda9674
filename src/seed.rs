//! Seed fetcher - downloads and caches the stage3 archive.
//!
//! The mirror publishes `latest-stage3-<arch>-<variant>.txt`, a (usually
//! clearsigned) index naming the current build, e.g.
//!
//! ```text
//! # Latest as of Sun, 06 Oct 2024 17:03:09 +0000
//! # ts=1728234189
//! 20241006T170309Z/stage3-amd64-openrc-20241006T170309Z.tar.xz 267328860
//! ```
//!
//! The archive is cached under a name that does not contain the date, so a
//! cached seed is found without touching the network. The cache is trusted
//! as-is; delete the file to pick up a newer build.

use std::fs;
use std::path::PathBuf;

use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::files::{file_size, human_size, is_non_empty_file};
use crate::layout::sidecar;
use crate::process::{Cmd, FailureKind};

/// A cached seed archive.
#[derive(Debug, Clone)]
pub struct SeedArchive {
    pub path: PathBuf,
    pub size: u64,
    /// False when the cache already held the archive.
    pub downloaded: bool,
}

/// URL of the "latest" pointer file for the configured arch/variant.
pub fn index_url(mirror: &str, arch: &str, variant: &str) -> String {
    format!("{mirror}/{arch}/autobuilds/latest-stage3-{arch}-{variant}.txt")
}

/// Extract the single archive path named by an index file.
pub fn parse_index(text: &str) -> std::result::Result<String, String> {
    let mut in_signature = false;
    let mut candidates: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("-----BEGIN PGP SIGNATURE") {
            in_signature = true;
            continue;
        }
        if line.starts_with("-----END PGP SIGNATURE") {
            in_signature = false;
            continue;
        }
        if in_signature || line.is_empty() || line.starts_with('#') || line.starts_with("-----") {
            continue;
        }
        if line.starts_with("Hash:") {
            continue;
        }

        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        let file_name = token.rsplit('/').next().unwrap_or(token);
        if file_name.starts_with("stage3-") && file_name.contains(".tar.") {
            let token = token.trim_start_matches('/').to_string();
            if !candidates.contains(&token) {
                candidates.push(token);
            }
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err("index names no stage3 archive".to_string()),
        n => Err(format!("index names {n} stage3 archives: {}", candidates.join(", "))),
    }
}

/// Fetch the seed archive into the cache unless it is already there.
pub fn fetch_seed(ctx: &BuildContext) -> Result<SeedArchive> {
    ctx.begin_stage("Fetch seed");
    let config = ctx.config;
    let cache = ctx.layout.seed_archive();

    if cache.exists() {
        let size = file_size(&cache);
        println!("Seed already cached at {} ({})", cache.display(), human_size(size));
        return Ok(SeedArchive {
            path: cache,
            size,
            downloaded: false,
        });
    }

    fs::create_dir_all(&ctx.layout.seeds_dir)
        .io_context(|| format!("Failed to create {}", ctx.layout.seeds_dir.display()))?;

    let index = index_url(&config.mirror, &config.arch, &config.variant);
    println!("Resolving latest seed from {}", index);
    let listing = ctx.run(
        Cmd::new("curl")
            .args(["-fsSL", "--retry", "3"])
            .arg(&index)
            .fails_as(FailureKind::Transfer)
            .error_msg("Fetching seed index failed"),
    )?;
    let remote = parse_index(&listing.stdout).map_err(|reason| BuildError::Resolution {
        url: index.clone(),
        reason,
    })?;
    let url = format!("{}/{}/autobuilds/{}", config.mirror, config.arch, remote);

    let partial = sidecar(&cache, "part");
    if partial.exists() {
        fs::remove_file(&partial)
            .io_context(|| format!("Failed to remove stale {}", partial.display()))?;
    }

    println!("Downloading {}", url);
    ctx.run(
        Cmd::new("curl")
            .args(["-fL", "--retry", "3", "-o"])
            .arg_path(&partial)
            .arg(&url)
            .fails_as(FailureKind::Transfer)
            .error_msg("Seed download failed"),
    )?;

    if !is_non_empty_file(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(BuildError::Transfer {
            url,
            reason: "no data received".to_string(),
        });
    }

    fs::rename(&partial, &cache)
        .io_context(|| format!("Failed to move seed into {}", cache.display()))?;
    fs::write(sidecar(&cache, "source"), format!("{url}\n"))
        .io_context(|| "Failed to record seed source".to_string())?;

    let size = file_size(&cache);
    println!("Downloaded {} ({})", cache.display(), human_size(size));
    Ok(SeedArchive {
        path: cache,
        size,
        downloaded: true,
    })
}
