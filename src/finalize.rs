//! Artifact finalizer - publishes an ISO to the output directory.
//!
//! The ISO, its checksum sidecar and its JSON description are first staged
//! as `.part` files. The staged ISO is hashed and compared against the
//! source's own sidecar when one exists; only then are the three renamed into
//! place. A failed publish removes what it staged and leaves any previously
//! published image untouched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::checksum::{read_sidecar, sha256_file, sidecar_line};
use crate::context::BuildContext;
use crate::error::{BuildError, IoContext, Result};
use crate::files::{file_size, human_size, is_non_empty_file};
use crate::layout::sidecar;

/// A published, checksummed ISO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootableImage {
    pub path: PathBuf,
    pub label: String,
    pub sha256: String,
    pub size: u64,
    /// RFC 3339 publication time.
    pub created: String,
    /// Which pipeline driver produced the image (`manual` or `delegated`).
    pub driver: String,
}

impl BootableImage {
    pub fn manifest_path(iso: &Path) -> PathBuf {
        sidecar(iso, "json")
    }

    /// Read the description written next to a published ISO.
    pub fn load(iso: &Path) -> Result<Self> {
        let path = Self::manifest_path(iso);
        let text = fs::read_to_string(&path)
            .io_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| {
            BuildError::ArtifactMissing(format!("unreadable image manifest {}: {}", path.display(), e))
        })
    }
}

/// Copy `source` to the stable output path and write its sidecars.
pub fn publish(ctx: &BuildContext, source: &Path, driver: &str) -> Result<BootableImage> {
    ctx.begin_stage("Finalize");
    if !is_non_empty_file(source) {
        return Err(BuildError::ArtifactMissing(format!(
            "ISO {} is missing or empty; nothing to publish",
            source.display()
        )));
    }

    let target = ctx.layout.published_iso();
    let output_dir = &ctx.layout.output_dir;
    fs::create_dir_all(output_dir)
        .io_context(|| format!("Failed to create {}", output_dir.display()))?;

    let checksum = sidecar(&target, "sha256");
    let manifest = BootableImage::manifest_path(&target);
    let moves = [
        (sidecar(&target, "part"), target.clone()),
        (sidecar(&checksum, "part"), checksum.clone()),
        (sidecar(&manifest, "part"), manifest),
    ];

    let image = match stage(ctx, source, &target, driver, &moves) {
        Ok(image) => image,
        Err(e) => {
            for (staged, _) in &moves {
                let _ = fs::remove_file(staged);
            }
            return Err(e);
        }
    };
    for (staged, final_path) in &moves {
        fs::rename(staged, final_path)
            .io_context(|| format!("Failed to move {} into place", final_path.display()))?;
    }

    info!(iso = %target.display(), sha256 = %image.sha256, driver, "image published");
    println!("  Output:   {} ({})", target.display(), human_size(image.size));
    println!("  Checksum: {}", checksum.display());
    println!("  Label:    {}", image.label);
    Ok(image)
}

/// Write the staged ISO, sidecar and manifest named by the first element of
/// each pair in `moves`, verifying the ISO copy before describing it.
fn stage(
    ctx: &BuildContext,
    source: &Path,
    target: &Path,
    driver: &str,
    moves: &[(PathBuf, PathBuf); 3],
) -> Result<BootableImage> {
    let [(partial, _), (checksum_part, _), (manifest_part, _)] = moves;

    fs::copy(source, partial).io_context(|| {
        format!("Failed to copy {} to {}", source.display(), partial.display())
    })?;
    let sha256 = sha256_file(partial)?;
    let source_sidecar = sidecar(source, "sha256");
    if source_sidecar.exists() {
        let expected = read_sidecar(&source_sidecar)?;
        if expected != sha256 {
            return Err(BuildError::ImageBuild(format!(
                "copy of {} does not match its checksum (expected {}, got {})",
                source.display(),
                expected,
                sha256
            )));
        }
    }

    let size = file_size(partial);
    if size == 0 {
        return Err(BuildError::ArtifactMissing(format!("{} is empty", partial.display())));
    }
    fs::write(checksum_part, sidecar_line(target, &sha256)?)
        .io_context(|| format!("Failed to write {}", checksum_part.display()))?;

    let image = BootableImage {
        path: target.to_path_buf(),
        label: ctx.config.iso_label.clone(),
        sha256,
        size,
        created: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("unknown")),
        driver: driver.to_string(),
    };
    let json = serde_json::to_string_pretty(&image)
        .map_err(|e| BuildError::ImageBuild(format!("cannot describe image: {e}")))?;
    fs::write(manifest_part, json + "\n")
        .io_context(|| format!("Failed to write {}", manifest_part.display()))?;
    Ok(image)
}
