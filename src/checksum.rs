//! SHA-256 helpers for published artifacts.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{BuildError, IoContext, Result};
use crate::layout::sidecar;

/// Hex SHA-256 of a file's content, streamed.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).io_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .io_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Sidecar line for `path` in `sha256sum` format (`<hash>  <filename>`),
/// using just the file name so `sha256sum -c` works from the output directory.
pub fn sidecar_line(path: &Path, hash: &str) -> Result<String> {
    let name = path
        .file_name()
        .ok_or_else(|| BuildError::ArtifactMissing(format!("no file name in {}", path.display())))?
        .to_string_lossy();
    Ok(format!("{hash}  {name}\n"))
}

/// Write `<file>.sha256` next to `path`.
pub fn write_sidecar(path: &Path, hash: &str) -> Result<PathBuf> {
    let sidecar_path = sidecar(path, "sha256");
    fs::write(&sidecar_path, sidecar_line(path, hash)?)
        .io_context(|| format!("Failed to write {}", sidecar_path.display()))?;
    Ok(sidecar_path)
}

/// Hash recorded in a sidecar file.
pub fn read_sidecar(sidecar_path: &Path) -> Result<String> {
    let content = fs::read_to_string(sidecar_path)
        .io_context(|| format!("Failed to read {}", sidecar_path.display()))?;
    content
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| BuildError::ArtifactMissing(format!("empty checksum file {}", sidecar_path.display())))
}
