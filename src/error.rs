//! Error taxonomy for the image pipeline.
//!
//! Every fatal condition a stage can hit maps to one variant here. The CLI
//! layer wraps these in `anyhow` for context, but library code and tests
//! match on the variants directly.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A required cached input is missing. Always carries the command that fixes it.
    #[error("{message}\n  Run: {remedy}")]
    Precondition { message: String, remedy: String },

    /// The mirror index could not be turned into exactly one download path.
    #[error("could not resolve seed archive from {url}: {reason}")]
    Resolution { url: String, reason: String },

    #[error("download of {url} did not complete: {reason}")]
    Transfer { url: String, reason: String },

    #[error("archive creation failed: {0}")]
    Archive(String),

    #[error("mount operation failed on {}: {reason}", target.display())]
    Mount { target: PathBuf, reason: String },

    /// A mandatory command exited nonzero.
    #[error("{context} (exit code {code}){}", format_stderr(stderr))]
    CommandFailed {
        context: String,
        code: i32,
        stderr: String,
    },

    #[error("required artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("ISO generation failed: {0}")]
    ImageBuild(String),

    /// Another build owns the build root.
    #[error("another build is already running:\n{0}")]
    Busy(String),

    #[error("interrupted by signal")]
    Interrupted,

    #[error("failed to execute '{program}'. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", tail_lines(trimmed, 20))
    }
}

/// Keep the last `n` lines of tool output; the full text is in the build log.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

impl BuildError {
    pub fn precondition(message: impl Into<String>, remedy: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
            remedy: remedy.into(),
        }
    }

    pub fn mount(target: &Path, reason: impl Into<String>) -> Self {
        Self::Mount {
            target: target.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Short label of the failure class, used in the final CLI message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition { .. } => "precondition",
            Self::Resolution { .. } => "resolution",
            Self::Transfer { .. } => "transfer",
            Self::Archive(_) => "archive",
            Self::Mount { .. } => "mount",
            Self::CommandFailed { .. } => "command",
            Self::ArtifactMissing(_) => "artifact-missing",
            Self::ImageBuild(_) => "image-build",
            Self::Busy(_) => "busy",
            Self::Interrupted => "interrupted",
            Self::Spawn { .. } | Self::Io { .. } => "io",
        }
    }
}

/// Attach a path-bearing message to `io::Error`s, the way `anyhow::Context` would.
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| BuildError::Io {
            context: f().into(),
            source,
        })
    }
}
