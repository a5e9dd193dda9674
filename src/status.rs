//! Pipeline state as seen from disk and the mount table.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::files::{file_size, human_size};
use crate::finalize::BootableImage;
use crate::mounts::mounts_under;

#[derive(Debug)]
pub struct BuildStatus {
    pub seed: Option<(PathBuf, u64)>,
    pub snapshot: Option<(PathBuf, u64)>,
    pub root_extracted: bool,
    pub active_mounts: Vec<PathBuf>,
    pub published: Option<BootableImage>,
}

impl BuildStatus {
    pub fn collect(config: &Config) -> Result<Self> {
        let layout = config.layout();
        let present = |path: PathBuf| path.exists().then(|| {
            let size = file_size(&path);
            (path, size)
        });

        let iso = layout.published_iso();
        let published = if BootableImage::manifest_path(&iso).exists() {
            Some(BootableImage::load(&iso)?)
        } else {
            None
        };

        Ok(Self {
            seed: present(layout.seed_archive()),
            snapshot: present(layout.snapshot()),
            root_extracted: layout.extraction_marker().exists(),
            active_mounts: mounts_under(&layout.work_dir)?,
            published,
        })
    }

    pub fn print(&self) {
        println!("Build status:");
        let describe = |entry: &Option<(PathBuf, u64)>| match entry {
            Some((path, size)) => format!("{} ({})", path.display(), human_size(*size)),
            None => "missing".to_string(),
        };
        println!("  Seed:        {}", describe(&self.seed));
        println!("  Snapshot:    {}", describe(&self.snapshot));
        println!(
            "  Build root:  {}",
            if self.root_extracted { "extracted" } else { "not extracted" }
        );
        if self.active_mounts.is_empty() {
            println!("  Mounts:      none");
        } else {
            println!("  Mounts:      {} active", self.active_mounts.len());
            for mount in &self.active_mounts {
                println!("    {}", mount.display());
            }
        }
        match &self.published {
            Some(image) => {
                println!("  Image:       {} ({})", image.path.display(), human_size(image.size));
                println!("    label {} by {} driver at {}", image.label, image.driver, image.created);
                println!("    sha256 {}", image.sha256);
            }
            None => println!("  Image:       none published"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    #[test]
    fn empty_base_reports_everything_missing() {
        let temp = tempfile::TempDir::new().unwrap();
        let status = BuildStatus::collect(&Config::with_base_dir(temp.path())).unwrap();
        assert!(status.seed.is_none());
        assert!(status.snapshot.is_none());
        assert!(!status.root_extracted);
        assert!(status.active_mounts.is_empty());
        assert!(status.published.is_none());
    }

    #[test]
    fn reads_published_manifest() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config::with_base_dir(temp.path());
        let iso = config.layout().published_iso();
        fs::create_dir_all(iso.parent().unwrap()).unwrap();
        let image = BootableImage {
            path: iso.clone(),
            label: "LIVECD_AMD64".into(),
            sha256: "ab".repeat(32),
            size: 4096,
            created: "2026-01-01T00:00:00Z".into(),
            driver: "manual".into(),
        };
        fs::write(
            BootableImage::manifest_path(&iso),
            serde_json::to_string(&image).unwrap(),
        )
        .unwrap();

        let status = BuildStatus::collect(&config).unwrap();
        assert_eq!(status.published, Some(image));
        assert!(Path::new(&status.published.unwrap().path).ends_with("livecd-amd64.iso"));
    }
}
