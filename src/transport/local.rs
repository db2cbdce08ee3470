//! Archives kept in a local (or mounted) directory
//!
//! Layout: `<root>/<collection_id>/<version>.tar`, where the version is the
//! UTC time of the upload, so the greatest name is the newest archive.

use super::{check_segment, Access, UploadReceipt, LATEST_VERSION};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ARCHIVE_EXTENSION: &str = "tar";
const PARTIAL_SUFFIX: &str = "partial";

pub struct LocalAccess {
    root: PathBuf,
}

impl LocalAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_dir(&self, collection_id: &str) -> Result<PathBuf> {
        check_segment("collection id", collection_id)?;
        Ok(self.root.join(collection_id))
    }

    fn archive_path(dir: &Path, version: &str) -> PathBuf {
        dir.join(format!("{}.{}", version, ARCHIVE_EXTENSION))
    }

    /// Stored versions of a collection, oldest first
    pub fn versions(&self, collection_id: &str) -> Result<Vec<String>> {
        let dir = self.collection_dir(collection_id)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions: Vec<String> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {:?}", dir))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
                    return None;
                }
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        versions.sort();
        Ok(versions)
    }
}

impl Access for LocalAccess {
    fn upload(&self, collection_id: &str, mut stream: Box<dyn Read + Send>) -> Result<UploadReceipt> {
        let dir = self.collection_dir(collection_id)?;
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;

        let version = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let target = Self::archive_path(&dir, &version);
        let partial = target.with_extension(format!("{}.{}", ARCHIVE_EXTENSION, PARTIAL_SUFFIX));
        info!("Writing backup to {:?}", target);

        let written = (|| -> Result<u64> {
            let mut out = BufWriter::new(
                File::create(&partial).with_context(|| format!("Failed to create {:?}", partial))?,
            );
            let bytes = io::copy(&mut stream, &mut out).context("Failed to write backup stream")?;
            out.flush().context("Failed to flush backup file")?;
            Ok(bytes)
        })();

        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };

        fs::rename(&partial, &target)
            .with_context(|| format!("Failed to move {:?} into place", partial))?;
        debug!("Stored {} bytes as version {}", bytes, version);

        Ok(UploadReceipt {
            version,
            bytes: Some(bytes),
        })
    }

    fn download(&self, collection_id: &str, version: Option<&str>) -> Result<Box<dyn Read + Send>> {
        let dir = self.collection_dir(collection_id)?;

        let version = match version {
            None | Some(LATEST_VERSION) => self
                .versions(collection_id)?
                .pop()
                .with_context(|| format!("No backups stored for collection '{}'", collection_id))?,
            Some(version) => {
                check_segment("version", version)?;
                version.to_string()
            }
        };

        let path = Self::archive_path(&dir, &version);
        info!("Reading backup from {:?}", path);
        let file = File::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
