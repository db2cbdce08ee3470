//! Test fixtures and sample data

use crate::config_builder::LOCAL_ACCESS;
use anyhow::Result;
use container_backup::config::BackupConfig;
use container_backup::transport::{Access, UploadReceipt};
use parking_lot::Mutex;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

/// Paths used throughout the examples of a web container
pub fn www_paths() -> Vec<String> {
    vec![
        "/var/www".to_string(),
        "/var/log/nginx/access.log".to_string(),
    ]
}

fn backup(backup_type: &str, container: Option<&str>, paths: Vec<String>) -> BackupConfig {
    BackupConfig {
        backup_type: backup_type.to_string(),
        access: LOCAL_ACCESS.to_string(),
        encryption: None,
        collection_id: "collection-1".to_string(),
        container: container.map(str::to_string),
        paths,
        docker_bin: None,
        tar_pack_cmd: None,
        tar_unpack_cmd: None,
        temp_image_name: None,
        temp_image_cmd: None,
        restore_target: None,
    }
}

/// `docker_volumes` definition of `container`, as in the README example
pub fn offline_backup(container: &str) -> BackupConfig {
    BackupConfig {
        temp_image_name: Some("alpine:3.9".to_string()),
        temp_image_cmd: Some("apk add --update xz bzip2 && sleep 3600".to_string()),
        ..backup("docker_volumes", Some(container), www_paths())
    }
}

pub fn hot_backup(container: &str) -> BackupConfig {
    backup("docker_hot_volumes", Some(container), www_paths())
}

pub fn directory_backup(paths: Vec<String>) -> BackupConfig {
    backup("directory", None, paths)
}

/// Populate `root` with a small tree of files; returns the relative paths written
pub fn sample_tree(root: &Path) -> Vec<String> {
    let files = [
        ("www/index.html", "<h1>hello</h1>"),
        ("www/assets/app.js", "console.log('hi');"),
        ("logs/access.log", "GET / 200\nGET /favicon.ico 404\n"),
    ];

    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        fs::write(&path, content).expect("Failed to write fixture file");
    }

    files.iter().map(|(relative, _)| relative.to_string()).collect()
}

/// In-memory [`Access`] recording every upload
#[derive(Clone, Default)]
pub struct RecordingAccess {
    uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    fail_uploads: bool,
}

impl RecordingAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the stream partially, then fail like a dropped connection
    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().clone()
    }
}

impl Access for RecordingAccess {
    fn upload(&self, collection_id: &str, mut stream: Box<dyn Read + Send>) -> Result<UploadReceipt> {
        if self.fail_uploads {
            let mut first = [0u8; 1];
            let _ = stream.read(&mut first)?;
            anyhow::bail!("connection reset by peer");
        }

        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        let mut uploads = self.uploads.lock();
        uploads.push((collection_id.to_string(), data.clone()));

        Ok(UploadReceipt {
            version: uploads.len().to_string(),
            bytes: Some(data.len() as u64),
        })
    }

    fn download(&self, collection_id: &str, version: Option<&str>) -> Result<Box<dyn Read + Send>> {
        let uploads = self.uploads.lock();
        let stored: Vec<&Vec<u8>> = uploads
            .iter()
            .filter(|(id, _)| id == collection_id)
            .map(|(_, data)| data)
            .collect();

        let data = match version {
            None | Some("latest") => stored.last().copied(),
            Some(version) => version
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| stored.get(i).copied()),
        };

        match data {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => anyhow::bail!("No backup of '{}' stored", collection_id),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
