//! File repository server over HTTP(S)

use super::{check_segment, Access, UploadReceipt, LATEST_VERSION};
use anyhow::{Context, Result};
use reqwest::blocking::{Body, Client, Response};
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    version: serde_json::Value,
}

pub struct HttpAccess {
    base_url: String,
    token: String,
    client: Client,
}

impl HttpAccess {
    pub fn new(url: &str, token: &str) -> Result<Self> {
        // Archives can take hours to stream, only connecting is bounded
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    fn backup_url(&self, collection_id: &str, version: Option<&str>) -> String {
        match version {
            Some(version) => format!(
                "{}/repository/collection/{}/backup/{}",
                self.base_url, collection_id, version
            ),
            None => format!("{}/repository/collection/{}/backup", self.base_url, collection_id),
        }
    }

    fn check_status(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        anyhow::bail!("{} failed with status {}: {}", action, status, body.trim())
    }
}

impl Access for HttpAccess {
    fn upload(&self, collection_id: &str, stream: Box<dyn Read + Send>) -> Result<UploadReceipt> {
        check_segment("collection id", collection_id)?;
        let url = self.backup_url(collection_id, None);
        info!("Uploading backup to {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("_token", self.token.as_str())])
            .header("Content-Type", "application/octet-stream")
            .body(Body::new(stream))
            .send()
            .context("Failed to send backup to the server")?;

        let response = Self::check_status(response, "Upload")?;
        let reply: UploadResponse = response
            .json()
            .context("Failed to parse upload response")?;

        let version = match reply.version {
            serde_json::Value::String(version) => version,
            other => other.to_string(),
        };
        debug!("Server stored version {}", version);

        Ok(UploadReceipt {
            version,
            bytes: None,
        })
    }

    fn download(&self, collection_id: &str, version: Option<&str>) -> Result<Box<dyn Read + Send>> {
        check_segment("collection id", collection_id)?;
        let version = version.unwrap_or(LATEST_VERSION);
        check_segment("version", version)?;

        let url = self.backup_url(collection_id, Some(version));
        info!("Downloading backup from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("_token", self.token.as_str())])
            .send()
            .context("Failed to fetch backup from the server")?;

        Ok(Box::new(Self::check_status(response, "Download")?))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
