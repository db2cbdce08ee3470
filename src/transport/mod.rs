//! Where archives go after they leave the handler, and how they come back
//!
//! [`Access`] stores and fetches archive streams; [`Encryption`] wraps them
//! on the way out and unwraps them on the way in.

mod encryption;
mod http;
mod local;

pub use encryption::{Encryption, PASSPHRASE_ENV};
pub use http::HttpAccess;
pub use local::LocalAccess;

use crate::config::AccessConfig;
use anyhow::Result;
use std::io::Read;

/// Version label meaning "the most recent one"
pub const LATEST_VERSION: &str = "latest";

/// Confirmation of a stored archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub version: String,
    /// Bytes stored, when the back-end knows it
    pub bytes: Option<u64>,
}

/// A storage back-end for archive streams
pub trait Access: Send + Sync {
    /// Store everything `stream` yields as a new version of `collection_id`
    fn upload(&self, collection_id: &str, stream: Box<dyn Read + Send>) -> Result<UploadReceipt>;

    /// Open a stored version, or the latest one when `version` is `None`
    fn download(&self, collection_id: &str, version: Option<&str>) -> Result<Box<dyn Read + Send>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Build the back-end an `[accesses]` entry describes
pub fn access_from_config(config: &AccessConfig) -> Result<Box<dyn Access>> {
    match config {
        AccessConfig::Http { url, token } => Ok(Box::new(HttpAccess::new(url, token.expose())?)),
        AccessConfig::Local { path } => Ok(Box::new(LocalAccess::new(crate::config::expand_tilde(path)))),
    }
}

/// Reject collection ids and versions that could escape a directory or URL segment
fn check_segment(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        anyhow::bail!("Invalid {} '{}'", kind, value);
    }
    Ok(())
}
