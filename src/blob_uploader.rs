use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("Upload task failed: {0}")]
    Task(String),
}

/// Logical bucket an upload belongs to; decides the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadCategory {
    Avatar,
    Wish,
}

impl UploadCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadCategory::Avatar => "avatar",
            UploadCategory::Wish => "wish",
        }
    }

    pub fn folder(&self) -> &'static str {
        match self {
            UploadCategory::Avatar => "ava/",
            UploadCategory::Wish => "wish_img/",
        }
    }
}

impl FromStr for UploadCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatar" => Ok(UploadCategory::Avatar),
            "wish" => Ok(UploadCategory::Wish),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UploadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedBlob {
    pub url: String,
    pub key: String,
}

/// Durable storage for generated images.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
        category: UploadCategory,
    ) -> Result<UploadedBlob, UploadError>;
}

/// Replaces everything except ASCII letters, digits and dots with `-`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `{folder}{unix_millis}-{sanitized name}`
pub fn object_key(category: UploadCategory, file_name: &str, timestamp_millis: i64) -> String {
    format!(
        "{}{}-{}",
        category.folder(),
        timestamp_millis,
        sanitize_file_name(file_name)
    )
}

fn public_url(public_base_url: &str, key: &str) -> String {
    format!("{}/{}", public_base_url.trim_end_matches('/'), key)
}

/// Stores objects on local disk; the HTTP service serves them back.
#[derive(Clone)]
pub struct LocalBlobUploader {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobUploader {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        Self {
            root,
            public_base_url: public_base_url.to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl BlobUploader for LocalBlobUploader {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        _content_type: &str,
        category: UploadCategory,
    ) -> Result<UploadedBlob, UploadError> {
        let key = object_key(category, file_name, chrono::Utc::now().timestamp_millis());
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        info!("Stored {} bytes at {}", bytes.len(), path.display());

        Ok(UploadedBlob {
            url: public_url(&self.public_base_url, &key),
            key,
        })
    }
}

/// PUTs objects to `{endpoint}/{key}`, e.g. a public-write bucket or proxy.
#[derive(Clone)]
pub struct HttpBlobUploader {
    agent: ureq::Agent,
    endpoint: String,
    public_base_url: String,
}

impl HttpBlobUploader {
    pub fn new(endpoint: &str, public_base_url: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: config.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            public_base_url: public_base_url.to_string(),
        }
    }
}

#[async_trait]
impl BlobUploader for HttpBlobUploader {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
        category: UploadCategory,
    ) -> Result<UploadedBlob, UploadError> {
        let key = object_key(category, file_name, chrono::Utc::now().timestamp_millis());
        let target = format!("{}/{}", self.endpoint, key);
        let agent = self.agent.clone();
        let content_type = content_type.to_string();

        tokio::task::spawn_blocking(move || {
            debug!("PUT {} ({} bytes)", target, bytes.len());
            agent
                .put(&target)
                .header("Content-Type", &content_type)
                .send(&bytes[..])?;
            Ok::<_, UploadError>(())
        })
        .await
        .map_err(|e| UploadError::Task(e.to_string()))??;

        Ok(UploadedBlob {
            url: public_url(&self.public_base_url, &key),
            key,
        })
    }
}
