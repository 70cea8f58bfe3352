use super::ConnectionSink;
use crate::core::domain::{
    error::{VdiError, VdiResult},
    model::connection_blob::ConnectionBlob,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the blob to a file, replacing previous content.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConnectionSink for FileSink {
    async fn deliver(&self, blob: &ConnectionBlob) -> VdiResult<()> {
        tokio::fs::write(&self.path, blob.as_bytes())
            .await
            .map_err(|e| VdiError::Sink(format!("{}: {}", self.path.display(), e)))?;
        info!(path = %self.path.display(), bytes = blob.len(), "connection file written");
        Ok(())
    }
}
