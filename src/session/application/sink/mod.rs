//! Destinations for the connection blob.

pub mod file_sink;

use crate::core::domain::{error::VdiResult, model::connection_blob::ConnectionBlob};
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// Receives the connection blob at the end of a successful run.
///
/// The blob is handed over unchanged; implementations decide whether it
/// goes to a file, a viewer's stdin or a test buffer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    async fn deliver(&self, blob: &ConnectionBlob) -> VdiResult<()>;
}
