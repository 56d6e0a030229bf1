//! Downloading published snapshots from wherever they live.

/// support for local files
pub mod file;
/// support for `http://` and `https://` endpoints
pub mod http;
/// support for s3 buckets
pub mod s3;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::StorageConfig;

/// One downloadable snapshot object.
///
/// Implementations carry the full coordinates of the published object; the
/// caller only chooses where the bytes land.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Downloads the published snapshot to `dest`.
    ///
    /// `dest`'s parent directory must exist. On failure the state of `dest`
    /// is unspecified and the caller is expected to clean it up.
    async fn download_object(&self, dest: &Path) -> anyhow::Result<()>;
}

/// An object store of unspecified implementation, shareable across fetches.
pub type SharedObjectStore = Arc<dyn ObjectStore>;

/// Returns the object store described by the storage descriptor.
pub async fn from_config(config: &StorageConfig) -> anyhow::Result<SharedObjectStore> {
    match config {
        StorageConfig::S3 {
            region,
            bucket,
            path,
        } => Ok(Arc::new(
            s3::S3ObjectStore::new(region.clone(), bucket.clone(), path.clone()).await,
        )),
        StorageConfig::Http { url } => {
            let url = reqwest::Url::parse(url)
                .with_context(|| format!("{url} is not a valid snapshot url"))?;
            Ok(Arc::new(http::HttpObjectStore::new(url)?))
        }
        StorageConfig::File { path } => Ok(Arc::new(file::FileObjectStore::new(path))),
    }
}
