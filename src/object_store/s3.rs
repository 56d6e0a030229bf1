use std::fmt::Debug;
use std::path::Path;

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;

use super::ObjectStore;

/// A snapshot published as an object in an S3 bucket.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    key: String,
}

impl Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish()
    }
}

impl S3ObjectStore {
    /// Creates a client for the object at `s3://bucket/key` in `region`.
    ///
    /// Credentials come from the usual AWS provider chain (environment,
    /// shared profile, instance metadata).
    pub async fn new(region: String, bucket: String, key: String) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;
        S3ObjectStore {
            client: Client::new(&config),
            bucket,
            key,
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download_object(&self, dest: &Path) -> anyhow::Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .with_context(|| format!("fetching s3://{}/{}", self.bucket, self.key))?;
        let mut out = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;
        let mut body = response.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .with_context(|| format!("streaming s3://{}/{}", self.bucket, self.key))?
        {
            out.write_all(&chunk)
                .await
                .with_context(|| format!("writing {}", dest.display()))?;
        }
        out.flush()
            .await
            .with_context(|| format!("flushing {}", dest.display()))?;
        Ok(())
    }
}
