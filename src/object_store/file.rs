use std::path::{Path, PathBuf};

use anyhow::Context;

use super::ObjectStore;

/// A snapshot published as a plain local file.
#[derive(Debug)]
pub struct FileObjectStore {
    path: PathBuf,
}

impl FileObjectStore {
    /// `path` is where the published snapshot lives.
    pub fn new(path: &Path) -> Self {
        FileObjectStore {
            path: path.to_owned(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for FileObjectStore {
    async fn download_object(&self, dest: &Path) -> anyhow::Result<()> {
        tokio::fs::copy(&self.path, dest)
            .await
            .with_context(|| format!("copying {} to {}", self.path.display(), dest.display()))?;
        Ok(())
    }
}
