use std::fmt::Debug;
use std::path::Path;

use anyhow::Context;
use futures::StreamExt;
use reqwest::{Client, StatusCode, Url};
use tokio_util::io::StreamReader;

use super::ObjectStore;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A snapshot published behind `http://` or `https://`.
pub struct HttpObjectStore {
    url: Url,
    client: Client,
}

impl Debug for HttpObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObjectStore")
            .field("url", &self.url.as_str())
            .finish()
    }
}

impl HttpObjectStore {
    /// Creates an http or https object store serving the snapshot at `url`.
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .with_context(|| format!("creating an http client to connect to {url}"))?;
        Ok(Self { url, client })
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download_object(&self, dest: &Path) -> anyhow::Result<()> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .with_context(|| format!("connecting to {}", self.url))?;
        match response.status() {
            StatusCode::OK => (),
            other => anyhow::bail!("{} returned {other:?}", self.url),
        }
        let stream = response.bytes_stream();
        let mut reader = StreamReader::new(stream.map(|r| r.map_err(std::io::Error::other)));
        let mut out = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;
        tokio::io::copy(&mut reader, &mut out)
            .await
            .with_context(|| format!("writing {} to {}", self.url, dest.display()))?;
        Ok(())
    }
}
