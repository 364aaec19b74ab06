use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the bytes behind a retrieval URL
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}
