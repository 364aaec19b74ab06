//! HTTP implementation of the persistence and object-storage collaborators.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use shelf_platform::model::{FileEntity, FileId, UserId};
use shelf_platform::persistence::{
    CreateFolder, DeleteResult, EmptyTrashResult, Persistence, ProgressFn, StarResult,
    TrashResult, UploadFile,
};
use shelf_platform::storage::ObjectStore;

use crate::config::ShelfConfig;
use crate::error::DriveError;
use crate::protocol::{self, Endpoint, UPLOAD_CHUNK_SIZE};

/// REST client for the persistence service
#[derive(Clone)]
pub struct HttpPersistence {
    client: Client,
    base: String,
}

impl HttpPersistence {
    /// Fails with a configuration error when the API base URL is missing,
    /// before any request is made.
    pub fn new(config: &ShelfConfig) -> Result<Self, DriveError> {
        let base = config.api_base()?.to_string();
        let client = build_client(config)?;
        Ok(Self { client, base })
    }

    async fn send_json<T: DeserializeOwned>(&self, endpoint: Endpoint<'_>) -> Result<T> {
        let url = endpoint.url(&self.base)?;
        debug!("{} {}", endpoint.method(), url);
        let resp = self
            .client
            .request(endpoint.method(), url)
            .send()
            .await
            .with_context(|| format!("request to {:?} failed", endpoint))?;
        read_json(resp).await
    }
}

/// Fetches object-storage URLs (CDN or direct file URLs)
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
}

impl HttpObjectStore {
    pub fn new(config: &ShelfConfig) -> Result<Self, DriveError> {
        Ok(Self {
            client: build_client(config)?,
        })
    }
}

fn build_client(config: &ShelfConfig) -> Result<Client, DriveError> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| DriveError::Configuration(format!("failed to build HTTP client: {}", e)))
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{}", protocol::error_message(status, &body));
    }
    resp.json::<T>().await.context("invalid response body")
}

/// Split `data` into upload chunks, reporting cumulative progress as each one is handed to the body.
fn progress_chunks(
    data: Bytes,
    progress: Option<ProgressFn>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let total = data.len() as u64;
    let mut chunks = Vec::with_capacity(data.len() / UPLOAD_CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + UPLOAD_CHUNK_SIZE).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }

    let mut loaded = 0u64;
    stream::iter(chunks.into_iter().map(move |chunk| {
        loaded += chunk.len() as u64;
        if let Some(cb) = progress.as_ref() {
            cb(loaded, total);
        }
        Ok::<Bytes, std::io::Error>(chunk)
    }))
}

#[async_trait]
impl Persistence for HttpPersistence {
    async fn list_files(&self, user: &UserId, parent: Option<&FileId>) -> Result<Vec<FileEntity>> {
        self.send_json(Endpoint::ListFiles { user, parent }).await
    }

    async fn toggle_star(&self, id: &FileId) -> Result<StarResult> {
        self.send_json(Endpoint::ToggleStar(id)).await
    }

    async fn toggle_trash(&self, id: &FileId) -> Result<TrashResult> {
        self.send_json(Endpoint::ToggleTrash(id)).await
    }

    async fn delete_file(&self, id: &FileId) -> Result<DeleteResult> {
        self.send_json(Endpoint::DeleteFile(id)).await
    }

    async fn empty_trash(&self, user: &UserId) -> Result<EmptyTrashResult> {
        self.send_json(Endpoint::EmptyTrash(user)).await
    }

    async fn create_folder(&self, req: &CreateFolder) -> Result<FileEntity> {
        let endpoint = Endpoint::CreateFolder;
        let url = endpoint.url(&self.base)?;
        debug!("{} {} name={:?}", endpoint.method(), url, req.name);
        let resp = self
            .client
            .request(endpoint.method(), url)
            .json(req)
            .send()
            .await
            .context("create folder request failed")?;
        read_json(resp).await
    }

    async fn upload_file(
        &self,
        file: UploadFile,
        user: &UserId,
        parent: Option<&FileId>,
        progress: Option<ProgressFn>,
    ) -> Result<FileEntity> {
        let endpoint = Endpoint::Upload;
        let url = endpoint.url(&self.base)?;
        let size = file.size();
        info!("uploading {} ({} bytes) to {}", file.name, size, url);

        if let Some(cb) = progress.as_ref() {
            cb(0, size);
        }

        let mime = if file.content_type.is_empty() {
            "application/octet-stream"
        } else {
            file.content_type.as_str()
        };
        let body = Body::wrap_stream(progress_chunks(file.data.clone(), progress));
        let part = Part::stream_with_length(body, size)
            .file_name(file.name.clone())
            .mime_str(mime)
            .with_context(|| format!("invalid content type {:?}", mime))?;

        let mut form = Form::new()
            .part("file", part)
            .text("userId", user.as_str().to_string());
        if let Some(parent) = parent {
            form = form.text("parentId", parent.as_str().to_string());
        }

        let resp = self
            .client
            .request(endpoint.method(), url)
            .multipart(form)
            .send()
            .await
            .context("upload request failed")?;
        read_json(resp).await
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;

        if !resp.status().is_success() {
            bail!("download failed: HTTP {}", resp.status());
        }

        resp.bytes().await.context("failed to read download body")
    }
}
