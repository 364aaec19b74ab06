use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::model::{FileEntity, FileId, UserId};

/// Upload progress callback: `(loaded, total)` in bytes. Advisory only.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarResult {
    pub is_starred: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashResult {
    pub is_trash: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmptyTrashResult {
    #[serde(default)]
    pub deleted_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolder {
    pub name: String,
    pub user_id: UserId,
    pub parent_id: Option<FileId>,
}

/// File bytes selected for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// The authoritative backend. Implementations perform I/O only; all local
/// state handling lives in the core.
///
/// `empty_trash` must be all-or-nothing on the server side: the client
/// treats any error as "nothing was deleted" and restores its local view.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn list_files(&self, user: &UserId, parent: Option<&FileId>) -> Result<Vec<FileEntity>>;
    async fn toggle_star(&self, id: &FileId) -> Result<StarResult>;
    async fn toggle_trash(&self, id: &FileId) -> Result<TrashResult>;
    async fn delete_file(&self, id: &FileId) -> Result<DeleteResult>;
    async fn empty_trash(&self, user: &UserId) -> Result<EmptyTrashResult>;
    async fn create_folder(&self, req: &CreateFolder) -> Result<FileEntity>;
    async fn upload_file(
        &self,
        file: UploadFile,
        user: &UserId,
        parent: Option<&FileId>,
        progress: Option<ProgressFn>,
    ) -> Result<FileEntity>;
}
