use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type the backend stores on folder rows.
pub const FOLDER_CONTENT_TYPE: &str = "folder";

/// Opaque, server-assigned entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity handed over by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("entity {0} has an empty name")]
    EmptyName(FileId),
    #[error("folder {0} carries a storage reference")]
    FolderWithStorage(FileId),
    #[error("entity {0} is its own parent")]
    SelfParent(FileId),
}

/// One file or folder node as the persistence service reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntity {
    pub id: FileId,
    pub name: String,
    /// MIME type, or `"folder"`/empty for folders
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub is_trash: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<FileId>,
    /// Object-storage path, used to build CDN URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Direct retrieval URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl FileEntity {
    pub fn is_image(&self) -> bool {
        !self.is_folder && self.content_type.starts_with("image/")
    }

    pub fn has_storage_ref(&self) -> bool {
        self.path.is_some() || self.file_url.is_some()
    }

    /// Check the invariants a single entity must hold on its own.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::EmptyName(self.id.clone()));
        }
        if self.is_folder && self.has_storage_ref() {
            return Err(ModelError::FolderWithStorage(self.id.clone()));
        }
        if self.parent_id.as_ref() == Some(&self.id) {
            return Err(ModelError::SelfParent(self.id.clone()));
        }
        Ok(())
    }
}
