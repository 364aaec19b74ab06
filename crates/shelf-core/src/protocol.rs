use reqwest::{Method, Url};
use serde::Deserialize;

use shelf_platform::model::{FileId, UserId};

use crate::error::DriveError;

/// Chunk size for streamed uploads (64 KB); progress is reported per chunk
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum length of a server error body echoed back to the user
pub const MAX_ERROR_BODY: usize = 200;

/// REST endpoints of the persistence service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    ListFiles {
        user: &'a UserId,
        parent: Option<&'a FileId>,
    },
    ToggleStar(&'a FileId),
    ToggleTrash(&'a FileId),
    DeleteFile(&'a FileId),
    EmptyTrash(&'a UserId),
    CreateFolder,
    Upload,
}

impl Endpoint<'_> {
    pub fn method(&self) -> Method {
        match self {
            Self::ListFiles { .. } => Method::GET,
            Self::ToggleStar(_) | Self::ToggleTrash(_) => Method::PATCH,
            Self::DeleteFile(_) | Self::EmptyTrash(_) => Method::DELETE,
            Self::CreateFolder | Self::Upload => Method::POST,
        }
    }

    fn segments(&self) -> Vec<&str> {
        match self {
            Self::ListFiles { .. } => vec!["api", "files"],
            Self::ToggleStar(id) => vec!["api", "files", id.as_str(), "star"],
            Self::ToggleTrash(id) => vec!["api", "files", id.as_str(), "trash"],
            Self::DeleteFile(id) => vec!["api", "files", id.as_str(), "delete"],
            Self::EmptyTrash(_) => vec!["api", "files", "empty-trash"],
            Self::CreateFolder => vec!["api", "folders", "create"],
            Self::Upload => vec!["api", "files", "upload"],
        }
    }

    /// Full request URL under `base`. Ids are percent-encoded as single path segments.
    pub fn url(&self, base: &str) -> Result<Url, DriveError> {
        let mut url = Url::parse(base)
            .map_err(|e| DriveError::Configuration(format!("invalid API base URL {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| DriveError::Configuration(format!("API base URL {} cannot be a base", base)))?
            .pop_if_empty()
            .extend(self.segments());

        match self {
            Self::ListFiles { user, parent } => {
                let mut query = url.query_pairs_mut();
                query.append_pair("userId", user.as_str());
                if let Some(parent) = parent {
                    query.append_pair("parentId", parent.as_str());
                }
            }
            Self::EmptyTrash(user) => {
                url.query_pairs_mut().append_pair("userId", user.as_str());
            }
            _ => {}
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

/// Human-readable message for a non-success response
pub fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        return format!("HTTP {}", status);
    }
    let detail: String = detail.chars().take(MAX_ERROR_BODY).collect();
    format!("HTTP {} - {}", status, detail)
}
