use serde::Serialize;
use thiserror::Error;

use shelf_platform::model::FileId;

/// Failure categories surfaced to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Scope load failed; stale data retained
    FetchError,
    /// Star/trash toggle or empty-trash failed; rolled back
    ActionFailed,
    /// Permanent delete failed; entity restored
    DeletionFailed,
    UploadFailed,
    CreationFailed,
    DownloadFailed,
    /// A required collaborator endpoint is not configured
    ConfigurationError,
}

impl FailureKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::FetchError => "Error Loading Files",
            Self::ActionFailed => "Action Failed",
            Self::DeletionFailed => "Deletion Failed",
            Self::UploadFailed => "Upload Failed",
            Self::CreationFailed => "Folder Creation Failed",
            Self::DownloadFailed => "Download Failed",
            Self::ConfigurationError => "Configuration Error",
        }
    }
}

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("failed to load files: {0}")]
    Fetch(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no entity with id {0} in the current folder")]
    NotFound(FileId),
    #[error("{0}")]
    Invalid(String),
    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

impl DriveError {
    /// Failure kind to report when this error aborts an operation of `fallback` kind.
    pub fn kind_or(&self, fallback: FailureKind) -> FailureKind {
        match self {
            Self::Fetch(_) => FailureKind::FetchError,
            Self::Configuration(_) => FailureKind::ConfigurationError,
            _ => fallback,
        }
    }
}
