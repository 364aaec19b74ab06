use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::DriveError;

/// Hard per-file upload limit (5 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfConfig {
    /// Persistence API base URL (e.g., https://shelf.example.com)
    pub api_base_url: String,

    /// Image CDN endpoint used for image downloads and previews
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_endpoint: Option<String>,

    /// Signed-in user, as handed over by the auth provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Capacity of each session's outcome event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}
fn default_request_timeout() -> u64 {
    30
}
fn default_event_buffer() -> usize {
    64
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            image_endpoint: None,
            user_id: None,
            max_upload_bytes: default_max_upload_bytes(),
            request_timeout_secs: default_request_timeout(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ShelfConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "cloudshelf", "cloudshelf") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("cloudshelf-config.json")
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Base URL without trailing slash; errors when unset.
    pub fn api_base(&self) -> Result<&str, DriveError> {
        let base = self.api_base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(DriveError::Configuration(
                "persistence API base URL is not set".to_string(),
            ));
        }
        Ok(base)
    }

    /// Image CDN endpoint without trailing slash; errors when unset.
    pub fn image_base(&self) -> Result<&str, DriveError> {
        match self.image_endpoint.as_deref().map(|e| e.trim().trim_end_matches('/')) {
            Some(base) if !base.is_empty() => Ok(base),
            _ => Err(DriveError::Configuration(
                "image endpoint not configured".to_string(),
            )),
        }
    }
}
