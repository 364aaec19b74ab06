use bytes::Bytes;

use shelf_platform::model::FileEntity;
use shelf_platform::persistence::UploadFile;

use crate::config::ShelfConfig;
use crate::error::DriveError;

/// CDN transformation for original-quality image downloads
pub const IMAGE_DOWNLOAD_TRANSFORM: &str = "tr:q-100,orig-true";
/// CDN transformation for the image viewer
pub const IMAGE_PREVIEW_TRANSFORM: &str = "tr:q-90,w-1600,h-1200,fo-auto";

/// Bytes fetched for a client-side save
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

fn cdn_url(base: &str, transform: &str, path: &str) -> String {
    format!("{}/{}/{}", base, transform, path.trim_start_matches('/'))
}

/// Retrieval URL for a download: CDN for images, the stored file URL otherwise
pub fn download_url(entity: &FileEntity, config: &ShelfConfig) -> Result<String, DriveError> {
    if entity.is_folder {
        return Err(DriveError::Invalid(format!(
            "\"{}\" is a folder and cannot be downloaded",
            entity.name
        )));
    }
    if entity.is_image() {
        if let Some(path) = entity.path.as_deref() {
            return Ok(cdn_url(config.image_base()?, IMAGE_DOWNLOAD_TRANSFORM, path));
        }
    }
    entity
        .file_url
        .clone()
        .ok_or_else(|| DriveError::Invalid(format!("\"{}\" has no file URL", entity.name)))
}

/// Image viewer URL; only images have one
pub fn preview_url(entity: &FileEntity, config: &ShelfConfig) -> Result<String, DriveError> {
    if !entity.is_image() {
        return Err(DriveError::Invalid(format!("\"{}\" is not an image", entity.name)));
    }
    let path = entity
        .path
        .as_deref()
        .ok_or_else(|| DriveError::Invalid(format!("\"{}\" has no storage path", entity.name)))?;
    Ok(cdn_url(config.image_base()?, IMAGE_PREVIEW_TRANSFORM, path))
}

/// Local validation run before any upload request
pub fn check_upload(file: &UploadFile, limit: u64) -> Result<(), DriveError> {
    if file.name.trim().is_empty() {
        return Err(DriveError::Invalid("upload has no file name".to_string()));
    }
    if file.size() > limit {
        return Err(DriveError::TooLarge {
            size: file.size(),
            limit,
        });
    }
    Ok(())
}
