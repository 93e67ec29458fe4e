use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Empty image: no visible pixels")]
    EmptyImage,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Multipart error: {0}")]
    MultipartError(#[from] multer::Error),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Input path {} does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("No PNG files found at {}", .0.display())]
    NoPngFiles(PathBuf),

    #[error("Catalog {} not found", .0.display())]
    CatalogMissing(PathBuf),

    #[error("Catalog is locked by another writer ({})", .0.display())]
    CatalogLocked(PathBuf),

    #[error("Config file {} not found", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Type '{0}' not found in catalog")]
    UnknownType(String),

    #[error("Name '{name}' not found in '{asset_type}' section of catalog")]
    UnknownName { asset_type: String, name: String },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl AssetError {
    /// Undecodable or fully transparent sources. A batch skips these and keeps going.
    pub fn is_invalid_image(&self) -> bool {
        matches!(self, AssetError::ImageError(_) | AssetError::EmptyImage)
    }

    pub(crate) fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        AssetError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssetError>;
