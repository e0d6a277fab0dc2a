use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Mask matrix has no cells")]
    EmptyMask,

    #[error("Ragged mask matrix: row {row} has {found} cells, expected {expected}")]
    RaggedMask {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Bounding box needs 4 numeric components, got {0}")]
    InvalidBoundingBox(usize),

    #[error("Invalid overlay style: {0}")]
    InvalidConfig(String),

    #[error("Detection payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Style file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, OverlayError>;
