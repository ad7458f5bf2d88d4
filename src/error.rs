use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(
        "Model version mismatch: extractor is v{expected_version} ({expected_hash:08x}), model was built for v{actual_version} ({actual_hash:08x})"
    )]
    ModelVersionMismatch {
        expected_version: u8,
        expected_hash: u32,
        actual_version: u8,
        actual_hash: u32,
    },

    #[error(
        "Feature layout mismatch: model expects {expected_len} features ({expected_hash:08x}), bundle has {actual_len} ({actual_hash:08x})"
    )]
    FeatureLayoutMismatch {
        expected_len: usize,
        expected_hash: u32,
        actual_len: usize,
        actual_hash: u32,
    },

    #[error("Insufficient training data: {real} usable real and {ai} usable ai images (need at least one of each)")]
    InsufficientTrainingData { real: usize, ai: usize },

    #[error("Malformed model: {0}")]
    MalformedModel(String),
}

pub type Result<T> = std::result::Result<T, DetectorError>;
