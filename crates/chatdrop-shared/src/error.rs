use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported frame: {0}")]
    Unsupported(String),
}
