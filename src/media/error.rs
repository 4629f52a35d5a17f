use std::path::PathBuf;

use axum::extract::multipart::MultipartError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no local file path given")]
    MissingPath,

    #[error("{} is not a readable file", .0.display())]
    NotFound(PathBuf),

    #[error("upload of {} failed: {cause:#}", .path.display())]
    Remote { path: PathBuf, cause: anyhow::Error },

    #[error("could not spool upload to disk: {0}")]
    Spool(#[from] std::io::Error),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
}
