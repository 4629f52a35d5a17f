pub mod error;
pub mod ingestor;
pub mod storage;
pub mod temp;

pub use error::UploadError;
pub use ingestor::{MediaIngestor, UploadResult};
pub use storage::{ObjectStore, S3Store};
