use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::error::UploadError;

/// Write a multipart file field into `dir` under a fresh name, keeping the
/// client's extension so the resource type can be detected later.
pub async fn spool_field(dir: &Path, mut field: Field<'_>) -> Result<PathBuf, UploadError> {
    let ext = field.file_name().and_then(safe_extension);
    let name = match ext {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    };
    let path = dir.join(name);

    let mut file = tokio::fs::File::create(&path).await?;
    let mut written = 0usize;
    let copied: Result<(), UploadError> = async {
        while let Some(chunk) = field.chunk().await? {
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<(), UploadError>(())
    }
    .await;

    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    debug!(path = %path.display(), bytes = written, "multipart field spooled");
    Ok(path)
}

// Only short alphanumeric extensions survive; the rest of the client's
// filename never touches the disk.
fn safe_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::safe_extension;

    #[test]
    fn keeps_plain_extensions() {
        assert_eq!(safe_extension("me.JPG").as_deref(), Some("jpg"));
        assert_eq!(safe_extension("archive.tar.gz").as_deref(), Some("gz"));
    }

    #[test]
    fn drops_odd_extensions() {
        assert_eq!(safe_extension("noext"), None);
        assert_eq!(safe_extension("evil.p/ng"), None);
        assert_eq!(safe_extension("x.verylongextension"), None);
        assert_eq!(safe_extension("x.p-g"), None);
    }
}
