use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::UploadError;
use super::storage::ObjectStore;

/// Coarse kind of an uploaded file, detected from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub key: String,
    pub resource_type: ResourceType,
    pub content_type: &'static str,
    pub bytes: u64,
}

/// Outcome of a successful upload.
///
/// The local file is still on disk; callers must call
/// [`UploadResult::discard_local`] once they no longer need it.
#[must_use]
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub url: String,
    pub resource: ResourceDescriptor,
    pub local_path: PathBuf,
}

impl UploadResult {
    pub async fn discard_local(&self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.local_path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Pushes local temp files to the object store.
#[derive(Clone)]
pub struct MediaIngestor {
    store: Arc<dyn ObjectStore>,
}

impl MediaIngestor {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload `local_path`. A missing or empty path is rejected before any
    /// I/O. If the remote transfer fails the local file is removed.
    pub async fn upload(&self, local_path: Option<&Path>) -> Result<UploadResult, UploadError> {
        let Some(path) = local_path.filter(|p| !p.as_os_str().is_empty()) else {
            return Err(UploadError::MissingPath);
        };

        let bytes = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(UploadError::NotFound(path.to_path_buf())),
        };

        let (resource_type, content_type) = detect_resource_type(path);
        let key = object_key(resource_type, path);

        if let Err(cause) = self.store.put_file(&key, path, content_type).await {
            let detail = format!("{cause:#}");
            error!(error = %detail, path = %path.display(), %key, "upload failed");
            remove_local(path);
            return Err(UploadError::Remote {
                path: path.to_path_buf(),
                cause,
            });
        }

        let url = self.store.object_url(&key);
        info!(%url, bytes, resource_type = resource_type.as_str(), "file uploaded");
        Ok(UploadResult {
            url,
            resource: ResourceDescriptor {
                key,
                resource_type,
                content_type,
                bytes,
            },
            local_path: path.to_path_buf(),
        })
    }
}

fn remove_local(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(error = %e, path = %path.display(), "could not remove local temp file");
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub(crate) fn detect_resource_type(path: &Path) -> (ResourceType, &'static str) {
    match extension(path).as_deref() {
        Some("jpg") | Some("jpeg") => (ResourceType::Image, "image/jpeg"),
        Some("png") => (ResourceType::Image, "image/png"),
        Some("gif") => (ResourceType::Image, "image/gif"),
        Some("webp") => (ResourceType::Image, "image/webp"),
        Some("heic") => (ResourceType::Image, "image/heic"),
        Some("svg") => (ResourceType::Image, "image/svg+xml"),
        Some("mp4") => (ResourceType::Video, "video/mp4"),
        Some("webm") => (ResourceType::Video, "video/webm"),
        Some("mov") => (ResourceType::Video, "video/quicktime"),
        Some("mkv") => (ResourceType::Video, "video/x-matroska"),
        Some("mp3") => (ResourceType::Video, "audio/mpeg"),
        Some("wav") => (ResourceType::Video, "audio/wav"),
        _ => (ResourceType::Raw, "application/octet-stream"),
    }
}

fn object_key(resource_type: ResourceType, path: &Path) -> String {
    let id = Uuid::new_v4();
    match extension(path) {
        Some(ext) => format!("{}/{}.{}", resource_type.as_str(), id, ext),
        None => format!("{}/{}", resource_type.as_str(), id),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub fail: bool,
        /// Puts numbered from this one on fail.
        pub fail_after: Option<usize>,
        pub puts: AtomicUsize,
        pub deleted: Mutex<Vec<String>>,
    }

    impl FakeStore {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn failing_after(ok_puts: usize) -> Self {
            Self {
                fail_after: Some(ok_puts),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put_file(&self, _key: &str, path: &Path, _ct: &str) -> anyhow::Result<()> {
            let n = self.puts.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(path.exists(), "local file vanished before upload");
            if self.fail || self.fail_after.is_some_and(|ok| n >= ok) {
                anyhow::bail!("connection reset by peer");
            }
            Ok(())
        }

        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }

        fn object_url(&self, key: &str) -> String {
            format!("https://fake.local/{}", key)
        }
    }

    fn scratch_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"not really a png").unwrap();
        path
    }

    #[tokio::test]
    async fn missing_path_is_rejected_without_io() {
        let store = Arc::new(FakeStore::default());
        let ingestor = MediaIngestor::new(store.clone());

        let err = ingestor.upload(None).await.unwrap_err();
        assert!(matches!(err, UploadError::MissingPath));

        let err = ingestor.upload(Some(Path::new(""))).await.unwrap_err();
        assert!(matches!(err, UploadError::MissingPath));

        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nonexistent_file_is_rejected_before_network() {
        let store = Arc::new(FakeStore::default());
        let ingestor = MediaIngestor::new(store.clone());
        let dir = tempfile::tempdir().unwrap();

        let err = ingestor
            .upload(Some(dir.path().join("ghost.png").as_path()))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NotFound(_)));

        let err = ingestor.upload(Some(dir.path())).await.unwrap_err();
        assert!(matches!(err, UploadError::NotFound(_)));

        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn remote_failure_deletes_local_file() {
        let store = Arc::new(FakeStore::failing());
        let ingestor = MediaIngestor::new(store.clone());
        let dir = tempfile::tempdir().unwrap();
        let path = scratch_file(&dir, "avatar.png");

        let err = ingestor.upload(Some(path.as_path())).await.unwrap_err();
        match err {
            UploadError::Remote { path: p, cause } => {
                assert_eq!(p, path);
                assert!(cause.to_string().contains("connection reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn success_leaves_local_file_for_caller() {
        let ingestor = MediaIngestor::new(Arc::new(FakeStore::default()));
        let dir = tempfile::tempdir().unwrap();
        let path = scratch_file(&dir, "Cover.PNG");

        let res = ingestor.upload(Some(path.as_path())).await.expect("upload");
        assert!(res.url.starts_with("https://fake.local/image/"));
        assert!(res.url.ends_with(".png"));
        assert_eq!(res.resource.resource_type, ResourceType::Image);
        assert_eq!(res.resource.content_type, "image/png");
        assert_eq!(res.resource.bytes, 16);
        assert!(path.exists());

        res.discard_local().await.expect("discard");
        assert!(!path.exists());
        // already gone is fine
        res.discard_local().await.expect("discard twice");
    }

    #[test]
    fn resource_type_detection() {
        assert_eq!(
            detect_resource_type(Path::new("a/b.JPG")),
            (ResourceType::Image, "image/jpeg")
        );
        assert_eq!(
            detect_resource_type(Path::new("clip.mp4")),
            (ResourceType::Video, "video/mp4")
        );
        assert_eq!(
            detect_resource_type(Path::new("notes.txt")),
            (ResourceType::Raw, "application/octet-stream")
        );
        assert_eq!(
            detect_resource_type(Path::new("no-extension")),
            (ResourceType::Raw, "application/octet-stream")
        );
    }

    #[test]
    fn object_key_layout() {
        let key = object_key(ResourceType::Video, Path::new("/tmp/x.webm"));
        assert!(key.starts_with("video/"));
        assert!(key.ends_with(".webm"));
        let key = object_key(ResourceType::Raw, Path::new("/tmp/blob"));
        assert!(key.starts_with("raw/"));
        assert!(!key.contains('.'));
    }
}
