//! Where file bytes come from.
//!
//! A [`FileRef`] is either a locally selected file or a remote file known by
//! URL (and optionally by a cloud storage id). [`FileReader`] hides the
//! difference behind a single read operation with three flavours: bytes,
//! text and data URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
pub use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ViewerError};

/// A single input file, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "camelCase")]
pub enum FileRef {
    Local {
        name: String,
        path: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    Remote {
        name: String,
        url: String,
        cloud_id: Option<String>,
    },
}

impl FileRef {
    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        FileRef::Local {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Build a remote reference; the name is the last path segment of `url`.
    pub fn remote(url: impl Into<String>, cloud_id: Option<String>) -> Self {
        let url = url.into();
        FileRef::Remote {
            name: file_name_of(&url).to_string(),
            url,
            cloud_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FileRef::Local { name, .. } | FileRef::Remote { name, .. } => name,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, FileRef::Remote { .. })
    }

    pub fn cloud_id(&self) -> Option<&str> {
        match self {
            FileRef::Remote { cloud_id, .. } => cloud_id.as_deref(),
            FileRef::Local { .. } => None,
        }
    }
}

/// Last segment of a `/` separated path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Cloud blob store used for collaboration data files.
pub trait CloudStorage: Send + Sync {
    fn read_blob(&self, id: &str) -> BoxFuture<'_, Result<Vec<u8>>>;

    fn create_path(&self, path: &str) -> BoxFuture<'_, Result<()>>;

    /// Write a file and return its cloud id.
    fn write_file(&self, path: &str, data: Vec<u8>) -> BoxFuture<'_, Result<String>>;
}

/// Fetches remote files that have no cloud id.
pub trait UrlFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>>>;
}

/// Resolves URLs as paths below a root directory.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        self.root.join(url.trim_start_matches('/'))
    }
}

impl UrlFetcher for LocalFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>>> {
        let path = self.resolve(url);
        let url = url.to_string();
        async move {
            tokio::fs::read(&path).await.map_err(|e| ViewerError::Fetch {
                url,
                reason: e.to_string(),
            })
        }
        .boxed()
    }
}

/// In-process blob store. Ids are sequential and paths are kept for lookup.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryStorageInner>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    blobs: HashMap<String, Vec<u8>>,
    paths: HashMap<String, String>,
    dirs: Vec<String>,
    next_id: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloud id of the file last written at `path`.
    pub fn id_for_path(&self, path: &str) -> Option<String> {
        let inner = self.inner.lock().ok()?;
        inner.paths.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.dirs.iter().any(|d| d == path))
            .unwrap_or(false)
    }

    pub fn file_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.blobs.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStorageInner>> {
        self.inner
            .lock()
            .map_err(|_| ViewerError::Storage("storage lock poisoned".to_string()))
    }
}

impl CloudStorage for MemoryStorage {
    fn read_blob(&self, id: &str) -> BoxFuture<'_, Result<Vec<u8>>> {
        let id = id.to_string();
        async move {
            let inner = self.lock()?;
            inner
                .blobs
                .get(&id)
                .cloned()
                .ok_or_else(|| ViewerError::Storage(format!("no blob with id {id}")))
        }
        .boxed()
    }

    fn create_path(&self, path: &str) -> BoxFuture<'_, Result<()>> {
        let path = path.to_string();
        async move {
            let mut inner = self.lock()?;
            if !inner.dirs.contains(&path) {
                inner.dirs.push(path);
            }
            Ok(())
        }
        .boxed()
    }

    fn write_file(&self, path: &str, data: Vec<u8>) -> BoxFuture<'_, Result<String>> {
        let path = path.to_string();
        async move {
            let mut inner = self.lock()?;
            let id = format!("blob{}", inner.next_id);
            inner.next_id += 1;
            inner.blobs.insert(id.clone(), data);
            inner.paths.insert(path, id.clone());
            Ok(id)
        }
        .boxed()
    }
}

/// Reads any [`FileRef`] regardless of where it lives.
#[derive(Clone)]
pub struct FileReader {
    cloud: Option<Arc<dyn CloudStorage>>,
    fetcher: Arc<dyn UrlFetcher>,
}

impl FileReader {
    pub fn new(fetcher: Arc<dyn UrlFetcher>) -> Self {
        Self {
            cloud: None,
            fetcher,
        }
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn CloudStorage>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn cloud(&self) -> Option<&Arc<dyn CloudStorage>> {
        self.cloud.as_ref()
    }

    pub async fn read_bytes(&self, file: &FileRef) -> Result<Vec<u8>> {
        match file {
            FileRef::Local { path, .. } => Ok(tokio::fs::read(path).await?),
            FileRef::Remote {
                cloud_id: Some(id), ..
            } => {
                let cloud = self.cloud.as_ref().ok_or_else(|| {
                    ViewerError::Storage(format!("no cloud storage to read blob {id}"))
                })?;
                debug!(cloud_id = %id, "reading cloud blob");
                cloud.read_blob(id).await
            }
            FileRef::Remote { url, .. } => {
                debug!(%url, "fetching remote file");
                self.fetcher.fetch(url).await
            }
        }
    }

    pub async fn read_text(&self, file: &FileRef) -> Result<String> {
        let bytes = self.read_bytes(file).await?;
        String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
    }

    pub async fn read_data_url(&self, file: &FileRef) -> Result<String> {
        let bytes = self.read_bytes(file).await?;
        Ok(data_url(file.name(), &bytes))
    }
}

/// Encode bytes as a `data:` URL, guessing the MIME type from `name`.
pub fn data_url(name: &str, bytes: &[u8]) -> String {
    let mime = mime_guess::from_path(Path::new(name)).first_or_octet_stream();
    format!("data:{};base64,{}", mime.essence_str(), STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_remote_ref_takes_name_from_url() {
        let f = FileRef::remote("a/b/vol.nii", Some("42".to_string()));
        assert_eq!(f.name(), "vol.nii");
        assert!(f.is_remote());
        assert_eq!(f.cloud_id(), Some("42"));
    }

    #[test]
    fn test_file_name_of_without_slash() {
        assert_eq!(file_name_of("vol.nii"), "vol.nii");
        assert_eq!(file_name_of("a/"), "");
    }

    #[test]
    fn test_data_url_uses_guessed_mime() {
        let url = data_url("thumb.png", b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
        let url = data_url("noext", b"abc");
        assert!(url.starts_with("data:application/octet-stream;base64,"));
    }

    #[tokio::test]
    async fn test_reads_local_and_fetched_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/info.json"), "{\"x\":1}").unwrap();

        let reader = FileReader::new(Arc::new(LocalFetcher::new(temp.path())));

        let local = FileRef::local("info.json", temp.path().join("a/info.json"));
        assert_eq!(reader.read_text(&local).await.unwrap(), "{\"x\":1}");

        let remote = FileRef::remote("a/info.json", None);
        assert_eq!(reader.read_bytes(&remote).await.unwrap(), b"{\"x\":1}".to_vec());
    }

    #[tokio::test]
    async fn test_reads_cloud_blobs() {
        let cloud = Arc::new(MemoryStorage::new());
        let id = cloud.write_file("data/vol.nii", b"vol".to_vec()).await.unwrap();
        assert_eq!(cloud.id_for_path("data/vol.nii"), Some(id.clone()));

        let reader = FileReader::new(Arc::new(LocalFetcher::new("/nonexistent")))
            .with_cloud(cloud.clone());
        let file = FileRef::remote("a/vol.nii", Some(id));
        assert_eq!(reader.read_bytes(&file).await.unwrap(), b"vol".to_vec());
    }

    #[tokio::test]
    async fn test_collaborator_futures_run_on_spawned_tasks() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("vol.nii"), "vol").unwrap();
        let fetcher: Arc<dyn UrlFetcher> = Arc::new(LocalFetcher::new(temp.path()));
        let cloud: Arc<dyn CloudStorage> = Arc::new(MemoryStorage::new());

        let fetched = tokio::spawn(async move { fetcher.fetch("vol.nii").await });
        let stored = tokio::spawn(async move {
            let id = cloud.write_file("data/vol.nii", b"vol".to_vec()).await?;
            cloud.read_blob(&id).await
        });

        assert_eq!(fetched.await.unwrap().unwrap(), b"vol".to_vec());
        assert_eq!(stored.await.unwrap().unwrap(), b"vol".to_vec());
    }

    #[tokio::test]
    async fn test_cloud_id_without_storage_is_an_error() {
        let reader = FileReader::new(Arc::new(LocalFetcher::new("/nonexistent")));
        let file = FileRef::remote("a/vol.nii", Some("7".to_string()));
        let err = reader.read_bytes(&file).await.unwrap_err();
        assert!(matches!(err, ViewerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_missing_remote_file_reports_url() {
        let temp = TempDir::new().unwrap();
        let reader = FileReader::new(Arc::new(LocalFetcher::new(temp.path())));
        let err = reader
            .read_bytes(&FileRef::remote("missing.nii", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::Fetch { ref url, .. } if url == "missing.nii"));
    }
}
