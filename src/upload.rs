//! Uploading a viewer's data files so collaborators can fetch them.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::classifier::{ImageFileRecord, ImageKind};
use crate::collab::SharedFile;
use crate::error::{Result, ViewerError};
use crate::loader::{Archiver, NamedBlob};
use crate::source::{CloudStorage, FileReader, FileRef};

/// Split entries into consecutive chunks of at most `max_bytes` each.
///
/// An entry larger than the limit gets a chunk of its own. No chunk is empty.
pub fn chunk_entries(entries: Vec<NamedBlob>, max_bytes: usize) -> Vec<Vec<NamedBlob>> {
    let mut chunks = Vec::new();
    let mut current: Vec<NamedBlob> = Vec::new();
    let mut size = 0;

    for entry in entries {
        if !current.is_empty() && size + entry.data.len() > max_bytes {
            chunks.push(std::mem::take(&mut current));
            size = 0;
        }
        size += entry.data.len();
        current.push(entry);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// URL of zip chunk `index` for a series whose first chunk is `first_url`.
///
/// `a/s1.dcm.zip` stays as is for chunk 0 and becomes `a/s12.dcm.zip` for chunk 2.
pub fn chunk_url(first_url: &str, index: usize) -> String {
    if index == 0 {
        return first_url.to_string();
    }
    let stem = first_url.strip_suffix(".zip").unwrap_or(first_url);
    let name_start = stem.rfind('/').map(|i| i + 1).unwrap_or(0);
    match stem[name_start..].rfind('.') {
        Some(dot) => {
            let (base, ext) = stem.split_at(name_start + dot);
            format!("{base}{index}{ext}.zip")
        }
        None => format!("{stem}{index}.zip"),
    }
}

/// Uploads records to cloud storage and builds the shared file list.
pub struct Uploader {
    reader: FileReader,
    cloud: Arc<dyn CloudStorage>,
    archiver: Option<Arc<dyn Archiver>>,
    dir: String,
    chunk_bytes: usize,
}

impl Uploader {
    pub fn new(reader: FileReader, cloud: Arc<dyn CloudStorage>, dir: &str, chunk_bytes: usize) -> Self {
        Self {
            reader,
            cloud,
            archiver: None,
            dir: dir.trim_end_matches('/').to_string(),
            chunk_bytes,
        }
    }

    pub fn with_archiver(mut self, archiver: Option<Arc<dyn Archiver>>) -> Self {
        self.archiver = archiver;
        self
    }

    /// Upload every record and sidecar. The returned list is complete: it is
    /// only produced once every upload has finished.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn upload_all(&self, records: &[ImageFileRecord]) -> Result<Vec<SharedFile>> {
        self.cloud.create_path(&self.dir).await?;

        let mut shared = Vec::new();
        for record in records {
            if let Some(sidecar) = &record.sidecar {
                let url = format!("{}{}", record.base_url, sidecar.name());
                let data = self.reader.read_bytes(sidecar).await?;
                shared.push(self.write(record, url, data).await?);
            }

            if record.files.len() > 1 && record.image_kind != ImageKind::DicomSeriesZipped {
                let first = record.primary_file().map(FileRef::name).unwrap_or_default();
                let first_url = format!("{}{}.zip", record.base_url, first);
                for (index, zipped) in self.zip_series(record).await?.into_iter().enumerate() {
                    shared.push(self.write(record, chunk_url(&first_url, index), zipped).await?);
                }
            } else {
                for file in &record.files {
                    let url = format!("{}{}", record.base_url, file.name());
                    let data = self.reader.read_bytes(file).await?;
                    shared.push(self.write(record, url, data).await?);
                }
            }
        }

        info!(files = shared.len(), "data files uploaded");
        Ok(shared)
    }

    async fn zip_series(&self, record: &ImageFileRecord) -> Result<Vec<Vec<u8>>> {
        let archiver = self
            .archiver
            .as_ref()
            .ok_or_else(|| ViewerError::Archive("no archiver configured".to_string()))?;

        let mut entries = Vec::with_capacity(record.files.len());
        for file in &record.files {
            entries.push(NamedBlob {
                name: file.name().to_string(),
                data: self.reader.read_bytes(file).await?,
            });
        }

        let chunks = chunk_entries(entries, self.chunk_bytes);
        debug!(record = record.id, chunks = chunks.len(), "series zipped");
        chunks.iter().map(|chunk| archiver.zip(chunk)).collect()
    }

    async fn write(&self, record: &ImageFileRecord, url: String, data: Vec<u8>) -> Result<SharedFile> {
        let path = format!("{}/{}", self.dir, url.trim_start_matches('/'));
        let cloud_id = self.cloud.write_file(&path, data).await?;
        debug!(%url, %cloud_id, "uploaded");
        Ok(SharedFile {
            url,
            cloud_id,
            record_id: record.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, FileDescriptor};
    use crate::loader::test_support::LineArchiver;
    use crate::source::{LocalFetcher, MemoryStorage};
    use std::fs;
    use tempfile::TempDir;

    fn blob(name: &str, size: usize) -> NamedBlob {
        NamedBlob {
            name: name.to_string(),
            data: vec![0; size],
        }
    }

    #[test]
    fn test_chunking_respects_limit() {
        let chunks = chunk_entries(vec![blob("a", 4), blob("b", 4), blob("c", 4)], 8);
        let names: Vec<Vec<&str>> = chunks
            .iter()
            .map(|c| c.iter().map(|b| b.name.as_str()).collect())
            .collect();
        assert_eq!(names, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_oversize_entry_gets_own_chunk() {
        let chunks = chunk_entries(vec![blob("big", 20), blob("small", 1)], 8);
        assert_eq!(chunks.len(), 2);
        assert!(chunk_entries(Vec::new(), 8).is_empty());
    }

    #[test]
    fn test_chunk_urls() {
        assert_eq!(chunk_url("a/s1.dcm.zip", 0), "a/s1.dcm.zip");
        assert_eq!(chunk_url("a/s1.dcm.zip", 2), "a/s12.dcm.zip");
        assert_eq!(chunk_url("a.b/s1.ima.zip", 1), "a.b/s11.ima.zip");
        assert_eq!(chunk_url("1.3.12.dcm.zip", 3), "1.3.123.dcm.zip");
    }

    #[tokio::test]
    async fn test_upload_all_shares_every_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a/1.dcm"), "one").unwrap();
        fs::write(root.join("a/2.dcm"), "two").unwrap();
        fs::write(root.join("vol.nii"), "vol").unwrap();
        fs::write(root.join("vol.json"), "{}").unwrap();

        let descriptors: Vec<_> = ["a/1.dcm", "a/2.dcm", "vol.nii", "vol.json"]
            .iter()
            .map(|u| FileDescriptor::local(*u, root.join(u)))
            .collect();
        let records = classify(&descriptors, 0);

        let cloud = Arc::new(MemoryStorage::new());
        let reader = FileReader::new(Arc::new(LocalFetcher::new(root)));
        let uploader = Uploader::new(reader, cloud.clone(), "/shared/", 4)
            .with_archiver(Some(Arc::new(LineArchiver) as Arc<dyn Archiver>));

        let shared = uploader.upload_all(&records).await.unwrap();
        let urls: Vec<&str> = shared.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(urls, vec!["a/1.dcm.zip", "a/11.dcm.zip", "vol.json", "vol.nii"]);
        assert_eq!(shared[0].record_id, 0);
        assert_eq!(shared[3].record_id, 1);

        assert!(cloud.has_dir("/shared"));
        assert_eq!(cloud.file_count(), 4);
        assert_eq!(cloud.id_for_path("/shared/vol.nii"), Some(shared[3].cloud_id.clone()));
    }

    #[tokio::test]
    async fn test_series_without_archiver_fails() {
        let records = classify(
            &[FileDescriptor::new("a/1.dcm"), FileDescriptor::new("a/2.dcm")],
            0,
        );
        let uploader = Uploader::new(
            FileReader::new(Arc::new(LocalFetcher::new("/nonexistent"))),
            Arc::new(MemoryStorage::new()),
            "/shared",
            1024,
        );
        assert!(uploader.upload_all(&records).await.is_err());
    }
}
