//! Reading every file of a record before handing the volume to the engine.
//!
//! Each file read runs as its own task and resolves a [`CompletionToken`];
//! a [`FanIn`] waits until every token of the record has resolved. Reads
//! finish in any order, results are kept in file order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::classifier::{ImageFileRecord, ImageKind, RecordId};
use crate::dicom::{DicomInfo, DicomParser, PaneInfo};
use crate::error::{Result, ViewerError};
use crate::render::VolumeDescriptor;
use crate::source::FileReader;

/// A named chunk of bytes, as stored in or extracted from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub data: Vec<u8>,
}

/// ZIP (de)compression.
pub trait Archiver: Send + Sync {
    fn zip(&self, entries: &[NamedBlob]) -> Result<Vec<u8>>;

    fn unzip(&self, data: &[u8]) -> Result<Vec<NamedBlob>>;
}

/// Resolves one slot of a [`FanIn`].
#[derive(Debug)]
pub struct CompletionToken<T> {
    index: usize,
    tx: mpsc::UnboundedSender<(usize, T)>,
}

impl<T> CompletionToken<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn complete(self, value: T) {
        // The join may have been abandoned; the result is then discarded.
        let _ = self.tx.send((self.index, value));
    }
}

/// Waits for a fixed number of completion tokens.
#[derive(Debug)]
pub struct FanIn<T> {
    expected: usize,
    rx: mpsc::UnboundedReceiver<(usize, T)>,
}

impl<T> FanIn<T> {
    pub fn new(expected: usize) -> (Self, Vec<CompletionToken<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tokens = (0..expected)
            .map(|index| CompletionToken {
                index,
                tx: tx.clone(),
            })
            .collect();
        (Self { expected, rx }, tokens)
    }

    pub async fn join(self) -> Option<Vec<T>> {
        self.join_with(|_, _| {}).await
    }

    /// Wait for every token, calling `on_each` as results arrive.
    ///
    /// Returns `None` if a token was dropped without completing.
    pub async fn join_with(mut self, mut on_each: impl FnMut(usize, &T)) -> Option<Vec<T>> {
        let mut slots: Vec<Option<T>> = (0..self.expected).map(|_| None).collect();
        let mut remaining = self.expected;

        while remaining > 0 {
            let (index, value) = self.rx.recv().await?;
            on_each(index, &value);
            if slots[index].is_none() {
                remaining -= 1;
            }
            slots[index] = Some(value);
        }

        slots.into_iter().collect()
    }
}

/// A pending volume read for an activated pane.
#[derive(Debug, Clone)]
pub struct LoadJob {
    pub record: ImageFileRecord,
    /// Activation generation of the pane that asked for this load.
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct LoadedVolume {
    pub record_id: RecordId,
    pub generation: u64,
    pub volume: VolumeDescriptor,
    pub dicom_info: Option<DicomInfo>,
    pub sidecar_info: Option<PaneInfo>,
}

/// Reads the files of a record and assembles a [`VolumeDescriptor`].
#[derive(Clone)]
pub struct VolumeLoader {
    reader: FileReader,
    dicom: Arc<dyn DicomParser>,
    archiver: Option<Arc<dyn Archiver>>,
}

impl VolumeLoader {
    pub fn new(reader: FileReader, dicom: Arc<dyn DicomParser>) -> Self {
        Self {
            reader,
            dicom,
            archiver: None,
        }
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn reader(&self) -> &FileReader {
        &self.reader
    }

    #[instrument(skip_all, fields(record = job.record.id, generation = job.generation))]
    pub async fn load(&self, job: LoadJob) -> Result<LoadedVolume> {
        let record = &job.record;
        let (fan_in, tokens) = FanIn::new(record.files.len());

        for (file, token) in record.files.iter().cloned().zip(tokens) {
            let reader = self.reader.clone();
            tokio::spawn(async move {
                let result = reader.read_bytes(&file).await;
                token.complete(result);
            });
        }

        // Plain series: the header comes from the first slice as soon as it lands.
        let mut dicom_info = None;
        let parse_first = record.image_kind == ImageKind::DicomSeries;
        let results = fan_in
            .join_with(|index, result| {
                if parse_first && index == 0 {
                    if let Ok(bytes) = result {
                        dicom_info = parse_header(self.dicom.as_ref(), bytes, &record.base_url);
                    }
                }
            })
            .await
            .ok_or_else(|| ViewerError::Join("a file read was abandoned".to_string()))?;
        let file_data = results.into_iter().collect::<Result<Vec<_>>>()?;

        let (file_urls, file_data) = if record.image_kind == ImageKind::DicomSeriesZipped {
            let (urls, data) = self.unzip_series(record, &file_data)?;
            if let Some(first) = data.first() {
                dicom_info = parse_header(self.dicom.as_ref(), first, &record.base_url);
            }
            (urls, data)
        } else {
            (record.file_urls(), file_data)
        };

        let sidecar_info = match &record.sidecar {
            Some(sidecar) => match self.reader.read_text(sidecar).await {
                Ok(text) => PaneInfo::from_sidecar(&text)
                    .map_err(|e| warn!(sidecar = sidecar.name(), error = %e, "bad sidecar"))
                    .ok(),
                Err(e) => {
                    warn!(sidecar = sidecar.name(), error = %e, "could not read sidecar");
                    None
                }
            },
            None => None,
        };

        debug!(files = file_data.len(), "volume loaded");
        Ok(LoadedVolume {
            record_id: record.id,
            generation: job.generation,
            volume: VolumeDescriptor {
                record_id: record.id,
                kind: record.image_kind,
                file_urls,
                file_data,
            },
            dicom_info,
            sidecar_info,
        })
    }

    fn unzip_series(
        &self,
        record: &ImageFileRecord,
        archives: &[Vec<u8>],
    ) -> Result<(Vec<String>, Vec<Vec<u8>>)> {
        let archiver = self
            .archiver
            .as_ref()
            .ok_or_else(|| ViewerError::Archive("no archiver configured".to_string()))?;

        let mut entries = Vec::new();
        for archive in archives {
            entries.extend(archiver.unzip(archive)?);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries
            .into_iter()
            .map(|e| (format!("{}{}", record.base_url, e.name), e.data))
            .unzip())
    }
}

fn parse_header(parser: &dyn DicomParser, bytes: &[u8], base_url: &str) -> Option<DicomInfo> {
    match parser.parse(bytes) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(base_url, error = %e, "could not parse DICOM header");
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::classifier::{classify, FileDescriptor};
    use crate::source::LocalFetcher;
    use std::fs;
    use tempfile::TempDir;

    fn loader(root: &std::path::Path) -> VolumeLoader {
        let reader = FileReader::new(Arc::new(LocalFetcher::new(root)));
        VolumeLoader::new(reader, Arc::new(PrefixDicomParser)).with_archiver(Arc::new(LineArchiver))
    }

    fn record(urls: &[&str]) -> ImageFileRecord {
        let descriptors: Vec<_> = urls.iter().map(|u| FileDescriptor::new(*u)).collect();
        classify(&descriptors, 0).remove(0)
    }

    #[tokio::test]
    async fn test_fan_in_keeps_token_order() {
        let (fan_in, mut tokens) = FanIn::new(3);
        let last = tokens.pop().unwrap();
        last.complete("c");
        let mut iter = tokens.into_iter();
        let first = iter.next().unwrap();
        let second = iter.next().unwrap();
        second.complete("b");
        first.complete("a");

        let mut arrivals = Vec::new();
        let joined = fan_in.join_with(|i, _| arrivals.push(i)).await;
        assert_eq!(joined, Some(vec!["a", "b", "c"]));
        assert_eq!(arrivals, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_fan_in_empty_resolves_immediately() {
        let (fan_in, tokens) = FanIn::<u8>::new(0);
        assert!(tokens.is_empty());
        assert_eq!(fan_in.join().await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_fan_in_dropped_token_yields_none() {
        let (fan_in, mut tokens) = FanIn::new(2);
        tokens.pop().unwrap().complete(1);
        drop(tokens);
        assert_eq!(fan_in.join().await, None);
    }

    #[tokio::test]
    async fn test_load_dicom_series_parses_first_slice() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/1.dcm"), "DICM:AXIAL").unwrap();
        fs::write(temp.path().join("a/2.dcm"), "slice2").unwrap();

        let job = LoadJob {
            record: record(&["a/2.dcm", "a/1.dcm"]),
            generation: 3,
        };
        let loaded = loader(temp.path()).load(job).await.unwrap();

        assert_eq!(loaded.generation, 3);
        assert_eq!(loaded.volume.file_urls, vec!["a/1.dcm", "a/2.dcm"]);
        assert_eq!(loaded.volume.file_data, vec![b"DICM:AXIAL".to_vec(), b"slice2".to_vec()]);
        assert_eq!(
            loaded.dicom_info.unwrap().series_description.as_deref(),
            Some("AXIAL")
        );
    }

    #[tokio::test]
    async fn test_header_parse_failure_does_not_fail_load() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("1.dcm"), "garbage").unwrap();

        let loaded = loader(temp.path())
            .load(LoadJob {
                record: record(&["1.dcm"]),
                generation: 0,
            })
            .await
            .unwrap();
        assert!(loaded.dicom_info.is_none());
        assert_eq!(loaded.volume.file_data.len(), 1);
    }

    #[tokio::test]
    async fn test_load_zipped_series_unzips_and_sorts() {
        let temp = TempDir::new().unwrap();
        let archiver = LineArchiver;
        let zip1 = archiver
            .zip(&[NamedBlob { name: "s2.dcm".into(), data: b"two".to_vec() }])
            .unwrap();
        let zip2 = archiver
            .zip(&[NamedBlob { name: "s1.dcm".into(), data: b"DICM:COR".to_vec() }])
            .unwrap();
        fs::create_dir_all(temp.path().join("z")).unwrap();
        fs::write(temp.path().join("z/s1.dcm.zip"), zip1).unwrap();
        fs::write(temp.path().join("z/s11.dcm.zip"), zip2).unwrap();

        let loaded = loader(temp.path())
            .load(LoadJob {
                record: record(&["z/s1.dcm.zip", "z/s11.dcm.zip"]),
                generation: 0,
            })
            .await
            .unwrap();

        assert_eq!(loaded.volume.file_urls, vec!["z/s1.dcm", "z/s2.dcm"]);
        assert_eq!(loaded.volume.file_data[0], b"DICM:COR".to_vec());
        assert_eq!(loaded.dicom_info.unwrap().series_description.as_deref(), Some("COR"));
    }

    #[tokio::test]
    async fn test_load_reads_sidecar() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("vol.nii"), "nifti").unwrap();
        fs::write(temp.path().join("vol.json"), r#"{"PatientName":"Doe"}"#).unwrap();

        let loaded = loader(temp.path())
            .load(LoadJob {
                record: record(&["vol.nii", "vol.json"]),
                generation: 0,
            })
            .await
            .unwrap();
        assert_eq!(
            loaded.sidecar_info.unwrap().dicom.patient_name.as_deref(),
            Some("Doe")
        );
        assert!(loaded.dicom_info.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_fails_load() {
        let temp = TempDir::new().unwrap();
        let result = loader(temp.path())
            .load(LoadJob {
                record: record(&["missing.nii"]),
                generation: 0,
            })
            .await;
        assert!(matches!(result, Err(ViewerError::Fetch { .. })));
    }
}
