//! Turns an unordered bag of input files into image file records.
//!
//! DICOM slices sharing a directory become one record, every other image
//! file becomes a record of its own, and thumbnails / JSON sidecars are
//! attached to the record whose file name they share. The output order and
//! the ids are a pure function of the input set, so two peers classifying
//! the same files get the same records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::dicom::DicomInfo;
use crate::source::{file_name_of, FileRef};

/// Stable identifier of an image file record.
pub type RecordId = u32;

/// Identifier of a batch of records added together (one thumbnails bar).
pub type BatchId = u32;

/// Kind of visualizable data a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageKind {
    DicomSeries,
    DicomSeriesZipped,
    Volume,
    FiberTract,
    Mesh,
    Unsupported,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::DicomSeries => "dicomSeries",
            ImageKind::DicomSeriesZipped => "dicomSeriesZipped",
            ImageKind::Volume => "volume",
            ImageKind::FiberTract => "fiberTract",
            ImageKind::Mesh => "mesh",
            ImageKind::Unsupported => "unsupported",
        }
    }

    pub fn is_dicom(&self) -> bool {
        matches!(self, ImageKind::DicomSeries | ImageKind::DicomSeriesZipped)
    }

    /// Whether the 2D renderer can slice this kind of data.
    pub fn is_volumetric(&self) -> bool {
        matches!(
            self,
            ImageKind::DicomSeries | ImageKind::DicomSeriesZipped | ImageKind::Volume
        )
    }
}

/// Classification of a single file by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image(ImageKind),
    Thumbnail,
    Sidecar,
    Unsupported,
}

const DICOM_EXTENSIONS: &[&str] = &[".dcm", ".ima"];
const DICOM_ZIP_EXTENSIONS: &[&str] = &[".dcm.zip", ".ima.zip"];
const VOLUME_EXTENSIONS: &[&str] = &[".mgh", ".mgz", ".nrrd", ".nii", ".nii.gz"];
const FIBER_EXTENSIONS: &[&str] = &[".trk"];
const MESH_EXTENSIONS: &[&str] = &[".obj", ".vtk", ".stl"];
const THUMBNAIL_EXTENSIONS: &[&str] = &[".png", ".gif", ".jpg"];
const SIDECAR_EXTENSIONS: &[&str] = &[".json"];

/// Classify a file by its (case-insensitive) suffix.
pub fn classify_file(name: &str) -> FileKind {
    let name = name.to_lowercase();
    let ends_with_any = |exts: &[&str]| exts.iter().any(|ext| name.ends_with(ext));

    if ends_with_any(DICOM_EXTENSIONS) {
        FileKind::Image(ImageKind::DicomSeries)
    } else if ends_with_any(DICOM_ZIP_EXTENSIONS) {
        FileKind::Image(ImageKind::DicomSeriesZipped)
    } else if ends_with_any(VOLUME_EXTENSIONS) {
        FileKind::Image(ImageKind::Volume)
    } else if ends_with_any(FIBER_EXTENSIONS) {
        FileKind::Image(ImageKind::FiberTract)
    } else if ends_with_any(MESH_EXTENSIONS) {
        FileKind::Image(ImageKind::Mesh)
    } else if ends_with_any(THUMBNAIL_EXTENSIONS) {
        FileKind::Thumbnail
    } else if ends_with_any(SIDECAR_EXTENSIONS) {
        FileKind::Sidecar
    } else {
        FileKind::Unsupported
    }
}

/// Check if a file is anything the viewer can use
pub fn is_viewer_file(name: &str) -> bool {
    !matches!(classify_file(name), FileKind::Unsupported)
}

/// One raw input file as handed to the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub url: String,
    /// Locally selected file; absent for remote content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
    /// Id the record had on the peer that shared this file.
    #[serde(default, alias = "imgFObjId", skip_serializing_if = "Option::is_none")]
    pub original_id: Option<RecordId>,
}

impl FileDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn local(url: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file: Some(file.into()),
            ..Self::default()
        }
    }

    pub fn shared(url: impl Into<String>, cloud_id: impl Into<String>, original_id: RecordId) -> Self {
        Self {
            url: url.into(),
            file: None,
            cloud_id: Some(cloud_id.into()),
            original_id: Some(original_id),
        }
    }

    fn file_ref(&self) -> FileRef {
        match &self.file {
            Some(path) => FileRef::local(file_name_of(&self.url), path.clone()),
            None => FileRef::remote(self.url.clone(), self.cloud_id.clone()),
        }
    }
}

/// The unit of visualizable data the rest of the viewer works with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFileRecord {
    pub id: RecordId,
    pub base_url: String,
    pub image_kind: ImageKind,
    pub files: Vec<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails_bar_id: Option<BatchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dicom_info: Option<DicomInfo>,
}

impl ImageFileRecord {
    pub fn primary_file(&self) -> Option<&FileRef> {
        self.files.first()
    }

    /// Full path of the primary file.
    pub fn primary_path(&self) -> String {
        let name = self.primary_file().map(FileRef::name).unwrap_or_default();
        format!("{}{}", self.base_url, name)
    }

    /// Deterministic ordering key: base URL plus primary file name without `.zip`.
    pub fn sort_key(&self) -> String {
        let name = self.primary_file().map(FileRef::name).unwrap_or_default();
        format!("{}{}", self.base_url, name.strip_suffix(".zip").unwrap_or(name))
    }

    /// URLs of every constituent file, sorted, with `.zip` dropped for zipped series.
    pub fn file_urls(&self) -> Vec<String> {
        let mut names: Vec<&str> = self
            .files
            .iter()
            .map(|f| match self.image_kind {
                ImageKind::DicomSeriesZipped => f.name().strip_suffix(".zip").unwrap_or(f.name()),
                _ => f.name(),
            })
            .collect();
        names.sort_unstable();
        names
            .into_iter()
            .map(|name| format!("{}{}", self.base_url, name))
            .collect()
    }
}

/// Directory part of a URL including the trailing `/`, or empty.
pub fn base_url_of(url: &str) -> &str {
    match url.rfind('/') {
        Some(i) => &url[..=i],
        None => "",
    }
}

/// Key used to pair utility files with records.
///
/// The path is cut at the first `-` after the last `/`, or failing that at
/// the last `.`.
pub fn association_key(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    if let Some(dash) = path[name_start..].find('-') {
        return &path[..name_start + dash];
    }
    match path.rfind('.') {
        Some(dot) if dot >= name_start => &path[..dot],
        _ => path,
    }
}

struct Entry {
    file: FileRef,
    original_id: Option<RecordId>,
}

struct Utility {
    url: String,
    kind: FileKind,
    file: FileRef,
}

/// Classify a batch of file descriptors into image file records.
///
/// Ids are the descriptors' original ids when every descriptor carries one,
/// otherwise they count up from `next_id` in the deterministic record order.
#[instrument(skip_all, fields(files = descriptors.len()))]
pub fn classify(descriptors: &[FileDescriptor], next_id: RecordId) -> Vec<ImageFileRecord> {
    let mut series: BTreeMap<(String, ImageKind), Vec<Entry>> = BTreeMap::new();
    let mut singles: Vec<(String, ImageKind, Entry)> = Vec::new();
    let mut utilities: Vec<Utility> = Vec::new();

    for descriptor in descriptors {
        let base_url = base_url_of(&descriptor.url).to_string();
        let file = descriptor.file_ref();
        let entry = Entry {
            file,
            original_id: descriptor.original_id,
        };

        match classify_file(entry.file.name()) {
            FileKind::Image(kind) if kind.is_dicom() => {
                series.entry((base_url, kind)).or_default().push(entry);
            }
            FileKind::Image(kind) => singles.push((base_url, kind, entry)),
            kind @ (FileKind::Thumbnail | FileKind::Sidecar) => utilities.push(Utility {
                url: descriptor.url.clone(),
                kind,
                file: entry.file,
            }),
            FileKind::Unsupported => {
                debug!(url = %descriptor.url, "dropping unsupported file");
            }
        }
    }

    let mut records: Vec<(ImageFileRecord, Option<RecordId>)> = Vec::new();

    for ((base_url, kind), mut entries) in series {
        entries.sort_by(|a, b| a.file.name().cmp(b.file.name()));
        let original_id = entries.first().and_then(|e| e.original_id);
        records.push((
            new_record(base_url, kind, entries.into_iter().map(|e| e.file).collect()),
            original_id,
        ));
    }
    for (base_url, kind, entry) in singles {
        records.push((new_record(base_url, kind, vec![entry.file]), entry.original_id));
    }

    records.sort_by(|(a, _), (b, _)| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then(a.image_kind.cmp(&b.image_kind))
            .then_with(|| {
                let names = |r: &ImageFileRecord| -> Vec<String> {
                    r.files.iter().map(|f| f.name().to_string()).collect()
                };
                names(a).cmp(&names(b))
            })
    });

    let mut records: Vec<ImageFileRecord> = assign_ids(records, descriptors, next_id);
    attach_utilities(&mut records, utilities);

    debug!(records = records.len(), "classification complete");
    records
}

fn new_record(base_url: String, kind: ImageKind, files: Vec<FileRef>) -> ImageFileRecord {
    ImageFileRecord {
        id: 0,
        base_url,
        image_kind: kind,
        files,
        thumbnail: None,
        sidecar: None,
        thumbnails_bar_id: None,
        dicom_info: None,
    }
}

fn assign_ids(
    records: Vec<(ImageFileRecord, Option<RecordId>)>,
    descriptors: &[FileDescriptor],
    next_id: RecordId,
) -> Vec<ImageFileRecord> {
    let reuse = !descriptors.is_empty() && descriptors.iter().all(|d| d.original_id.is_some());

    records
        .into_iter()
        .enumerate()
        .map(|(i, (mut record, original_id))| {
            record.id = match (reuse, original_id) {
                (true, Some(id)) => id,
                _ => next_id + i as RecordId,
            };
            record
        })
        .collect()
}

fn attach_utilities(records: &mut [ImageFileRecord], mut utilities: Vec<Utility>) {
    // Path order makes the pairing independent of input order.
    utilities.sort_by(|a, b| a.url.cmp(&b.url));

    let keys: Vec<String> = records
        .iter()
        .map(|r| association_key(&r.primary_path()).to_string())
        .collect();

    for utility in utilities {
        let key = association_key(&utility.url);
        let slot = records.iter_mut().zip(&keys).find_map(|(record, record_key)| {
            if record_key != key {
                return None;
            }
            let slot = match utility.kind {
                FileKind::Thumbnail => &mut record.thumbnail,
                _ => &mut record.sidecar,
            };
            slot.is_none().then_some(slot)
        });

        match slot {
            Some(slot) => *slot = Some(utility.file),
            None => debug!(url = %utility.url, "no record for utility file, dropping"),
        }
    }
}

/// Walks a local directory and yields file descriptors for viewer files
pub struct Scanner {
    root: PathBuf,
}

impl Scanner {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Descriptors with URLs relative to the root, `/` separated
    pub fn scan_descriptors(&self) -> Vec<FileDescriptor> {
        let mut descriptors = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_entry(|e| !is_hidden(e)) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !is_viewer_file(&name) {
                continue;
            }
            if let Some(descriptor) = self.make_descriptor(entry.path()) {
                descriptors.push(descriptor);
            }
        }
        descriptors
    }

    fn make_descriptor(&self, path: &Path) -> Option<FileDescriptor> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let url = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(FileDescriptor::local(url, path.to_path_buf()))
    }
}

/// Check if a directory entry is hidden (starts with .)
/// Never considers the root entry (depth 0) as hidden.
fn is_hidden(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
