//! One thumbnails bar per batch of records added together.

use std::collections::BTreeMap;

use tracing::debug;

use super::{ContainerId, Sortable};
use crate::classifier::{BatchId, ImageFileRecord, RecordId};

/// Tooltip title and the short caption under a thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThumbnailLabel {
    pub title: String,
    pub info: String,
}

const INFO_CHARS: usize = 10;

impl ThumbnailLabel {
    /// Label derived from a file name such as `1.3.12-AXIAL_MPRAGE-Sag_T1.jpg`.
    pub fn from_file_name(name: &str) -> Self {
        let stem = match name.rfind('.') {
            Some(dot) => &name[..dot],
            None => name,
        };
        if name.contains('-') {
            let title = stem.rsplit('-').next().unwrap_or(stem).to_string();
            let info = title.chars().take(INFO_CHARS).collect();
            Self { title, info }
        } else {
            let skip = stem.chars().count().saturating_sub(INFO_CHARS);
            Self {
                title: name.to_string(),
                info: stem.chars().skip(skip).collect(),
            }
        }
    }

    /// Label from a DICOM series description.
    pub fn from_series(description: &str) -> Self {
        Self {
            title: description.to_string(),
            info: description.chars().take(INFO_CHARS).collect(),
        }
    }

    /// Initial label for a record: from its thumbnail, else its primary file
    /// unless it is a DICOM series (those wait for the series description).
    pub fn for_record(record: &ImageFileRecord) -> Self {
        if let Some(thumbnail) = &record.thumbnail {
            return Self::from_file_name(thumbnail.name());
        }
        match record.primary_file() {
            Some(file) if !record.image_kind.is_dicom() => Self::from_file_name(file.name()),
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailImage {
    /// Waiting for the thumbnail file to be read.
    Pending,
    /// No thumbnail file; the engine renders a preview.
    Generated,
    DataUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub id: RecordId,
    pub label: ThumbnailLabel,
    pub image: ThumbnailImage,
    /// Hidden while the record is shown in the render box.
    pub visible: bool,
}

impl Thumbnail {
    pub fn is_loaded(&self) -> bool {
        self.image != ThumbnailImage::Pending
    }
}

#[derive(Debug, Clone)]
pub struct ThumbnailsBar {
    batch: BatchId,
    sortable: Sortable,
    thumbnails: BTreeMap<RecordId, Thumbnail>,
    /// Images that finished loading mid-drag, applied when the drag ends.
    deferred: Vec<(RecordId, ThumbnailImage)>,
}

impl ThumbnailsBar {
    pub fn new<'a>(
        batch: BatchId,
        records: impl IntoIterator<Item = &'a ImageFileRecord>,
        drag_distance: u32,
    ) -> Self {
        let mut sortable = Sortable::new(None, drag_distance);
        let mut thumbnails = BTreeMap::new();
        for record in records {
            sortable.push(record.id);
            let image = if record.thumbnail.is_some() {
                ThumbnailImage::Pending
            } else {
                ThumbnailImage::Generated
            };
            thumbnails.insert(
                record.id,
                Thumbnail {
                    id: record.id,
                    label: ThumbnailLabel::for_record(record),
                    image,
                    visible: true,
                },
            );
        }
        Self {
            batch,
            sortable,
            thumbnails,
            deferred: Vec::new(),
        }
    }

    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn container_id(&self) -> ContainerId {
        ContainerId::ThumbnailsBar(self.batch)
    }

    pub fn sortable(&self) -> &Sortable {
        &self.sortable
    }

    pub fn thumbnail(&self, id: RecordId) -> Option<&Thumbnail> {
        self.thumbnails.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.thumbnails.contains_key(&id)
    }

    /// Thumbnails in display order.
    pub fn thumbnails(&self) -> impl Iterator<Item = &Thumbnail> {
        self.sortable
            .children()
            .iter()
            .filter_map(|id| self.thumbnails.get(id))
    }

    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
    }

    pub fn all_loaded(&self) -> bool {
        self.thumbnails.values().all(Thumbnail::is_loaded)
    }

    pub fn set_visible(&mut self, id: RecordId, visible: bool) -> bool {
        match self.thumbnails.get_mut(&id) {
            Some(t) => {
                t.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn set_label(&mut self, id: RecordId, label: ThumbnailLabel) {
        if let Some(t) = self.thumbnails.get_mut(&id) {
            t.label = label;
        }
    }

    /// Record a finished thumbnail load. While a drag is running the swap is
    /// queued instead of applied.
    pub fn image_loaded(&mut self, id: RecordId, image: ThumbnailImage, dragging: bool) {
        if !self.thumbnails.contains_key(&id) {
            debug!(id, "thumbnail loaded for a removed record");
            return;
        }
        if dragging {
            self.deferred.push((id, image));
        } else if let Some(t) = self.thumbnails.get_mut(&id) {
            t.image = image;
        }
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Apply every queued swap. Returns how many were applied.
    pub fn flush_deferred(&mut self) -> usize {
        let mut applied = 0;
        for (id, image) in std::mem::take(&mut self.deferred) {
            if let Some(t) = self.thumbnails.get_mut(&id) {
                t.image = image;
                applied += 1;
            }
        }
        applied
    }

    pub fn remove(&mut self, id: RecordId) -> Option<Thumbnail> {
        self.sortable.remove(id);
        self.deferred.retain(|(d, _)| *d != id);
        self.thumbnails.remove(&id)
    }
}
