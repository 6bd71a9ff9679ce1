use std::collections::BTreeMap;

use tracing::{debug, warn};

pub use crate::classifier::{BatchId, ImageFileRecord, RecordId};
use crate::dicom::DicomInfo;
use crate::panes::ContainerId;

/// Owns every image file record the viewer knows about.
///
/// Ids are append-only: removing a record leaves a tombstone in its slot so
/// the id is never handed to different content during the registry's life.
/// The one exception is [`release`](Self::release), used when the session
/// owner's shared data claims an id.
#[derive(Debug, Default)]
pub struct ImageFileRegistry {
    slots: BTreeMap<RecordId, Option<ImageFileRecord>>,
}

impl ImageFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next locally classified record should start at.
    pub fn next_id(&self) -> RecordId {
        self.slots.keys().next_back().map(|id| id + 1).unwrap_or(0)
    }

    /// Add classified records. Records whose id is already taken (live or
    /// tombstoned) are ignored. Returns how many were added.
    pub fn add(&mut self, records: Vec<ImageFileRecord>) -> usize {
        let mut added = 0;
        for record in records {
            match self.slots.get(&record.id) {
                Some(Some(_)) => {
                    debug!(id = record.id, "record already registered");
                }
                Some(None) => {
                    warn!(id = record.id, "refusing to reuse id of a removed record");
                }
                None => {
                    self.slots.insert(record.id, Some(record));
                    added += 1;
                }
            }
        }
        added
    }

    /// True when `id` has never been used, so `add` would take it.
    pub fn accepts(&self, id: RecordId) -> bool {
        !self.slots.contains_key(&id)
    }

    /// Drop a slot entirely, tombstone included, so the id can be taken by
    /// a record from the session owner. Returns the record if it was live.
    pub fn release(&mut self, id: RecordId) -> Option<ImageFileRecord> {
        self.slots.remove(&id).flatten()
    }

    pub fn get(&self, id: RecordId) -> Option<&ImageFileRecord> {
        self.slots.get(&id).and_then(Option::as_ref)
    }

    /// Tombstone a record. Returns the removed record, if it was live.
    pub fn remove(&mut self, id: RecordId) -> Option<ImageFileRecord> {
        self.slots.get_mut(&id).and_then(Option::take)
    }

    pub fn is_removed(&self, id: RecordId) -> bool {
        matches!(self.slots.get(&id), Some(None))
    }

    /// Container holding the record's thumbnail.
    pub fn container_id_for(&self, id: RecordId) -> Option<ContainerId> {
        self.get(id)
            .and_then(|r| r.thumbnails_bar_id)
            .map(ContainerId::ThumbnailsBar)
    }

    pub fn attach_dicom_info(&mut self, id: RecordId, info: DicomInfo) -> bool {
        match self.slots.get_mut(&id) {
            Some(Some(record)) => {
                record.dicom_info = Some(info);
                true
            }
            _ => false,
        }
    }

    /// Live records in id order.
    pub fn records(&self) -> impl Iterator<Item = &ImageFileRecord> {
        self.slots.values().filter_map(Option::as_ref)
    }

    pub fn batch_members(&self, batch: BatchId) -> Vec<RecordId> {
        self.records()
            .filter(|r| r.thumbnails_bar_id == Some(batch))
            .map(|r| r.id)
            .collect()
    }

    /// Tombstone every record of a batch; returns the removed ids.
    pub fn remove_batch(&mut self, batch: BatchId) -> Vec<RecordId> {
        let ids = self.batch_members(batch);
        for id in &ids {
            self.remove(*id);
        }
        ids
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, FileDescriptor};

    fn batch(urls: &[&str], next_id: RecordId, bar: BatchId) -> Vec<ImageFileRecord> {
        let descriptors: Vec<_> = urls.iter().map(|u| FileDescriptor::new(*u)).collect();
        classify(&descriptors, next_id)
            .into_iter()
            .map(|mut r| {
                r.thumbnails_bar_id = Some(bar);
                r
            })
            .collect()
    }

    #[test]
    fn test_add_and_get() {
        let mut registry = ImageFileRegistry::new();
        assert_eq!(registry.next_id(), 0);

        let added = registry.add(batch(&["a/x.nii", "a/y.nii"], 0, 0));
        assert_eq!(added, 2);
        assert_eq!(registry.next_id(), 2);
        assert_eq!(registry.get(1).unwrap().base_url, "a/");
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn test_remove_tombstones_without_compacting() {
        let mut registry = ImageFileRegistry::new();
        registry.add(batch(&["a/x.nii", "a/y.nii", "a/z.nii"], 0, 0));

        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert!(registry.is_removed(1));
        assert!(registry.get(1).is_none());
        assert_eq!(registry.get(2).unwrap().files[0].name(), "z.nii");
        assert_eq!(registry.len(), 2);
        // The tombstone still holds its slot.
        assert_eq!(registry.next_id(), 3);
    }

    #[test]
    fn test_removed_id_is_never_reused() {
        let mut registry = ImageFileRegistry::new();
        registry.add(batch(&["a/x.nii"], 0, 0));
        registry.remove(0);

        let added = registry.add(batch(&["b/other.nii"], 0, 1));
        assert_eq!(added, 0);
        assert!(registry.get(0).is_none());
    }

    #[test]
    fn test_release_frees_live_and_tombstoned_ids() {
        let mut registry = ImageFileRegistry::new();
        registry.add(batch(&["a/x.nii", "a/y.nii"], 0, 0));
        assert!(!registry.accepts(0));
        assert!(registry.accepts(2));

        registry.remove(1);
        assert!(!registry.accepts(1));
        assert!(registry.release(1).is_none());
        assert!(registry.accepts(1));

        assert_eq!(registry.release(0).unwrap().files[0].name(), "x.nii");
        assert_eq!(registry.add(batch(&["owner/z.nii"], 0, 1)), 1);
        assert_eq!(registry.get(0).unwrap().base_url, "owner/");
    }

    #[test]
    fn test_sparse_shared_ids_advance_next_id() {
        let mut registry = ImageFileRegistry::new();
        let mut records = batch(&["a/x.nii"], 0, 0);
        records[0].id = 9;
        registry.add(records);
        assert_eq!(registry.next_id(), 10);
    }

    #[test]
    fn test_batches() {
        let mut registry = ImageFileRegistry::new();
        registry.add(batch(&["a/x.nii", "a/y.nii"], 0, 0));
        registry.add(batch(&["b/z.nii"], 2, 1));

        assert_eq!(registry.batch_members(0), vec![0, 1]);
        assert_eq!(registry.container_id_for(2), Some(ContainerId::ThumbnailsBar(1)));

        assert_eq!(registry.remove_batch(0), vec![0, 1]);
        assert!(registry.batch_members(0).is_empty());
        assert_eq!(registry.batch_members(1), vec![2]);
        assert_eq!(registry.container_id_for(0), None);
    }

    #[test]
    fn test_attach_dicom_info() {
        let mut registry = ImageFileRegistry::new();
        registry.add(batch(&["a/1.dcm", "a/2.dcm"], 0, 0));
        let info = DicomInfo {
            series_description: Some("AXIAL".to_string()),
            ..DicomInfo::default()
        };
        assert!(registry.attach_dicom_info(0, info));
        assert!(!registry.attach_dicom_info(5, DicomInfo::default()));
        assert_eq!(
            registry.get(0).unwrap().dicom_info.as_ref().unwrap().series_description.as_deref(),
            Some("AXIAL")
        );
    }
}
