use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::classifier::{classify, ImageFileRecord, ImageKind, Scanner};

/// Counts per kind for the summary line
#[derive(Debug, Default)]
pub struct ClassifyStats {
    pub files: usize,
    pub records: usize,
    pub dicom_series: usize,
    pub volumes: usize,
    pub other: usize,
}

impl ClassifyStats {
    fn tally(files: usize, records: &[ImageFileRecord]) -> Self {
        let mut stats = Self {
            files,
            records: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.image_kind {
                ImageKind::DicomSeries | ImageKind::DicomSeriesZipped => stats.dicom_series += 1,
                ImageKind::Volume => stats.volumes += 1,
                _ => stats.other += 1,
            }
        }
        stats
    }
}

/// Walk a directory and classify every viewer file in it as one batch.
#[instrument(skip_all)]
pub fn run_classify(dir: &Path) -> Result<(Vec<ImageFileRecord>, ClassifyStats)> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Data directory does not exist: {}", dir.display()))?;

    let descriptors = Scanner::new(dir).scan_descriptors();
    info!(count = descriptors.len(), "files scanned");

    let records = classify(&descriptors, 0);
    let stats = ClassifyStats::tally(descriptors.len(), &records);
    info!(count = records.len(), "records classified");
    Ok((records, stats))
}
