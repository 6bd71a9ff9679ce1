//! Patient/series metadata shown in a pane's info corners.
//!
//! Metadata comes either from a JSON sidecar shipped next to the volume or
//! from the header of the first DICOM slice. Header parsing itself is an
//! external concern behind [`DicomParser`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};

/// Flat metadata record read from a DICOM header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomInfo {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_age: Option<String>,
    pub patient_sex: Option<String>,
    pub series_description: Option<String>,
    pub manufacturer: Option<String>,
    pub study_date: Option<String>,
}

/// Parses the header of a single DICOM slice.
pub trait DicomParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<DicomInfo>;
}

/// Parser for deployments without DICOM support: every parse fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDicomParser;

impl DicomParser for NoDicomParser {
    fn parse(&self, _bytes: &[u8]) -> Result<DicomInfo> {
        Err(ViewerError::Dicom("no DICOM parser configured".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarMriInfo {
    orientation: Option<String>,
    primary_slice_direction: Option<String>,
    dimensions: Option<String>,
    voxel_sizes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Sidecar {
    patient_name: Option<String>,
    #[serde(rename = "PatientID")]
    patient_id: Option<String>,
    patient_birth_date: Option<String>,
    patient_age: Option<String>,
    patient_sex: Option<String>,
    series_description: Option<String>,
    manufacturer: Option<String>,
    study_date: Option<String>,
    #[serde(rename = "mri_info", default)]
    mri_info: SidecarMriInfo,
}

/// Everything a pane can print around its rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneInfo {
    pub dicom: DicomInfo,
    pub orientation: Option<String>,
    pub primary_slice_direction: Option<String>,
    pub dimensions: Option<String>,
    pub voxel_sizes: Option<String>,
}

impl PaneInfo {
    /// Parse a JSON sidecar's text.
    pub fn from_sidecar(text: &str) -> Result<Self> {
        let sidecar: Sidecar = serde_json::from_str(text)?;
        Ok(Self {
            dicom: DicomInfo {
                patient_name: sidecar.patient_name,
                patient_id: sidecar.patient_id,
                patient_birth_date: sidecar.patient_birth_date,
                patient_age: sidecar.patient_age,
                patient_sex: sidecar.patient_sex,
                series_description: sidecar.series_description,
                manufacturer: sidecar.manufacturer,
                study_date: sidecar.study_date,
            },
            orientation: sidecar.mri_info.orientation,
            primary_slice_direction: sidecar.mri_info.primary_slice_direction,
            dimensions: sidecar.mri_info.dimensions,
            voxel_sizes: sidecar.mri_info.voxel_sizes,
        })
    }

    /// Build from DICOM header data plus the loaded volume geometry.
    pub fn from_dicom(info: DicomInfo, range: [u32; 3], spacing: [f64; 3]) -> Self {
        Self {
            dicom: info,
            dimensions: Some(format!("{} x {} x {}", range[0], range[1], range[2])),
            voxel_sizes: Some(format!(
                "{:.4}, {:.4}, {:.4}",
                spacing[0], spacing[1], spacing[2]
            )),
            ..Self::default()
        }
    }

    pub fn top_left(&self) -> Vec<String> {
        let d = &self.dicom;
        let mut lines = vec![
            d.patient_name.clone().unwrap_or_default(),
            d.patient_id.clone().unwrap_or_default(),
            format!("BIRTHDATE: {}", d.patient_birth_date.as_deref().unwrap_or_default()),
        ];
        if let Some(age) = &d.patient_age {
            lines.push(format!("AGE: {age}"));
        }
        lines.push(format!("SEX: {}", d.patient_sex.as_deref().unwrap_or_default()));
        lines
    }

    pub fn top_right(&self) -> Vec<String> {
        let d = &self.dicom;
        vec![
            format!("SERIES: {}", d.series_description.as_deref().unwrap_or_default()),
            d.manufacturer.clone().unwrap_or_default(),
            d.study_date.clone().unwrap_or_default(),
            self.dimensions.clone().unwrap_or_default(),
            self.voxel_sizes.clone().unwrap_or_default(),
        ]
    }

    pub fn bottom_right(&self) -> Vec<String> {
        self.orientation
            .iter()
            .chain(self.primary_slice_direction.iter())
            .cloned()
            .collect()
    }
}

/// `slice: n/total` label, with a 0-based index.
pub fn slice_label(index: u32, total: u32) -> String {
    format!("slice: {}/{}", index.saturating_add(1), total)
}
