//! Interface to the volume rendering engine.
//!
//! The engine paints pixels; the viewer only tells it which panes exist,
//! what volume each one shows and what view state to apply. Interaction
//! events flow back as [`RenderEvent`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{ImageKind, RecordId};
use crate::panes::render_box::PaneState;

/// Slicing axis of a 2D pane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    X,
    Y,
    #[default]
    Z,
}

impl Orientation {
    /// Index into per-axis arrays (`range`, slice indices).
    pub fn axis(&self) -> usize {
        match self {
            Orientation::X => 0,
            Orientation::Y => 1,
            Orientation::Z => 2,
        }
    }
}

/// Engine-side identity of a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PaneHandle(pub u64);

/// Everything the engine needs to show a record's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub record_id: RecordId,
    pub kind: ImageKind,
    pub file_urls: Vec<String>,
    pub file_data: Vec<Vec<u8>>,
}

/// Geometry the engine reports once a volume is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    /// Number of slices along X, Y and Z.
    pub range: [u32; 3],
    pub spacing: [f64; 3],
}

pub trait RenderingEngine {
    fn create_pane(&mut self, container_id: &str, orientation: Orientation) -> PaneHandle;

    /// Hand a loaded volume to a pane and start rendering it.
    fn attach_volume(&mut self, pane: PaneHandle, volume: &VolumeDescriptor) -> Option<VolumeGeometry>;

    fn destroy_pane(&mut self, pane: PaneHandle);

    /// Rebuild the pane's internal slicing for a new orientation.
    fn set_orientation(&mut self, pane: PaneHandle, orientation: Orientation);

    /// Apply camera, threshold, window level, slice and flip state.
    fn apply_state(&mut self, pane: PaneHandle, state: &PaneState);
}

/// A user interaction reported by the engine for one pane.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEvent {
    pub record: RecordId,
    pub kind: RenderEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEventKind {
    Scroll { up: bool },
    Zoom { view_matrix: [f64; 16] },
    Pan { view_matrix: [f64; 16] },
    Rotate { view_matrix: [f64; 16] },
    FlipColumns,
    FlipRows,
    Point { pointer: [f64; 3] },
}

/// Pane as seen by the headless engine.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessPane {
    pub container_id: String,
    pub orientation: Orientation,
    pub volume_urls: Vec<String>,
    pub state: Option<PaneState>,
}

/// Engine that keeps pane bookkeeping and paints nothing.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    next_handle: u64,
    panes: BTreeMap<PaneHandle, HeadlessPane>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pane(&self, handle: PaneHandle) -> Option<&HeadlessPane> {
        self.panes.get(&handle)
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }
}

impl RenderingEngine for HeadlessEngine {
    fn create_pane(&mut self, container_id: &str, orientation: Orientation) -> PaneHandle {
        let handle = PaneHandle(self.next_handle);
        self.next_handle += 1;
        debug!(container_id, ?orientation, "creating headless pane");
        self.panes.insert(
            handle,
            HeadlessPane {
                container_id: container_id.to_string(),
                orientation,
                volume_urls: Vec::new(),
                state: None,
            },
        );
        handle
    }

    fn attach_volume(&mut self, pane: PaneHandle, volume: &VolumeDescriptor) -> Option<VolumeGeometry> {
        let entry = self.panes.get_mut(&pane)?;
        entry.volume_urls = volume.file_urls.clone();
        let slices = match volume.kind {
            ImageKind::DicomSeries | ImageKind::DicomSeriesZipped => volume.file_data.len() as u32,
            _ => 1,
        };
        Some(VolumeGeometry {
            range: [1, 1, slices.max(1)],
            spacing: [1.0, 1.0, 1.0],
        })
    }

    fn destroy_pane(&mut self, pane: PaneHandle) {
        self.panes.remove(&pane);
    }

    fn set_orientation(&mut self, pane: PaneHandle, orientation: Orientation) {
        if let Some(entry) = self.panes.get_mut(&pane) {
            entry.orientation = orientation;
        }
    }

    fn apply_state(&mut self, pane: PaneHandle, state: &PaneState) {
        if let Some(entry) = self.panes.get_mut(&pane) {
            entry.state = Some(state.clone());
        }
    }
}
