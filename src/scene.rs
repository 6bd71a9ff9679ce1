//! The scene snapshot exchanged with collaborators.
//!
//! Every field below `renderers[]` is optional on the wire: a peer running an
//! older build may omit any of them, and a missing field means "leave the
//! local value alone" when the scene is applied.

use serde::{Deserialize, Serialize};

use crate::classifier::RecordId;
use crate::render::Orientation;

/// Renderer type tag for 2D slice panes.
pub const RENDERER_2D: &str = "2D";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_bar: Option<ToolBarScene>,
    #[serde(default)]
    pub renderers: Vec<RendererEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolBarScene {
    #[serde(default)]
    pub renderers_linked: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RendererEntry {
    #[serde(default)]
    pub general: GeneralScene,
    #[serde(default)]
    pub renderer: RendererScene,
    #[serde(default)]
    pub volume: VolumeScene,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralScene {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererScene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_matrix: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_columns: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_rows: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeScene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_level: Option<WindowLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_indices: Option<SliceIndices>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceIndices {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl SliceIndices {
    pub fn get(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::X => self.x,
            Orientation::Y => self.y,
            Orientation::Z => self.z,
        }
    }

    pub fn get_mut(&mut self, orientation: Orientation) -> &mut u32 {
        match orientation {
            Orientation::X => &mut self.x,
            Orientation::Y => &mut self.y,
            Orientation::Z => &mut self.z,
        }
    }
}

impl Scene {
    /// Ids of the renderer entries, in scene order. Entries without an id are skipped.
    pub fn renderer_ids(&self) -> Vec<RecordId> {
        self.renderers.iter().filter_map(|r| r.general.id).collect()
    }

    pub fn entry(&self, id: RecordId) -> Option<&RendererEntry> {
        self.renderers.iter().find(|r| r.general.id == Some(id))
    }

    pub fn renderers_linked(&self) -> Option<bool> {
        self.tool_bar.as_ref().and_then(|t| t.renderers_linked)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
