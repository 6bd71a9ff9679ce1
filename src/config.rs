use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::render::Orientation;

/// When remote camera/threshold state is applied to a pane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneStatePolicy {
    /// Only when the pane is created from the remote scene.
    #[default]
    OnCreate,
    /// On every remote scene update.
    Always,
}

/// Viewer settings. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub max_renderers: usize,
    /// Pointer travel (px) before a render pane starts dragging
    pub render_drag_distance: u32,
    pub thumbnail_drag_distance: u32,
    pub gutter: f64,
    pub thumbnails_bar_width: f64,
    pub viewport_width: f64,
    pub default_orientation: Orientation,
    /// Upper bound for one zip chunk of a shared DICOM series
    pub zip_chunk_bytes: usize,
    /// Cloud directory collaboration data files are uploaded to
    pub data_files_dir: String,
    pub pane_state_policy: PaneStatePolicy,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            max_renderers: 4,
            render_drag_distance: 60,
            thumbnail_drag_distance: 1,
            gutter: 5.0,
            thumbnails_bar_width: 120.0,
            viewport_width: 1280.0,
            default_orientation: Orientation::Z,
            zip_chunk_bytes: 20 * 1024 * 1024,
            data_files_dir: "/medview/data".to_string(),
            pane_state_policy: PaneStatePolicy::OnCreate,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.max_renderers, 4);
        assert_eq!(config.render_drag_distance, 60);
        assert_eq!(config.zip_chunk_bytes, 20_971_520);
        assert_eq!(config.pane_state_policy, PaneStatePolicy::OnCreate);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ViewerConfig::from_json(r#"{"max_renderers": 2, "pane_state_policy": "always"}"#).unwrap();
        assert_eq!(config.max_renderers, 2);
        assert_eq!(config.pane_state_policy, PaneStatePolicy::Always);
        assert_eq!(config.gutter, 5.0);
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("viewer.json");
        fs::write(&path, r#"{"default_orientation": "X"}"#).unwrap();
        assert_eq!(
            ViewerConfig::from_file(&path).unwrap().default_orientation,
            Orientation::X
        );
        assert!(ViewerConfig::from_file(&temp.path().join("missing.json")).is_err());
    }
}
