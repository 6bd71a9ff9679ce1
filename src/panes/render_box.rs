//! The render box: up to `max_renderers` live 2D panes laid out as a grid.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::Sortable;
use crate::classifier::RecordId;
use crate::dicom::{slice_label, PaneInfo};
use crate::error::{Result, ViewerError};
use crate::render::{Orientation, PaneHandle};
use crate::scene::{
    GeneralScene, Range, RendererEntry, RendererScene, SliceIndices, VolumeScene, WindowLevel,
    RENDERER_2D,
};

pub const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// View state of one pane, as synchronized with collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PaneState {
    pub orientation: Orientation,
    pub view_matrix: [f64; 16],
    pub thresholds: Range,
    pub window_level: WindowLevel,
    pub flip_columns: bool,
    pub flip_rows: bool,
    pub slice_indices: SliceIndices,
    pub pointer: [f64; 3],
}

impl Default for PaneState {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            view_matrix: IDENTITY,
            thresholds: Range::default(),
            window_level: WindowLevel::default(),
            flip_columns: false,
            flip_rows: false,
            slice_indices: SliceIndices::default(),
            pointer: [0.0; 3],
        }
    }
}

impl PaneState {
    pub fn with_orientation(orientation: Orientation) -> Self {
        Self {
            orientation,
            ..Self::default()
        }
    }

    pub fn to_entry(&self, id: RecordId, selected: bool) -> RendererEntry {
        RendererEntry {
            general: GeneralScene {
                id: Some(id),
                kind: Some(RENDERER_2D.to_string()),
            },
            renderer: RendererScene {
                view_matrix: Some(self.view_matrix.to_vec()),
                flip_columns: Some(self.flip_columns),
                flip_rows: Some(self.flip_rows),
                pointer: Some(self.pointer),
                orientation: Some(self.orientation),
            },
            volume: VolumeScene {
                thresholds: Some(self.thresholds),
                window_level: Some(self.window_level),
                slice_indices: Some(self.slice_indices),
            },
            selected: Some(selected),
        }
    }

    /// Overwrite every field the entry carries. Missing fields keep their
    /// local value. Returns true when the orientation changed.
    pub fn apply_entry(&mut self, entry: &RendererEntry) -> bool {
        let r = &entry.renderer;
        if let Some(matrix) = &r.view_matrix {
            match <[f64; 16]>::try_from(matrix.as_slice()) {
                Ok(m) => self.view_matrix = m,
                Err(_) => warn!(len = matrix.len(), "ignoring malformed view matrix"),
            }
        }
        if let Some(v) = r.flip_columns {
            self.flip_columns = v;
        }
        if let Some(v) = r.flip_rows {
            self.flip_rows = v;
        }
        if let Some(v) = r.pointer {
            self.pointer = v;
        }

        let v = &entry.volume;
        if let Some(t) = v.thresholds {
            self.thresholds = t;
        }
        if let Some(w) = v.window_level {
            self.window_level = w;
        }
        if let Some(s) = v.slice_indices {
            self.slice_indices = s;
        }

        match r.orientation {
            Some(o) if o != self.orientation => {
                self.orientation = o;
                true
            }
            _ => false,
        }
    }
}

/// A live pane bound to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererPane {
    pub id: RecordId,
    pub selected: bool,
    pub handle: PaneHandle,
    pub state: PaneState,
    /// Bumped every time a pane is created for this record; loads tagged
    /// with an older generation are stale.
    pub generation: u64,
    /// Slices per axis, known once the volume is attached.
    pub range: Option<[u32; 3]>,
    pub info: Option<PaneInfo>,
}

impl RendererPane {
    pub fn is_loaded(&self) -> bool {
        self.range.is_some()
    }

    /// Bottom-left overlay text
    pub fn slice_label(&self) -> Option<String> {
        let range = self.range?;
        let axis = self.state.orientation.axis();
        Some(slice_label(self.state.slice_indices.get(self.state.orientation), range[axis]))
    }

    /// Move the slice index along `orientation` by one, staying in range.
    pub fn step_slice(&mut self, orientation: Orientation, up: bool) -> u32 {
        let max = self
            .range
            .map(|r| r[orientation.axis()].saturating_sub(1))
            .unwrap_or(u32::MAX);
        let index = self.state.slice_indices.get_mut(orientation);
        *index = if up {
            index.saturating_add(1).min(max)
        } else {
            index.saturating_sub(1).min(max)
        };
        *index
    }

    /// Pull slice indices back inside the loaded range. Returns true when
    /// any index moved.
    pub fn clamp_slices(&mut self) -> bool {
        let Some(range) = self.range else {
            return false;
        };
        let mut clamped = false;
        for orientation in [Orientation::X, Orientation::Y, Orientation::Z] {
            let max = range[orientation.axis()].saturating_sub(1);
            let index = self.state.slice_indices.get_mut(orientation);
            if *index > max {
                *index = max;
                clamped = true;
            }
        }
        if clamped {
            debug!(id = self.id, "slice indices clamped to range");
        }
        clamped
    }
}

/// Placement of a pane inside the render box, in percent of the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub id: RecordId,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone)]
pub struct RenderBox {
    sortable: Sortable,
    panes: BTreeMap<RecordId, RendererPane>,
    linked: bool,
    next_generation: u64,
}

impl RenderBox {
    pub fn new(max_renderers: usize, drag_distance: u32) -> Self {
        Self {
            sortable: Sortable::new(Some(max_renderers), drag_distance),
            panes: BTreeMap::new(),
            linked: false,
            next_generation: 0,
        }
    }

    pub fn sortable(&self) -> &Sortable {
        &self.sortable
    }

    pub fn max_renderers(&self) -> usize {
        self.sortable.capacity().unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sortable.is_full()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.panes.contains_key(&id)
    }

    pub fn pane(&self, id: RecordId) -> Option<&RendererPane> {
        self.panes.get(&id)
    }

    pub fn pane_mut(&mut self, id: RecordId) -> Option<&mut RendererPane> {
        self.panes.get_mut(&id)
    }

    /// Panes in id order.
    pub fn panes(&self) -> impl Iterator<Item = &RendererPane> {
        self.panes.values()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.panes.keys().copied().collect()
    }

    /// Register a pane the engine just created. Fails when the box is full.
    pub fn insert(&mut self, id: RecordId, handle: PaneHandle, state: PaneState) -> Result<&mut RendererPane> {
        if self.sortable.contains(id) {
            return self.panes.get_mut(&id).ok_or(ViewerError::UnknownRecord(id));
        }
        if !self.sortable.push(id) {
            return Err(ViewerError::RenderBoxFull {
                max: self.max_renderers(),
            });
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        debug!(id, generation, panes = self.sortable.len(), "pane added to render box");

        let pane = self.panes.entry(id).or_insert(RendererPane {
            id,
            selected: false,
            handle,
            state,
            generation,
            range: None,
            info: None,
        });
        Ok(pane)
    }

    /// Drop a pane. Linking is switched off once fewer than two panes remain.
    pub fn remove(&mut self, id: RecordId) -> Option<RendererPane> {
        let pane = self.panes.remove(&id)?;
        self.sortable.remove(id);
        if self.panes.len() < 2 && self.linked {
            debug!("unlinking views, fewer than two panes left");
            self.linked = false;
        }
        Some(pane)
    }

    pub fn linked(&self) -> bool {
        self.linked
    }

    pub fn set_linked(&mut self, linked: bool) {
        self.linked = linked;
    }

    pub fn select(&mut self, id: RecordId, selected: bool) -> bool {
        match self.panes.get_mut(&id) {
            Some(pane) => {
                pane.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Apply a scroll reported for pane `id`: the pane moves one slice, and in
    /// linked mode every other pane follows along the same axis. Returns the
    /// panes whose slice index changed.
    pub fn scroll(&mut self, id: RecordId, up: bool) -> Vec<RecordId> {
        let Some(orientation) = self.panes.get(&id).map(|p| p.state.orientation) else {
            return Vec::new();
        };

        let linked = self.linked;
        let mut moved = Vec::new();
        for pane in self.panes.values_mut() {
            if pane.id != id && !linked {
                continue;
            }
            let before = pane.state.slice_indices.get(orientation);
            if pane.step_slice(orientation, up) != before {
                moved.push(pane.id);
            }
        }
        moved
    }

    /// Grid placement for the current panes, ordered by id.
    pub fn grid(&self) -> Vec<GridCell> {
        let ids = self.ids();
        let cell = |id, left, top, width, height| GridCell {
            id,
            left,
            top,
            width,
            height,
        };
        match ids.as_slice() {
            [] => Vec::new(),
            [a] => vec![cell(*a, 0.0, 0.0, 100.0, 100.0)],
            [a, b] => vec![
                cell(*a, 0.0, 0.0, 50.0, 100.0),
                cell(*b, 50.0, 0.0, 50.0, 100.0),
            ],
            [a, b, c] => vec![
                cell(*a, 0.0, 0.0, 50.0, 50.0),
                cell(*b, 50.0, 0.0, 50.0, 50.0),
                cell(*c, 0.0, 50.0, 100.0, 50.0),
            ],
            [a, b, c, d, ..] => vec![
                cell(*a, 0.0, 0.0, 50.0, 50.0),
                cell(*b, 50.0, 0.0, 50.0, 50.0),
                cell(*c, 0.0, 50.0, 50.0, 50.0),
                cell(*d, 50.0, 50.0, 50.0, 50.0),
            ],
        }
    }

    pub fn to_entries(&self) -> Vec<RendererEntry> {
        self.panes
            .values()
            .map(|p| p.state.to_entry(p.id, p.selected))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_box_with(ids: &[RecordId]) -> RenderBox {
        let mut rb = RenderBox::new(4, 60);
        for (i, id) in ids.iter().enumerate() {
            rb.insert(*id, PaneHandle(i as u64), PaneState::default()).unwrap();
        }
        rb
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut rb = render_box_with(&[0, 1, 2, 3]);
        assert!(rb.is_full());
        let err = rb.insert(4, PaneHandle(9), PaneState::default()).unwrap_err();
        assert!(matches!(err, ViewerError::RenderBoxFull { max: 4 }));
        assert_eq!(rb.ids(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_generation_increases_on_recreate() {
        let mut rb = render_box_with(&[7]);
        let first = rb.pane(7).unwrap().generation;
        rb.remove(7);
        rb.insert(7, PaneHandle(5), PaneState::default()).unwrap();
        assert!(rb.pane(7).unwrap().generation > first);
    }

    #[test]
    fn test_grid_layouts() {
        assert!(render_box_with(&[]).grid().is_empty());

        let one = render_box_with(&[3]).grid();
        assert_eq!((one[0].width, one[0].height), (100.0, 100.0));

        let two = render_box_with(&[5, 2]).grid();
        assert_eq!(two[0].id, 2);
        assert_eq!(two[1].left, 50.0);

        let three = render_box_with(&[0, 1, 2]).grid();
        assert_eq!((three[2].top, three[2].width), (50.0, 100.0));

        let four = render_box_with(&[0, 1, 2, 3]).grid();
        assert_eq!((four[3].left, four[3].top, four[3].width), (50.0, 50.0, 50.0));
    }

    #[test]
    fn test_single_pane_left_unlinks() {
        let mut rb = render_box_with(&[0, 1]);
        rb.set_linked(true);
        assert!(rb.linked());
        rb.remove(0);
        assert!(!rb.linked());
    }

    #[test]
    fn test_scroll_linked_moves_all_panes() {
        let mut rb = render_box_with(&[0, 1]);
        for id in [0, 1] {
            rb.pane_mut(id).unwrap().range = Some([10, 10, 10]);
        }

        assert_eq!(rb.scroll(0, true), vec![0]);
        rb.set_linked(true);
        assert_eq!(rb.scroll(0, true), vec![0, 1]);
        assert_eq!(rb.pane(0).unwrap().state.slice_indices.z, 2);
        assert_eq!(rb.pane(1).unwrap().state.slice_indices.z, 1);
    }

    #[test]
    fn test_scroll_clamps_to_range() {
        let mut rb = render_box_with(&[0]);
        rb.pane_mut(0).unwrap().range = Some([1, 1, 2]);
        assert_eq!(rb.scroll(0, false), Vec::<RecordId>::new());
        rb.scroll(0, true);
        assert!(rb.scroll(0, true).is_empty());
        assert_eq!(rb.pane(0).unwrap().slice_label().as_deref(), Some("slice: 2/2"));
    }

    #[test]
    fn test_scroll_at_top_index_does_not_overflow() {
        let mut rb = render_box_with(&[0]);
        rb.pane_mut(0).unwrap().state.slice_indices.z = u32::MAX;
        assert!(rb.scroll(0, true).is_empty());
        assert_eq!(rb.pane(0).unwrap().state.slice_indices.z, u32::MAX);
    }

    #[test]
    fn test_clamp_slices_to_loaded_range() {
        let mut rb = render_box_with(&[0]);
        let pane = rb.pane_mut(0).unwrap();
        pane.state.slice_indices = SliceIndices { x: 7, y: 0, z: u32::MAX };
        assert!(!pane.clamp_slices());

        pane.range = Some([4, 4, 3]);
        assert!(pane.clamp_slices());
        assert_eq!(pane.state.slice_indices, SliceIndices { x: 3, y: 0, z: 2 });
        assert_eq!(pane.slice_label().as_deref(), Some("slice: 3/3"));
        assert!(!pane.clamp_slices());
    }

    #[test]
    fn test_apply_entry_skips_missing_fields() {
        let mut state = PaneState::default();
        state.window_level = WindowLevel { low: 1.0, high: 2.0 };

        let mut entry = PaneState::with_orientation(Orientation::X).to_entry(0, false);
        entry.volume.window_level = None;
        entry.renderer.view_matrix = Some(vec![1.0; 3]);

        assert!(state.apply_entry(&entry));
        assert_eq!(state.orientation, Orientation::X);
        assert_eq!(state.window_level, WindowLevel { low: 1.0, high: 2.0 });
        assert_eq!(state.view_matrix, IDENTITY);
    }

    #[test]
    fn test_entry_round_trip_keeps_state() {
        let mut state = PaneState::with_orientation(Orientation::Y);
        state.flip_rows = true;
        state.view_matrix[12] = 4.5;
        let entry = state.to_entry(3, true);

        let mut other = PaneState::default();
        other.apply_entry(&entry);
        assert_eq!(other, state);
    }
}
