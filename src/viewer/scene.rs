use tracing::{debug, warn};

use super::Viewer;
use crate::classifier::RecordId;
use crate::error::Result;
use crate::render::{Orientation, RenderEvent, RenderEventKind, RenderingEngine};
use crate::scene::{RendererEntry, Scene};
use crate::sync::{ReconcileReport, SceneTarget};

impl<E: RenderingEngine> Viewer<E> {
    pub fn to_scene(&self) -> Scene {
        self.sync.to_scene(&self.render_box)
    }

    /// Publish the whole scene when collaboration is on.
    pub(super) fn push_scene(&mut self) {
        let scene = self.to_scene();
        let Some(channel) = self.collab.as_mut().filter(|c| c.is_on()) else {
            return;
        };
        match channel.set_object(scene) {
            Ok(()) => debug!("scene pushed"),
            Err(e) => warn!(error = %e, "could not push scene"),
        }
    }

    /// Make local panes match a remote scene.
    pub fn reconcile(&mut self, remote: &Scene) -> ReconcileReport {
        let sync = self.sync;
        sync.reconcile(remote, self)
    }

    /// Apply a user interaction reported by the engine.
    pub fn handle_render_event(&mut self, event: RenderEvent) {
        let id = event.record;
        if !self.render_box.contains(id) {
            debug!(id, "event for an inactive pane");
            return;
        }

        match event.kind {
            RenderEventKind::Scroll { up } => {
                for moved in self.render_box.scroll(id, up) {
                    self.refresh_engine_state(moved);
                }
            }
            RenderEventKind::Zoom { view_matrix }
            | RenderEventKind::Pan { view_matrix }
            | RenderEventKind::Rotate { view_matrix } => {
                if let Some(pane) = self.render_box.pane_mut(id) {
                    pane.state.view_matrix = view_matrix;
                }
            }
            RenderEventKind::FlipColumns => {
                if let Some(pane) = self.render_box.pane_mut(id) {
                    pane.state.flip_columns = !pane.state.flip_columns;
                }
                self.refresh_engine_state(id);
            }
            RenderEventKind::FlipRows => {
                if let Some(pane) = self.render_box.pane_mut(id) {
                    pane.state.flip_rows = !pane.state.flip_rows;
                }
                self.refresh_engine_state(id);
            }
            RenderEventKind::Point { pointer } => {
                if let Some(pane) = self.render_box.pane_mut(id) {
                    pane.state.pointer = pointer;
                }
            }
        }
        self.push_scene();
    }

    pub fn select(&mut self, id: RecordId, selected: bool) -> bool {
        let changed = self.render_box.select(id, selected);
        if changed {
            self.push_scene();
        }
        changed
    }

    pub fn set_orientation(&mut self, id: RecordId, orientation: Orientation) -> bool {
        let Some(pane) = self.render_box.pane_mut(id) else {
            return false;
        };
        pane.state.orientation = orientation;
        self.engine.set_orientation(pane.handle, orientation);
        self.push_scene();
        true
    }

    /// Link button.
    pub fn toggle_link(&mut self) -> bool {
        let linked = !self.render_box.linked();
        self.render_box.set_linked(linked);
        self.toolbar.set_linked(linked);
        self.push_scene();
        linked
    }

    fn refresh_engine_state(&mut self, id: RecordId) {
        if let Some(pane) = self.render_box.pane(id) {
            self.engine.apply_state(pane.handle, &pane.state);
        }
    }
}

impl<E: RenderingEngine> SceneTarget for Viewer<E> {
    fn active_ids(&self) -> Vec<RecordId> {
        self.render_box.ids()
    }

    fn knows_record(&self, id: RecordId) -> bool {
        self.record(id).is_some()
    }

    fn activate(&mut self, id: RecordId) -> Result<()> {
        Viewer::activate(self, id)
    }

    fn deactivate(&mut self, id: RecordId) {
        Viewer::deactivate(self, id);
    }

    fn apply_pane_state(&mut self, id: RecordId, entry: &RendererEntry) {
        let Some(pane) = self.render_box.pane_mut(id) else {
            return;
        };
        if pane.state.apply_entry(entry) {
            self.engine.set_orientation(pane.handle, pane.state.orientation);
        }
        pane.clamp_slices();
        self.engine.apply_state(pane.handle, &pane.state);
    }

    fn set_selected(&mut self, id: RecordId, selected: bool) {
        self.render_box.select(id, selected);
    }

    fn linked(&self) -> bool {
        self.render_box.linked()
    }

    fn set_linked(&mut self, linked: bool) {
        self.render_box.set_linked(linked);
        self.toolbar.set_linked(linked);
    }
}
