//! Converging local panes onto a remote scene.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::classifier::RecordId;
use crate::config::PaneStatePolicy;
use crate::error::Result;
use crate::panes::RenderBox;
use crate::scene::{RendererEntry, Scene, ToolBarScene};

/// Local pane state as seen by the synchronizer.
///
/// The viewer implements this; reconciliation drives it and never touches
/// panes any other way.
pub trait SceneTarget {
    fn active_ids(&self) -> Vec<RecordId>;

    fn knows_record(&self, id: RecordId) -> bool;

    fn activate(&mut self, id: RecordId) -> Result<()>;

    fn deactivate(&mut self, id: RecordId);

    /// Apply camera, threshold, window level, slice, flip and orientation
    /// fields the entry carries.
    fn apply_pane_state(&mut self, id: RecordId, entry: &RendererEntry);

    fn set_selected(&mut self, id: RecordId, selected: bool);

    fn linked(&self) -> bool;

    fn set_linked(&mut self, linked: bool);
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<RecordId>,
    pub destroyed: Vec<RecordId>,
    /// Remote ids that could not be activated locally.
    pub skipped: Vec<RecordId>,
    /// Already active panes whose selection or view state changed.
    pub updated: Vec<RecordId>,
    pub link_changed: bool,
}

impl ReconcileReport {
    /// No pane was created or destroyed.
    pub fn is_structurally_unchanged(&self) -> bool {
        self.created.is_empty() && self.destroyed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SceneSynchronizer {
    policy: PaneStatePolicy,
}

impl SceneSynchronizer {
    pub fn new(policy: PaneStatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PaneStatePolicy {
        self.policy
    }

    /// Snapshot of every active pane plus the link state.
    pub fn to_scene(&self, render_box: &RenderBox) -> Scene {
        Scene {
            tool_bar: Some(ToolBarScene {
                renderers_linked: Some(render_box.linked()),
            }),
            renderers: render_box.to_entries(),
        }
    }

    /// Make local panes match `remote`. Never fails: anything that cannot be
    /// applied is logged and reported as skipped.
    #[instrument(skip_all, fields(remote = remote.renderers.len()))]
    pub fn reconcile(&self, remote: &Scene, target: &mut impl SceneTarget) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut seen = BTreeSet::new();
        let entries: Vec<&RendererEntry> = remote
            .renderers
            .iter()
            .filter(|entry| match entry.general.id {
                Some(id) if seen.insert(id) => true,
                Some(id) => {
                    warn!(id, "duplicate renderer entry in remote scene, ignoring");
                    false
                }
                None => {
                    warn!("renderer entry without id in remote scene, ignoring");
                    false
                }
            })
            .collect();

        // Panes removed remotely disappear locally.
        let local: BTreeSet<RecordId> = target.active_ids().into_iter().collect();
        for id in &local {
            if !seen.contains(id) {
                target.deactivate(*id);
                report.destroyed.push(*id);
            }
        }

        for entry in entries {
            let Some(id) = entry.general.id else { continue };

            if local.contains(&id) {
                let mut changed = false;
                if let Some(selected) = entry.selected {
                    target.set_selected(id, selected);
                    changed = true;
                }
                if self.policy == PaneStatePolicy::Always {
                    target.apply_pane_state(id, entry);
                    changed = true;
                }
                if changed {
                    report.updated.push(id);
                }
                continue;
            }

            if !target.knows_record(id) {
                warn!(id, "remote scene references an unknown record, skipping");
                report.skipped.push(id);
                continue;
            }
            if let Err(e) = target.activate(id) {
                warn!(id, error = %e, "could not activate pane from remote scene");
                report.skipped.push(id);
                continue;
            }
            target.apply_pane_state(id, entry);
            if let Some(selected) = entry.selected {
                target.set_selected(id, selected);
            }
            report.created.push(id);
        }

        if let Some(linked) = remote.renderers_linked() {
            if linked != target.linked() {
                target.set_linked(linked);
                report.link_changed = true;
            }
        }

        if report.is_structurally_unchanged() {
            debug!(updated = report.updated.len(), "scene reconciled");
        } else {
            info!(
                created = report.created.len(),
                destroyed = report.destroyed.len(),
                skipped = report.skipped.len(),
                "scene reconciled"
            );
        }
        report
    }
}
