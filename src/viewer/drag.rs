use tracing::{debug, warn};

use super::Viewer;
use crate::panes::drag::{DropContext, MovingHelper};
use crate::panes::{DragAction, DragOutcome, DragSource, DropTarget};
use crate::render::RenderingEngine;

impl<E: RenderingEngine> Viewer<E> {
    /// Pointer pressed on a draggable item.
    pub fn start_drag(&mut self, source: DragSource, at: (f64, f64)) -> bool {
        let distance = match source {
            DragSource::RenderPane { .. } => self.config.render_drag_distance,
            DragSource::Thumbnail { .. } | DragSource::Container(_) => self.config.thumbnail_drag_distance,
        };
        let source = match source {
            DragSource::RenderPane { id, batch: None } => DragSource::RenderPane {
                id,
                batch: self.record(id).and_then(|r| r.thumbnails_bar_id),
            },
            other => other,
        };
        self.drag.start(source, at, distance)
    }

    /// Pointer moved. Returns the helper once the drag has started.
    pub fn drag_to(&mut self, at: (f64, f64)) -> Option<MovingHelper> {
        self.drag.drag_to(at)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging()
    }

    /// Pointer released over `target`. Performs the data operation the drop
    /// stands for, then applies thumbnail swaps that arrived mid-drag.
    pub fn drop_on(&mut self, target: DropTarget) -> DragOutcome {
        let ctx = DropContext {
            render_box_full: self.render_box.is_full(),
            max_renderers: self.render_box.max_renderers(),
        };
        let outcome = self.drag.before_stop(target, ctx);

        match outcome {
            DragOutcome::DroppedOnPeerContainer(DragAction::Activate { id }) => {
                match self.activate(id) {
                    Ok(()) => self.push_scene(),
                    Err(e) => warn!(id, error = %e, "drop could not activate pane"),
                }
            }
            DragOutcome::DroppedOnPeerContainer(DragAction::RejectFull { id, max }) => {
                warn!(id, max, "drop rejected, render box full");
                self.notify(format!("Can not add more than {max} renderers"));
            }
            DragOutcome::DroppedOnPeerContainer(DragAction::Deactivate { id }) => {
                if self.deactivate(id) {
                    self.push_scene();
                }
            }
            DragOutcome::DroppedOnPeerContainer(DragAction::Reorder { container, direction }) => {
                if self.layout.move_to_end(container, direction) {
                    debug!(%container, ?direction, "container moved");
                }
            }
            DragOutcome::DroppedOnTrash { batch } => match self.remove_batch(batch) {
                Ok(_) => {
                    self.trash.record_discard(batch);
                    self.push_scene();
                }
                Err(e) => warn!(batch, error = %e, "could not discard batch"),
            },
            DragOutcome::DroppedOnSelf | DragOutcome::Cancelled => {}
        }

        self.flush_thumbnail_swaps();
        outcome
    }

    /// Abort the running gesture.
    pub fn cancel_drag(&mut self) -> DragOutcome {
        let outcome = self.drag.cancel();
        self.flush_thumbnail_swaps();
        outcome
    }

    fn flush_thumbnail_swaps(&mut self) {
        let applied: usize = self.bars.values_mut().map(|bar| bar.flush_deferred()).sum();
        if applied > 0 {
            debug!(applied, "deferred thumbnail swaps applied");
        }
    }
}
