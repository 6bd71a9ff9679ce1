//! Drag-and-drop between containers.
//!
//! One gesture at a time: `start` arms the machine, `drag_to` promotes it to a
//! drag once the pointer has travelled the container's drag distance, and
//! `before_stop` decides what the drop means. Apart from reordering whole
//! containers, no drop moves anything by itself: the outcome is a data
//! operation for the viewer to perform while the dragged item snaps back.

use tracing::debug;

use super::layout::RowDirection;
use super::ContainerId;
use crate::classifier::{BatchId, RecordId};

/// What the user grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSource {
    Thumbnail { batch: BatchId, id: RecordId },
    RenderPane { id: RecordId, batch: Option<BatchId> },
    Container(ContainerId),
}

/// Where the placeholder sits when the drag ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Container(ContainerId),
    /// Outside every container.
    Nowhere,
}

/// Visual that follows the pointer during a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovingHelper {
    /// Clone of the record's thumbnail. Used for render panes too, so the
    /// live render surface is never moved.
    ThumbnailClone(RecordId),
    Container(ContainerId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Pending {
        source: DragSource,
        origin: (f64, f64),
        distance: u32,
    },
    Dragging {
        source: DragSource,
        origin: (f64, f64),
        position: (f64, f64),
        helper: MovingHelper,
    },
}

/// Data operation requested by a drop on another container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragAction {
    Activate { id: RecordId },
    RejectFull { id: RecordId, max: usize },
    Deactivate { id: RecordId },
    Reorder { container: ContainerId, direction: RowDirection },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    DroppedOnSelf,
    DroppedOnPeerContainer(DragAction),
    DroppedOnTrash { batch: BatchId },
    Cancelled,
}

/// Facts about the viewer needed to judge a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropContext {
    pub render_box_full: bool,
    pub max_renderers: usize,
}

#[derive(Debug, Clone)]
pub struct DragMachine {
    state: DragState,
}

impl Default for DragMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DragMachine {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DragState::Idle)
    }

    /// Pointer pressed on `source`. Ignored while another gesture is active.
    pub fn start(&mut self, source: DragSource, at: (f64, f64), distance: u32) -> bool {
        if !self.is_idle() {
            debug!(?source, "ignoring press during an active gesture");
            return false;
        }
        self.state = DragState::Pending {
            source,
            origin: at,
            distance,
        };
        true
    }

    /// Pointer moved. Returns the moving helper when this motion starts the drag.
    pub fn drag_to(&mut self, at: (f64, f64)) -> Option<MovingHelper> {
        match &mut self.state {
            DragState::Idle => None,
            DragState::Pending {
                source,
                origin,
                distance,
            } => {
                let (source, origin) = (*source, *origin);
                let travelled = ((at.0 - origin.0).powi(2) + (at.1 - origin.1).powi(2)).sqrt();
                if travelled < f64::from(*distance) {
                    return None;
                }
                let helper = match source {
                    DragSource::Thumbnail { id, .. } | DragSource::RenderPane { id, .. } => {
                        MovingHelper::ThumbnailClone(id)
                    }
                    DragSource::Container(c) => MovingHelper::Container(c),
                };
                debug!(?source, travelled, "drag started");
                self.state = DragState::Dragging {
                    source,
                    origin,
                    position: at,
                    helper,
                };
                Some(helper)
            }
            DragState::Dragging { position, .. } => {
                *position = at;
                None
            }
        }
    }

    /// Abort the gesture (escape key, pointer lost).
    pub fn cancel(&mut self) -> DragOutcome {
        self.state = DragState::Idle;
        DragOutcome::Cancelled
    }

    /// Decide what the drop means and return to idle.
    pub fn before_stop(&mut self, target: DropTarget, ctx: DropContext) -> DragOutcome {
        let state = std::mem::replace(&mut self.state, DragState::Idle);
        let DragState::Dragging {
            source,
            origin,
            position,
            ..
        } = state
        else {
            // Released before the drag distance was reached: a click.
            return DragOutcome::Cancelled;
        };

        let outcome = judge_drop(source, target, position.0 - origin.0, ctx);
        debug!(?source, ?target, ?outcome, "drop");
        outcome
    }
}

fn judge_drop(source: DragSource, target: DropTarget, dx: f64, ctx: DropContext) -> DragOutcome {
    let DropTarget::Container(target) = target else {
        return DragOutcome::Cancelled;
    };

    if target == ContainerId::Trash {
        let batch = match source {
            DragSource::Thumbnail { batch, .. } => Some(batch),
            DragSource::RenderPane { batch, .. } => batch,
            DragSource::Container(ContainerId::ThumbnailsBar(batch)) => Some(batch),
            DragSource::Container(_) => None,
        };
        return match batch {
            Some(batch) => DragOutcome::DroppedOnTrash { batch },
            None => DragOutcome::Cancelled,
        };
    }

    match source {
        DragSource::Thumbnail { batch, id } => match target {
            ContainerId::RenderBox if ctx.render_box_full => {
                DragOutcome::DroppedOnPeerContainer(DragAction::RejectFull {
                    id,
                    max: ctx.max_renderers,
                })
            }
            ContainerId::RenderBox => DragOutcome::DroppedOnPeerContainer(DragAction::Activate { id }),
            ContainerId::ThumbnailsBar(b) if b == batch => DragOutcome::DroppedOnSelf,
            _ => DragOutcome::Cancelled,
        },
        DragSource::RenderPane { id, .. } => match target {
            ContainerId::ThumbnailsBar(_) => {
                DragOutcome::DroppedOnPeerContainer(DragAction::Deactivate { id })
            }
            ContainerId::RenderBox => DragOutcome::DroppedOnSelf,
            _ => DragOutcome::Cancelled,
        },
        DragSource::Container(container) => {
            if dx == 0.0 {
                return DragOutcome::DroppedOnSelf;
            }
            let direction = if dx < 0.0 {
                RowDirection::Leading
            } else {
                RowDirection::Trailing
            };
            DragOutcome::DroppedOnPeerContainer(DragAction::Reorder {
                container,
                direction,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOMY: DropContext = DropContext {
        render_box_full: false,
        max_renderers: 4,
    };
    const FULL: DropContext = DropContext {
        render_box_full: true,
        max_renderers: 4,
    };

    fn dragged(source: DragSource, to: (f64, f64)) -> DragMachine {
        let mut m = DragMachine::new();
        assert!(m.start(source, (0.0, 0.0), 1));
        m.drag_to(to);
        assert!(m.is_dragging());
        m
    }

    #[test]
    fn test_drag_needs_threshold_travel() {
        let mut m = DragMachine::new();
        m.start(DragSource::RenderPane { id: 0, batch: Some(0) }, (0.0, 0.0), 60);
        assert_eq!(m.drag_to((30.0, 40.0)), None);
        assert!(!m.is_dragging());
        assert_eq!(m.drag_to((36.0, 48.0)), Some(MovingHelper::ThumbnailClone(0)));
        assert!(m.is_dragging());
    }

    #[test]
    fn test_release_before_threshold_is_a_click() {
        let mut m = DragMachine::new();
        m.start(DragSource::Thumbnail { batch: 0, id: 1 }, (0.0, 0.0), 60);
        let outcome = m.before_stop(DropTarget::Container(ContainerId::RenderBox), ROOMY);
        assert_eq!(outcome, DragOutcome::Cancelled);
        assert!(m.is_idle());
    }

    #[test]
    fn test_single_gesture_at_a_time() {
        let mut m = DragMachine::new();
        assert!(m.start(DragSource::Thumbnail { batch: 0, id: 1 }, (0.0, 0.0), 1));
        assert!(!m.start(DragSource::Thumbnail { batch: 0, id: 2 }, (0.0, 0.0), 1));
    }

    #[test]
    fn test_thumbnail_onto_render_box() {
        let source = DragSource::Thumbnail { batch: 0, id: 3 };
        let mut m = dragged(source, (5.0, 0.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::RenderBox), ROOMY),
            DragOutcome::DroppedOnPeerContainer(DragAction::Activate { id: 3 })
        );

        let mut m = dragged(source, (5.0, 0.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::RenderBox), FULL),
            DragOutcome::DroppedOnPeerContainer(DragAction::RejectFull { id: 3, max: 4 })
        );
    }

    #[test]
    fn test_render_pane_onto_thumbnails_bar_deactivates() {
        let mut m = dragged(DragSource::RenderPane { id: 2, batch: Some(1) }, (0.0, 9.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::ThumbnailsBar(1)), ROOMY),
            DragOutcome::DroppedOnPeerContainer(DragAction::Deactivate { id: 2 })
        );
    }

    #[test]
    fn test_trash_removes_whole_batch() {
        let mut m = dragged(DragSource::RenderPane { id: 2, batch: Some(1) }, (3.0, 3.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::Trash), ROOMY),
            DragOutcome::DroppedOnTrash { batch: 1 }
        );

        let mut m = dragged(DragSource::Container(ContainerId::ThumbnailsBar(4)), (3.0, 0.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::Trash), ROOMY),
            DragOutcome::DroppedOnTrash { batch: 4 }
        );

        let mut m = dragged(DragSource::Container(ContainerId::RenderBox), (3.0, 0.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::Trash), ROOMY),
            DragOutcome::Cancelled
        );
    }

    #[test]
    fn test_drops_on_own_container() {
        let mut m = dragged(DragSource::Thumbnail { batch: 2, id: 0 }, (0.0, 4.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::ThumbnailsBar(2)), ROOMY),
            DragOutcome::DroppedOnSelf
        );

        let mut m = dragged(DragSource::Thumbnail { batch: 2, id: 0 }, (0.0, 4.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::ThumbnailsBar(3)), ROOMY),
            DragOutcome::Cancelled
        );

        let mut m = dragged(DragSource::RenderPane { id: 0, batch: None }, (0.0, 4.0));
        assert_eq!(m.before_stop(DropTarget::Nowhere, ROOMY), DragOutcome::Cancelled);
    }

    #[test]
    fn test_container_reorder_direction() {
        let bar = ContainerId::ThumbnailsBar(0);
        let mut m = dragged(DragSource::Container(bar), (-20.0, 0.0));
        assert_eq!(
            m.before_stop(DropTarget::Container(ContainerId::RenderBox), ROOMY),
            DragOutcome::DroppedOnPeerContainer(DragAction::Reorder {
                container: bar,
                direction: RowDirection::Leading
            })
        );

        let mut m = dragged(DragSource::Container(bar), (20.0, 0.0));
        assert!(matches!(
            m.before_stop(DropTarget::Container(ContainerId::RenderBox), ROOMY),
            DragOutcome::DroppedOnPeerContainer(DragAction::Reorder {
                direction: RowDirection::Trailing,
                ..
            })
        ));
    }
}
