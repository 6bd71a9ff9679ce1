//! The four drag-and-drop containers and the rules they share.

pub mod drag;
pub mod layout;
pub mod render_box;
pub mod thumbnails;
pub mod toolbar;
pub mod trash;

use std::fmt;

use crate::classifier::{BatchId, RecordId};

pub use drag::{DragAction, DragMachine, DragOutcome, DragSource, DropTarget};
pub use layout::{Layout, Placement, RowDirection};
pub use render_box::{GridCell, PaneState, RenderBox, RendererPane};
pub use thumbnails::{Thumbnail, ThumbnailLabel, ThumbnailsBar};
pub use toolbar::{Button, Toolbar};
pub use trash::Trash;

/// Identity of a container in the viewer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerId {
    RenderBox,
    ThumbnailsBar(BatchId),
    Toolbar,
    Trash,
}

impl ContainerId {
    pub fn role(&self) -> ContainerRole {
        match self {
            ContainerId::RenderBox => ContainerRole::RenderBox,
            ContainerId::ThumbnailsBar(_) => ContainerRole::ThumbnailsBar,
            ContainerId::Toolbar => ContainerRole::Toolbar,
            ContainerId::Trash => ContainerRole::Trash,
        }
    }
}

/// Element id used when talking to the rendering engine.
impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerId::RenderBox => write!(f, "viewer_renders"),
            ContainerId::ThumbnailsBar(batch) => write!(f, "viewer_thumbnailsbar{batch}"),
            ContainerId::Toolbar => write!(f, "viewer_toolbar"),
            ContainerId::Trash => write!(f, "viewer_trash"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerRole {
    RenderBox,
    ThumbnailsBar,
    Toolbar,
    Trash,
}

/// Ordered children of a container plus its drag rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sortable {
    children: Vec<RecordId>,
    capacity: Option<usize>,
    drag_distance: u32,
}

impl Sortable {
    pub fn new(capacity: Option<usize>, drag_distance: u32) -> Self {
        Self {
            children: Vec::new(),
            capacity,
            drag_distance,
        }
    }

    pub fn children(&self) -> &[RecordId] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.children.contains(&id)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|max| self.children.len() >= max)
    }

    /// Pointer travel needed before a press becomes a drag
    pub fn drag_distance(&self) -> u32 {
        self.drag_distance
    }

    /// Append a child. Returns false when full or already present.
    pub fn push(&mut self, id: RecordId) -> bool {
        if self.is_full() || self.contains(id) {
            return false;
        }
        self.children.push(id);
        true
    }

    pub fn remove(&mut self, id: RecordId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| *c != id);
        before != self.children.len()
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }
}
