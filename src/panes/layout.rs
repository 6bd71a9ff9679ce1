//! Horizontal placement of the containers in the viewer row.
//!
//! The render box stays central: everything up to and including it is pinned
//! by its left edge, everything after it by its right edge, and the render box
//! takes whatever width is left between the two groups.

use tracing::debug;

use super::ContainerId;

/// End of the row a dragged container is moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDirection {
    Leading,
    Trailing,
}

/// Computed position of one container. `None` edges are `auto`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub id: ContainerId,
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub width: f64,
}

#[derive(Debug, Clone)]
pub struct Layout {
    order: Vec<ContainerId>,
    viewport_width: f64,
    bar_width: f64,
    gutter: f64,
}

impl Layout {
    pub fn new(viewport_width: f64, bar_width: f64, gutter: f64) -> Self {
        Self {
            order: vec![ContainerId::RenderBox],
            viewport_width,
            bar_width,
            gutter,
        }
    }

    pub fn order(&self) -> &[ContainerId] {
        &self.order
    }

    pub fn set_viewport_width(&mut self, width: f64) {
        self.viewport_width = width;
    }

    /// New thumbnails bars go immediately left of the render box.
    pub fn add(&mut self, id: ContainerId) {
        if self.order.contains(&id) {
            return;
        }
        let at = self.render_box_index().unwrap_or(self.order.len());
        self.order.insert(at, id);
    }

    pub fn remove(&mut self, id: ContainerId) -> bool {
        let before = self.order.len();
        self.order.retain(|c| *c != id);
        before != self.order.len()
    }

    /// Splice a container out and reinsert it at one end of the row.
    pub fn move_to_end(&mut self, id: ContainerId, direction: RowDirection) -> bool {
        let Some(pos) = self.order.iter().position(|c| *c == id) else {
            return false;
        };
        let moved = self.order.remove(pos);
        match direction {
            RowDirection::Leading => self.order.insert(0, moved),
            RowDirection::Trailing => self.order.push(moved),
        }
        debug!(?id, ?direction, order = ?self.order, "container moved");
        true
    }

    fn render_box_index(&self) -> Option<usize> {
        self.order.iter().position(|c| *c == ContainerId::RenderBox)
    }

    fn fixed_width(&self, id: ContainerId) -> f64 {
        match id {
            ContainerId::ThumbnailsBar(_) => self.bar_width,
            _ => 0.0,
        }
    }

    /// Place every container of the row, plus the toolbar mirroring the render box.
    pub fn compute(&self) -> Vec<Placement> {
        if self.order.is_empty() {
            return Vec::new();
        }
        let split = self.render_box_index().unwrap_or(self.order.len() - 1);
        let mut placements = Vec::with_capacity(self.order.len() + 1);

        let mut left = 0.0;
        for id in &self.order[..=split] {
            placements.push(Placement {
                id: *id,
                left: Some(left),
                right: None,
                width: self.fixed_width(*id),
            });
            left += self.fixed_width(*id) + self.gutter;
        }

        let mut right = 0.0;
        let mut trailing = Vec::new();
        for id in self.order.iter().skip(split + 1).rev() {
            trailing.push(Placement {
                id: *id,
                left: None,
                right: Some(right),
                width: self.fixed_width(*id),
            });
            right += self.fixed_width(*id) + self.gutter;
        }
        trailing.reverse();
        placements.extend(trailing);

        if let Some(rb) = placements.iter_mut().find(|p| p.id == ContainerId::RenderBox) {
            let rb_left = rb.left.unwrap_or(0.0);
            rb.width = (self.viewport_width - rb_left - right).max(0.0);
            let toolbar = Placement {
                id: ContainerId::Toolbar,
                left: rb.left,
                right: None,
                width: rb.width,
            };
            placements.push(toolbar);
        }
        placements
    }

    pub fn placement(&self, id: ContainerId) -> Option<Placement> {
        self.compute().into_iter().find(|p| p.id == id)
    }

    pub fn render_box_width(&self) -> f64 {
        self.placement(ContainerId::RenderBox)
            .map(|p| p.width)
            .unwrap_or(0.0)
    }
}
