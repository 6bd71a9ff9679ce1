use tracing::info;

use super::ContainerId;
use crate::classifier::BatchId;

/// Drop zone that discards whole batches. It never keeps children: a drop
/// is turned into a removal and the dragged item snaps back.
#[derive(Debug, Clone, Default)]
pub struct Trash {
    discarded: Vec<BatchId>,
}

impl Trash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container_id(&self) -> ContainerId {
        ContainerId::Trash
    }

    pub fn record_discard(&mut self, batch: BatchId) {
        info!(batch, "batch dropped on trash");
        self.discarded.push(batch);
    }

    /// Batches discarded so far, oldest first.
    pub fn discarded(&self) -> &[BatchId] {
        &self.discarded
    }
}
