use thiserror::Error;

use crate::registry::{BatchId, RecordId};

/// Failures reported by a replicated-object channel or its authorization flow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollabError {
    #[error("collaboration was not authorized")]
    Unauthorized,
    #[error("collaboration channel unreachable: {0}")]
    Connectivity(String),
    #[error("no collaboration session is active")]
    NotConnected,
    #[error("collaboration is not enabled for this viewer")]
    NotEnabled,
}

/// Errors surfaced by the viewer core.
///
/// Classification problems and DICOM header parse failures never show up
/// here: they are logged and degraded where they happen.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("render box already holds the maximum of {max} renderers")]
    RenderBoxFull { max: usize },

    #[error("no image file record with id {0}")]
    UnknownRecord(RecordId),

    #[error("no thumbnails bar for batch {0}")]
    UnknownBatch(BatchId),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error("cloud storage error: {0}")]
    Storage(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("could not fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("DICOM parse error: {0}")]
    Dicom(String),

    #[error("read task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;
