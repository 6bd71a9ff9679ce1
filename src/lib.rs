pub mod classifier;
pub mod cli;
pub mod collab;
pub mod config;
pub mod dicom;
pub mod error;
pub mod loader;
pub mod logging;
pub mod panes;
pub mod registry;
pub mod render;
pub mod scene;
pub mod source;
pub mod sync;
pub mod upload;
pub mod viewer;

pub use classifier::{classify, FileDescriptor, ImageFileRecord, ImageKind, RecordId};
pub use config::ViewerConfig;
pub use error::{CollabError, Result, ViewerError};
pub use scene::Scene;
pub use viewer::Viewer;
