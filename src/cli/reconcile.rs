use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::classifier::Scanner;
use crate::config::ViewerConfig;
use crate::dicom::NoDicomParser;
use crate::render::HeadlessEngine;
use crate::scene::Scene;
use crate::source::{FileReader, LocalFetcher};
use crate::sync::ReconcileReport;
use crate::viewer::Viewer;

pub struct ReconcileOptions {
    /// Remote scene to converge on
    pub scene: PathBuf,
    /// Scene establishing the local panes first
    pub local: Option<PathBuf>,
    pub config: ViewerConfig,
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub report: ReconcileReport,
    /// Local scene after reconciliation
    pub scene: Scene,
    /// Panes whose volume finished loading
    pub loaded: usize,
}

fn read_scene(path: &Path) -> Result<Scene> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene: {}", path.display()))?;
    Scene::from_json(&text).with_context(|| format!("Invalid scene JSON: {}", path.display()))
}

/// Build a headless viewer over `dir` and reconcile a remote scene into it.
#[instrument(skip_all)]
pub fn run_reconcile(dir: &Path, options: ReconcileOptions) -> Result<ReconcileOutcome> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Data directory does not exist: {}", dir.display()))?;
    let remote = read_scene(&options.scene)?;
    let local = options.local.as_deref().map(read_scene).transpose()?;

    let reader = FileReader::new(Arc::new(LocalFetcher::new(&dir)));
    let mut viewer = Viewer::new(
        options.config,
        HeadlessEngine::new(),
        reader,
        Arc::new(NoDicomParser),
    );
    let descriptors = Scanner::new(dir).scan_descriptors();
    viewer.add_files(&descriptors);
    info!(records = viewer.registry().len(), "data loaded");

    if let Some(local) = local {
        let established = viewer.reconcile(&local);
        info!(panes = established.created.len(), "local scene established");
    }
    let report = viewer.reconcile(&remote);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(viewer.settle());
    let loaded = viewer.render_box().panes().filter(|p| p.is_loaded()).count();

    Ok(ReconcileOutcome {
        report,
        scene: viewer.to_scene(),
        loaded,
    })
}
