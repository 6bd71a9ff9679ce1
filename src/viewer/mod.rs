//! The viewer: wires classification, panes, layout, loading and the
//! collaboration channel together.
//!
//! `impl Viewer` is split by concern:
//! - `mod.rs`: records, batches, activation and volume loading
//! - `scene.rs`: renderer events, scene snapshots and reconciliation
//! - `drag.rs`: drag-and-drop gestures between containers
//! - `collab.rs`: collaboration lifecycle, uploads and chat

mod collab;
mod drag;
mod scene;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{classify, BatchId, FileDescriptor, ImageFileRecord, RecordId};
use crate::collab::{ChatLog, CollabChannel, CollabEvent};
use crate::config::ViewerConfig;
use crate::dicom::{DicomParser, PaneInfo};
use crate::error::{Result, ViewerError};
use crate::loader::{Archiver, LoadJob, LoadedVolume, VolumeLoader};
use crate::panes::thumbnails::ThumbnailImage;
use crate::panes::{
    ContainerId, DragMachine, Layout, PaneState, RenderBox, ThumbnailLabel, ThumbnailsBar, Toolbar,
    Trash,
};
use crate::registry::ImageFileRegistry;
use crate::render::RenderingEngine;
use crate::source::{FileReader, FileRef};
use crate::sync::SceneSynchronizer;

/// Result of a background read, delivered back to the viewer.
enum Completion {
    Volume(Result<LoadedVolume>),
    Thumbnail {
        batch: BatchId,
        id: RecordId,
        image: Result<String>,
    },
}

pub struct Viewer<E: RenderingEngine> {
    config: ViewerConfig,
    registry: ImageFileRegistry,
    engine: E,
    loader: VolumeLoader,
    archiver: Option<Arc<dyn Archiver>>,

    render_box: RenderBox,
    bars: BTreeMap<BatchId, ThumbnailsBar>,
    next_batch: BatchId,
    toolbar: Toolbar,
    trash: Trash,
    layout: Layout,
    drag: DragMachine,
    sync: SceneSynchronizer,

    collab: Option<Box<dyn CollabChannel>>,
    collab_events: Option<mpsc::UnboundedReceiver<CollabEvent>>,
    chat: Option<ChatLog>,

    pending_volumes: Vec<LoadJob>,
    pending_thumbnails: Vec<(BatchId, RecordId, FileRef)>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,

    notices: Vec<String>,
}

impl<E: RenderingEngine> Viewer<E> {
    pub fn new(config: ViewerConfig, engine: E, reader: FileReader, dicom: Arc<dyn DicomParser>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            registry: ImageFileRegistry::new(),
            engine,
            loader: VolumeLoader::new(reader, dicom),
            archiver: None,
            render_box: RenderBox::new(config.max_renderers, config.render_drag_distance),
            bars: BTreeMap::new(),
            next_batch: 0,
            toolbar: Toolbar::new(),
            trash: Trash::new(),
            layout: Layout::new(config.viewport_width, config.thumbnails_bar_width, config.gutter),
            drag: DragMachine::new(),
            sync: SceneSynchronizer::new(config.pane_state_policy),
            collab: None,
            collab_events: None,
            chat: None,
            pending_volumes: Vec::new(),
            pending_thumbnails: Vec::new(),
            completions_tx,
            completions_rx,
            in_flight: 0,
            notices: Vec::new(),
            config,
        }
    }

    /// ZIP support for zipped series and uploads.
    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.loader = self.loader.with_archiver(archiver.clone());
        self.archiver = Some(archiver);
        self
    }

    pub fn with_collab(mut self, mut channel: Box<dyn CollabChannel>) -> Self {
        self.collab_events = Some(channel.subscribe());
        self.collab = Some(channel);
        self
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ImageFileRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn render_box(&self) -> &RenderBox {
        &self.render_box
    }

    pub fn bar(&self, batch: BatchId) -> Option<&ThumbnailsBar> {
        self.bars.get(&batch)
    }

    pub fn bars(&self) -> impl Iterator<Item = &ThumbnailsBar> {
        self.bars.values()
    }

    pub fn toolbar(&self) -> &Toolbar {
        &self.toolbar
    }

    pub fn trash(&self) -> &Trash {
        &self.trash
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut Layout {
        &mut self.layout
    }

    pub fn chat(&self) -> Option<&ChatLog> {
        self.chat.as_ref()
    }

    /// User-facing notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, message: String) {
        info!(%message, "notice");
        self.notices.push(message);
    }

    /// Classify a batch of files added together and give it a thumbnails
    /// bar. Returns the batch id, or `None` when nothing was viewable.
    #[instrument(skip_all, fields(files = descriptors.len()))]
    pub fn add_files(&mut self, descriptors: &[FileDescriptor]) -> Option<BatchId> {
        let (mut records, taken): (Vec<_>, Vec<_>) = classify(descriptors, self.registry.next_id())
            .into_iter()
            .partition(|r| self.registry.accepts(r.id));
        if !taken.is_empty() {
            let ids: Vec<RecordId> = taken.iter().map(|r| r.id).collect();
            warn!(?ids, "ids already in use, records dropped");
            self.notify(format!("Skipped {} records whose ids are already in use", ids.len()));
        }
        if records.is_empty() {
            info!("no viewable files in batch");
            return None;
        }

        let batch = self.next_batch;
        self.next_batch += 1;
        for record in &mut records {
            record.thumbnails_bar_id = Some(batch);
        }

        let bar = ThumbnailsBar::new(batch, &records, self.config.thumbnail_drag_distance);
        for record in &records {
            if let Some(thumbnail) = &record.thumbnail {
                self.pending_thumbnails.push((batch, record.id, thumbnail.clone()));
            }
        }

        let added = self.registry.add(records);
        self.layout.add(bar.container_id());
        self.bars.insert(batch, bar);
        info!(batch, records = added, "batch added");
        Some(batch)
    }

    /// Add a batch and, with no collaboration running, show its first
    /// volume or DICOM series.
    pub fn open(&mut self, descriptors: &[FileDescriptor]) -> Option<BatchId> {
        let batch = self.add_files(descriptors)?;
        if !self.collab_is_on() {
            let first = self
                .registry
                .batch_members(batch)
                .into_iter()
                .find(|id| {
                    self.registry
                        .get(*id)
                        .is_some_and(|r| r.image_kind.is_volumetric())
                });
            if let Some(id) = first {
                if let Err(e) = self.activate(id) {
                    warn!(id, error = %e, "could not show first volume");
                }
            }
        }
        Some(batch)
    }

    /// Create a pane for a record and queue its volume load. Activating an
    /// already active record is a no-op.
    #[instrument(skip(self))]
    pub fn activate(&mut self, id: RecordId) -> Result<()> {
        if self.render_box.contains(id) {
            return Ok(());
        }
        let record = self.registry.get(id).cloned().ok_or(ViewerError::UnknownRecord(id))?;
        if self.render_box.is_full() {
            let max = self.render_box.max_renderers();
            warn!(id, max, "render box full");
            self.notify(format!("Can not add more than {max} renderers"));
            return Err(ViewerError::RenderBoxFull { max });
        }

        let orientation = self.config.default_orientation;
        let handle = self
            .engine
            .create_pane(&format!("{}_render2D{id}", ContainerId::RenderBox), orientation);
        let generation = self
            .render_box
            .insert(id, handle, PaneState::with_orientation(orientation))?
            .generation;

        if let Some(bar) = record.thumbnails_bar_id.and_then(|b| self.bars.get_mut(&b)) {
            bar.set_visible(id, false);
        }
        self.toolbar.update_for_pane_count(self.render_box.len());
        self.pending_volumes.push(LoadJob { record, generation });
        debug!(id, generation, "pane activated");
        Ok(())
    }

    /// Destroy a record's pane and show its thumbnail again.
    #[instrument(skip(self))]
    pub fn deactivate(&mut self, id: RecordId) -> bool {
        let Some(pane) = self.render_box.remove(id) else {
            return false;
        };
        self.engine.destroy_pane(pane.handle);
        self.pending_volumes.retain(|job| job.record.id != id);

        if let Some(bar) = self
            .registry
            .get(id)
            .and_then(|r| r.thumbnails_bar_id)
            .and_then(|b| self.bars.get_mut(&b))
        {
            bar.set_visible(id, true);
        }
        self.toolbar.update_for_pane_count(self.render_box.len());
        self.toolbar.set_linked(self.render_box.linked());
        debug!(id, "pane deactivated");
        true
    }

    /// Discard one record. A batch left empty loses its container.
    #[instrument(skip(self))]
    pub fn remove_record(&mut self, id: RecordId) -> bool {
        self.deactivate(id);
        let Some(record) = self.registry.remove(id) else {
            return false;
        };
        if let Some(batch) = record.thumbnails_bar_id {
            self.pending_thumbnails.retain(|(b, t, _)| (*b, *t) != (batch, id));
            let emptied = match self.bars.get_mut(&batch) {
                Some(bar) => {
                    bar.remove(id);
                    bar.is_empty()
                }
                None => false,
            };
            if emptied {
                self.drop_bar(batch);
            }
        }
        true
    }

    /// Discard every record of a batch along with its container.
    #[instrument(skip(self))]
    pub fn remove_batch(&mut self, batch: BatchId) -> Result<Vec<RecordId>> {
        if !self.bars.contains_key(&batch) {
            return Err(ViewerError::UnknownBatch(batch));
        }
        for id in self.registry.batch_members(batch) {
            self.deactivate(id);
        }
        let removed = self.registry.remove_batch(batch);
        self.pending_thumbnails.retain(|(b, _, _)| *b != batch);
        self.drop_bar(batch);
        info!(batch, records = removed.len(), "batch removed");
        Ok(removed)
    }

    fn drop_bar(&mut self, batch: BatchId) {
        if self.bars.remove(&batch).is_some() {
            self.layout.remove(ContainerId::ThumbnailsBar(batch));
            debug!(batch, width = self.layout.render_box_width(), "thumbnails bar removed");
        }
    }

    /// Start every queued read. Must run inside a tokio runtime.
    fn start_reads(&mut self) {
        for job in self.pending_volumes.drain(..) {
            let loader = self.loader.clone();
            let tx = self.completions_tx.clone();
            self.in_flight += 1;
            tokio::spawn(async move {
                let result = loader.load(job).await;
                let _ = tx.send(Completion::Volume(result));
            });
        }
        for (batch, id, file) in self.pending_thumbnails.drain(..) {
            let reader = self.loader.reader().clone();
            let tx = self.completions_tx.clone();
            self.in_flight += 1;
            tokio::spawn(async move {
                let image = reader.read_data_url(&file).await;
                let _ = tx.send(Completion::Thumbnail { batch, id, image });
            });
        }
    }

    /// Start queued reads and wait until every read in flight has finished
    /// and been applied.
    pub async fn settle(&mut self) {
        self.start_reads();
        while self.in_flight > 0 {
            let Some(completion) = self.completions_rx.recv().await else {
                break;
            };
            self.in_flight -= 1;
            self.complete(completion);
        }
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Volume(Ok(loaded)) => {
                self.attach_loaded(loaded);
            }
            Completion::Volume(Err(e)) => {
                warn!(error = %e, "volume load failed");
                self.notify(format!("Could not load volume: {e}"));
            }
            Completion::Thumbnail { batch, id, image } => {
                let image = match image {
                    Ok(url) => ThumbnailImage::DataUrl(url),
                    Err(e) => {
                        warn!(id, error = %e, "thumbnail load failed");
                        ThumbnailImage::Generated
                    }
                };
                let dragging = self.drag.is_dragging();
                if let Some(bar) = self.bars.get_mut(&batch) {
                    bar.image_loaded(id, image, dragging);
                }
            }
        }
    }

    /// Hand a finished load to its pane. Loads for panes destroyed or
    /// re-created since the activation are dropped.
    pub fn attach_loaded(&mut self, loaded: LoadedVolume) -> bool {
        let id = loaded.record_id;
        let Some(pane) = self.render_box.pane_mut(id) else {
            debug!(id, "discarding load for a destroyed pane");
            return false;
        };
        if pane.generation != loaded.generation {
            debug!(id, generation = loaded.generation, current = pane.generation, "discarding stale load");
            return false;
        }

        let geometry = self.engine.attach_volume(pane.handle, &loaded.volume);
        if let Some(geometry) = geometry {
            pane.range = Some(geometry.range);
            pane.clamp_slices();
        }
        pane.info = match (loaded.sidecar_info, &loaded.dicom_info, geometry) {
            (Some(info), _, _) => Some(info),
            (None, Some(dicom), Some(g)) => Some(PaneInfo::from_dicom(dicom.clone(), g.range, g.spacing)),
            _ => None,
        };
        self.engine.apply_state(pane.handle, &pane.state);

        if let Some(dicom) = loaded.dicom_info {
            let description = dicom.series_description.clone();
            self.registry.attach_dicom_info(id, dicom);
            if let (Some(description), Some(batch)) =
                (description, self.registry.get(id).and_then(|r| r.thumbnails_bar_id))
            {
                if let Some(bar) = self.bars.get_mut(&batch) {
                    bar.set_label(id, ThumbnailLabel::from_series(&description));
                }
            }
        }
        info!(id, "volume attached");
        true
    }

    fn collab_is_on(&self) -> bool {
        self.collab.as_ref().is_some_and(|c| c.is_on())
    }

    fn record(&self, id: RecordId) -> Option<&ImageFileRecord> {
        self.registry.get(id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::loader::test_support::{LineArchiver, PrefixDicomParser};
    use crate::render::HeadlessEngine;
    use crate::source::LocalFetcher;
    use std::fs;
    use std::path::Path;

    /// Write files under `root` and describe them as a local batch.
    pub fn write_files(root: &Path, files: &[(&str, &str)]) -> Vec<FileDescriptor> {
        files
            .iter()
            .map(|(url, content)| {
                let path = root.join(url);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(&path, content).unwrap();
                FileDescriptor::local(*url, path)
            })
            .collect()
    }

    pub fn viewer(root: &Path) -> Viewer<HeadlessEngine> {
        let reader = FileReader::new(Arc::new(LocalFetcher::new(root)));
        Viewer::new(
            ViewerConfig::default(),
            HeadlessEngine::new(),
            reader,
            Arc::new(PrefixDicomParser),
        )
        .with_archiver(Arc::new(LineArchiver))
    }
}
