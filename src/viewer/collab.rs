use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, instrument, warn};

use super::Viewer;
use crate::collab::{ChatLog, CollabEvent, Collaborator, SharedFile};
use crate::error::{CollabError, Result, ViewerError};
use crate::classifier::{ImageFileRecord, RecordId};
use crate::render::RenderingEngine;
use crate::sync::ReconcileReport;
use crate::upload::Uploader;

impl<E: RenderingEngine> Viewer<E> {
    pub fn is_collaborating(&self) -> bool {
        self.collab_is_on()
    }

    /// Collab button. Opens a room when authorization is granted without
    /// interaction; otherwise shows the auth button and returns `Ok(false)`.
    /// A refusal is never retried automatically.
    #[instrument(skip_all)]
    pub async fn start_collaboration(&mut self) -> Result<bool> {
        if !self.authorize(true).await? {
            return Ok(false);
        }
        self.open_room().await?;
        Ok(true)
    }

    /// Auth button: the interactive authorization flow.
    #[instrument(skip_all)]
    pub async fn authorize_interactive(&mut self) -> Result<bool> {
        if !self.authorize(false).await? {
            return Ok(false);
        }
        self.open_room().await?;
        Ok(true)
    }

    /// Join a room opened by another peer.
    #[instrument(skip(self))]
    pub async fn join_collaboration(&mut self, room_id: &str) -> Result<bool> {
        if !self.authorize(true).await? {
            return Ok(false);
        }
        let channel = self.collab.as_mut().ok_or(CollabError::NotEnabled)?;
        channel.join(room_id).await?;
        Ok(true)
    }

    async fn authorize(&mut self, immediate: bool) -> Result<bool> {
        let channel = self.collab.as_mut().ok_or(CollabError::NotEnabled)?;
        let authorized = channel.authorize(immediate).await;
        match authorized {
            Ok(()) => Ok(true),
            Err(CollabError::Unauthorized) => {
                info!(immediate, "authorization refused, waiting for the user");
                self.toolbar.show_auth_prompt();
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_room(&mut self) -> Result<String> {
        let scene = self.to_scene();
        let channel = self.collab.as_mut().ok_or(CollabError::NotEnabled)?;
        let room_id = channel.start(scene).await?;
        info!(room = %room_id, "collaboration started");
        Ok(room_id)
    }

    /// Collab button while a room is open.
    pub fn leave_collaboration(&mut self) {
        if let Some(channel) = self.collab.as_mut() {
            channel.leave();
        }
        self.collab_ended();
    }

    fn collab_ended(&mut self) {
        self.toolbar.set_collab_off();
        self.chat = None;
    }

    /// Apply every collaboration event received so far. Returns how many
    /// were handled.
    pub async fn process_collab_events(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            let Some(rx) = self.collab_events.as_mut() else {
                break;
            };
            let Ok(event) = rx.try_recv() else {
                break;
            };
            self.handle_collab_event(event).await?;
            handled += 1;
        }
        Ok(handled)
    }

    pub async fn handle_collab_event(&mut self, event: CollabEvent) -> Result<()> {
        match event {
            CollabEvent::Connected { room_id, owner } => self.handle_connect(&room_id, owner).await?,
            CollabEvent::DataFilesShared { from, files } => {
                self.handle_data_files_shared(&from, &files);
            }
            CollabEvent::SceneChanged => {
                self.handle_scene_changed();
            }
            CollabEvent::ChatMessage(message) => match self.chat.as_mut() {
                Some(chat) => chat.push(message),
                None => debug!("chat message outside a room"),
            },
            CollabEvent::CollaboratorsChanged(collaborators) => {
                if let Some(chat) = self.chat.as_mut() {
                    chat.set_collaborators(collaborators);
                }
            }
            CollabEvent::Disconnected => {
                info!("collaboration ended");
                self.collab_ended();
            }
        }
        Ok(())
    }

    /// The room is ready. The owner uploads every record and publishes the
    /// shared file list once all uploads are done.
    #[instrument(skip(self))]
    pub async fn handle_connect(&mut self, room_id: &str, owner: bool) -> Result<()> {
        let channel = self.collab.as_ref().ok_or(CollabError::NotEnabled)?;
        let me = channel.me();
        self.toolbar.set_collab_on(room_id);
        self.chat = Some(ChatLog::new(room_id, me));
        self.toolbar.set_chat_open(true);

        if owner {
            let files = self.upload_data_files().await?;
            let channel = self.collab.as_mut().ok_or(CollabError::NotEnabled)?;
            channel.set_data_file_list(files)?;
        }
        Ok(())
    }

    async fn upload_data_files(&self) -> Result<Vec<SharedFile>> {
        let reader = self.loader.reader();
        let cloud = reader
            .cloud()
            .cloned()
            .ok_or_else(|| ViewerError::Storage("no cloud storage configured".to_string()))?;
        let uploader = Uploader::new(
            reader.clone(),
            cloud,
            &self.config.data_files_dir,
            self.config.zip_chunk_bytes,
        )
        .with_archiver(self.archiver.clone());

        let records: Vec<ImageFileRecord> = self.registry.records().cloned().collect();
        uploader.upload_all(&records).await
    }

    /// Collaborator side: take the owner's files under the owner's ids and
    /// show the room's scene.
    #[instrument(skip_all, fields(from = %from.name, files = files.len()))]
    pub fn handle_data_files_shared(&mut self, from: &Collaborator, files: &[SharedFile]) -> Option<ReconcileReport> {
        if self.collab.as_ref().is_some_and(|c| c.is_owner()) {
            debug!("ignoring own shared file list");
            return None;
        }
        let cloud_ids: HashSet<&str> = files.iter().map(|f| f.cloud_id.as_str()).collect();
        let fresh: Vec<&SharedFile> = files
            .iter()
            .filter(|f| {
                !self
                    .registry
                    .get(f.record_id)
                    .is_some_and(|r| is_shared_copy(r, &cloud_ids))
            })
            .collect();

        if !fresh.is_empty() {
            self.yield_ids_to_owner(&fresh);
            let descriptors: Vec<_> = fresh.iter().map(|f| f.to_descriptor()).collect();
            if self.add_files(&descriptors).is_none() {
                warn!("shared file list had nothing viewable");
            }
        }
        self.handle_scene_changed()
    }

    /// The session owner is authoritative for ids: local records holding an
    /// id the owner shared give it up.
    fn yield_ids_to_owner(&mut self, files: &[&SharedFile]) {
        let ids: BTreeSet<RecordId> = files.iter().map(|f| f.record_id).collect();
        let mut displaced = 0;
        for id in ids {
            if self.registry.accepts(id) {
                continue;
            }
            if self.remove_record(id) {
                displaced += 1;
            }
            self.registry.release(id);
        }
        if displaced > 0 {
            warn!(displaced, "local records gave up their ids to shared data");
            self.notify(format!("{displaced} local records replaced by shared data"));
        }
    }

    /// Reconcile against the room's current scene.
    pub fn handle_scene_changed(&mut self) -> Option<ReconcileReport> {
        let scene = self.collab.as_ref()?.get_object()?;
        Some(self.reconcile(&scene))
    }

    /// Send a chat message to the room and keep it in the local transcript.
    pub fn send_chat(&mut self, text: &str) -> Result<()> {
        let chat = self.chat.as_mut().ok_or(CollabError::NotConnected)?;
        chat.push_own(text);
        let channel = self.collab.as_mut().ok_or(CollabError::NotEnabled)?;
        channel.send_chat(text)?;
        Ok(())
    }

    /// Chat button. Returns whether the chat window is now open.
    pub fn toggle_chat(&mut self) -> bool {
        let Some(chat) = self.chat.as_mut() else {
            return false;
        };
        if chat.is_open() {
            chat.close();
        } else {
            chat.open();
        }
        let open = chat.is_open();
        self.toolbar.set_chat_open(open);
        open
    }
}

/// A record already taken in from the room: every file came from cloud storage
/// under one of the shared ids.
fn is_shared_copy(record: &ImageFileRecord, cloud_ids: &HashSet<&str>) -> bool {
    record
        .files
        .iter()
        .all(|f| f.cloud_id().is_some_and(|id| cloud_ids.contains(id)))
}
