//! The replicated-object collaboration channel.
//!
//! A channel shares one JSON scene object between the peers of a room, plus
//! the list of data files the room owner uploaded and a chat stream. Remote
//! activity arrives as [`CollabEvent`]s on the receiver handed out by
//! `subscribe`.

pub mod chat;
pub mod memory;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::classifier::{FileDescriptor, RecordId};
use crate::error::CollabError;
use crate::scene::Scene;
use crate::source::BoxFuture;

pub use chat::{ChatLog, ChatMessage};
pub use memory::{MemoryChannel, MemoryHub};

/// A data file uploaded by the room owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFile {
    pub url: String,
    pub cloud_id: String,
    /// Id of the record this file belongs to on the owner's side.
    pub record_id: RecordId,
}

impl SharedFile {
    pub fn to_descriptor(&self) -> FileDescriptor {
        FileDescriptor::shared(self.url.clone(), self.cloud_id.clone(), self.record_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollabEvent {
    /// The room is ready. `owner` is true for the peer that created it.
    Connected { room_id: String, owner: bool },
    DataFilesShared { from: Collaborator, files: Vec<SharedFile> },
    SceneChanged,
    ChatMessage(ChatMessage),
    CollaboratorsChanged(Vec<Collaborator>),
    Disconnected,
}

pub trait CollabChannel: Send {
    fn is_on(&self) -> bool;

    fn is_owner(&self) -> bool;

    fn room_id(&self) -> Option<String>;

    fn me(&self) -> Collaborator;

    fn collaborators(&self) -> Vec<Collaborator>;

    /// Ask for authorization. `immediate` tries without user interaction.
    fn authorize(&mut self, immediate: bool) -> BoxFuture<'_, Result<(), CollabError>>;

    /// Open a new room with `scene` as its initial object.
    fn start(&mut self, scene: Scene) -> BoxFuture<'_, Result<String, CollabError>>;

    /// Join an existing room.
    fn join(&mut self, room_id: &str) -> BoxFuture<'_, Result<(), CollabError>>;

    fn leave(&mut self);

    fn get_object(&self) -> Option<Scene>;

    fn set_object(&mut self, scene: Scene) -> Result<(), CollabError>;

    fn set_data_file_list(&mut self, files: Vec<SharedFile>) -> Result<(), CollabError>;

    fn send_chat(&mut self, text: &str) -> Result<(), CollabError>;

    /// Receiver for remote events. Only one subscriber is kept.
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<CollabEvent>;
}
