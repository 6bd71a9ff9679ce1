//! In-process collaboration hub.
//!
//! Every [`MemoryChannel`] created from the same [`MemoryHub`] can open or
//! join rooms on it. Used by the CLI and by tests that need several peers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{ChatMessage, CollabChannel, CollabEvent, Collaborator, SharedFile};
use crate::error::CollabError;
use crate::scene::Scene;
use crate::source::BoxFuture;

/// How a channel answers authorization requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    Granted,
    /// Granted only through the interactive flow.
    InteractiveOnly,
    Denied,
}

struct Peer {
    who: Collaborator,
    events: mpsc::UnboundedSender<CollabEvent>,
}

struct Room {
    owner: String,
    scene: Scene,
    files: Option<(Collaborator, Vec<SharedFile>)>,
    peers: Vec<Peer>,
}

impl Room {
    fn broadcast(&self, from: &str, event: &CollabEvent) {
        for peer in self.peers.iter().filter(|p| p.who.id != from) {
            let _ = peer.events.send(event.clone());
        }
    }

    fn collaborators(&self) -> Vec<Collaborator> {
        self.peers.iter().map(|p| p.who.clone()).collect()
    }
}

#[derive(Default)]
struct HubInner {
    rooms: HashMap<String, Room>,
    next_room: usize,
    offline: bool,
}

#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, id: &str, name: &str) -> MemoryChannel {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        MemoryChannel {
            hub: self.clone(),
            me: Collaborator {
                id: id.to_string(),
                name: name.to_string(),
            },
            auth: AuthMode::Granted,
            authorized: false,
            room: None,
            owner: false,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Simulate losing the connection to the collaboration service.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = offline;
        }
    }

    pub fn room_scene(&self, room_id: &str) -> Option<Scene> {
        let inner = self.inner.lock().ok()?;
        inner.rooms.get(room_id).map(|r| r.scene.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubInner>, CollabError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| CollabError::Connectivity("hub lock poisoned".to_string()))?;
        if inner.offline {
            return Err(CollabError::Connectivity("collaboration service unreachable".to_string()));
        }
        Ok(inner)
    }
}

pub struct MemoryChannel {
    hub: MemoryHub,
    me: Collaborator,
    auth: AuthMode,
    authorized: bool,
    room: Option<String>,
    owner: bool,
    events_tx: mpsc::UnboundedSender<CollabEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<CollabEvent>>,
}

impl MemoryChannel {
    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    fn require_authorized(&self) -> Result<(), CollabError> {
        if self.authorized {
            Ok(())
        } else {
            Err(CollabError::Unauthorized)
        }
    }

    fn with_room<T>(&self, f: impl FnOnce(&mut Room) -> T) -> Result<T, CollabError> {
        let room_id = self.room.as_ref().ok_or(CollabError::NotConnected)?;
        let mut inner = self.hub.lock()?;
        let room = inner.rooms.get_mut(room_id).ok_or(CollabError::NotConnected)?;
        Ok(f(room))
    }

    fn peer(&self) -> Peer {
        Peer {
            who: self.me.clone(),
            events: self.events_tx.clone(),
        }
    }

    fn open_room(&mut self, scene: Scene) -> Result<String, CollabError> {
        self.require_authorized()?;
        let mut inner = self.hub.lock()?;
        let room_id = format!("room{}", inner.next_room);
        inner.next_room += 1;
        inner.rooms.insert(
            room_id.clone(),
            Room {
                owner: self.me.id.clone(),
                scene,
                files: None,
                peers: vec![self.peer()],
            },
        );
        drop(inner);

        info!(room = %room_id, "collaboration room opened");
        self.room = Some(room_id.clone());
        self.owner = true;
        let _ = self.events_tx.send(CollabEvent::Connected {
            room_id: room_id.clone(),
            owner: true,
        });
        Ok(room_id)
    }

    fn join_room(&mut self, room_id: &str) -> Result<(), CollabError> {
        self.require_authorized()?;
        let peer = self.peer();
        let mut inner = self.hub.lock()?;
        let room = inner
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| CollabError::Connectivity(format!("no room {room_id}")))?;
        room.peers.retain(|p| p.who.id != peer.who.id);
        room.peers.push(peer);
        let owner = room.owner == self.me.id;
        let collaborators = room.collaborators();
        room.broadcast(&self.me.id, &CollabEvent::CollaboratorsChanged(collaborators.clone()));
        let files = room.files.clone();
        drop(inner);

        info!(room = %room_id, "joined collaboration room");
        self.room = Some(room_id.to_string());
        self.owner = owner;
        let _ = self.events_tx.send(CollabEvent::Connected {
            room_id: room_id.to_string(),
            owner,
        });
        let _ = self.events_tx.send(CollabEvent::CollaboratorsChanged(collaborators));
        if let Some((from, files)) = files {
            let _ = self.events_tx.send(CollabEvent::DataFilesShared { from, files });
        }
        Ok(())
    }
}

impl CollabChannel for MemoryChannel {
    fn is_on(&self) -> bool {
        self.room.is_some()
    }

    fn is_owner(&self) -> bool {
        self.owner
    }

    fn room_id(&self) -> Option<String> {
        self.room.clone()
    }

    fn me(&self) -> Collaborator {
        self.me.clone()
    }

    fn collaborators(&self) -> Vec<Collaborator> {
        self.with_room(|room| room.collaborators()).unwrap_or_default()
    }

    fn authorize(&mut self, immediate: bool) -> BoxFuture<'_, Result<(), CollabError>> {
        let granted = match self.auth {
            AuthMode::Granted => true,
            AuthMode::InteractiveOnly => !immediate,
            AuthMode::Denied => false,
        };
        debug!(immediate, granted, "authorization requested");
        self.authorized = granted;
        async move {
            if granted {
                Ok(())
            } else {
                Err(CollabError::Unauthorized)
            }
        }
        .boxed()
    }

    fn start(&mut self, scene: Scene) -> BoxFuture<'_, Result<String, CollabError>> {
        let result = self.open_room(scene);
        async move { result }.boxed()
    }

    fn join(&mut self, room_id: &str) -> BoxFuture<'_, Result<(), CollabError>> {
        let result = self.join_room(room_id);
        async move { result }.boxed()
    }

    fn leave(&mut self) {
        let Some(room_id) = self.room.take() else {
            return;
        };
        if let Ok(mut inner) = self.hub.lock() {
            if let Some(room) = inner.rooms.get_mut(&room_id) {
                room.peers.retain(|p| p.who.id != self.me.id);
                let event = CollabEvent::CollaboratorsChanged(room.collaborators());
                room.broadcast(&self.me.id, &event);
            }
        }
        info!(room = %room_id, "left collaboration room");
        self.owner = false;
        let _ = self.events_tx.send(CollabEvent::Disconnected);
    }

    fn get_object(&self) -> Option<Scene> {
        self.with_room(|room| room.scene.clone()).ok()
    }

    fn set_object(&mut self, scene: Scene) -> Result<(), CollabError> {
        let me = self.me.id.clone();
        self.with_room(|room| {
            room.scene = scene;
            room.broadcast(&me, &CollabEvent::SceneChanged);
        })
    }

    fn set_data_file_list(&mut self, files: Vec<SharedFile>) -> Result<(), CollabError> {
        let me = self.me.clone();
        self.with_room(|room| {
            room.broadcast(
                &me.id,
                &CollabEvent::DataFilesShared {
                    from: me.clone(),
                    files: files.clone(),
                },
            );
            room.files = Some((me.clone(), files));
        })
    }

    fn send_chat(&mut self, text: &str) -> Result<(), CollabError> {
        let me = self.me.clone();
        let event = CollabEvent::ChatMessage(ChatMessage {
            user: me.name,
            text: text.to_string(),
        });
        self.with_room(|room| room.broadcast(&me.id, &event))
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<CollabEvent> {
        if let Some(rx) = self.events_rx.take() {
            return rx;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.events_tx = tx;
        let peer = self.peer();
        let _ = self.with_room(|room| {
            if let Some(p) = room.peers.iter_mut().find(|p| p.who.id == peer.who.id) {
                *p = peer;
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started(hub: &MemoryHub) -> (MemoryChannel, String) {
        let mut owner = hub.channel("1", "Ana");
        owner.authorize(true).await.unwrap();
        let room = owner.start(Scene::default()).await.unwrap();
        (owner, room)
    }

    #[tokio::test]
    async fn test_start_requires_authorization() {
        let hub = MemoryHub::new();
        let mut channel = hub.channel("1", "Ana").with_auth(AuthMode::InteractiveOnly);
        assert_eq!(channel.start(Scene::default()).await, Err(CollabError::Unauthorized));
        assert_eq!(channel.authorize(true).await, Err(CollabError::Unauthorized));
        assert_eq!(channel.authorize(false).await, Ok(()));
        assert!(channel.start(Scene::default()).await.is_ok());
        assert!(channel.is_on());
        assert!(channel.is_owner());
    }

    #[tokio::test]
    async fn test_scene_changes_reach_other_peers() {
        let hub = MemoryHub::new();
        let (mut owner, room) = started(&hub).await;
        let mut owner_events = owner.subscribe();

        let mut guest = hub.channel("2", "Bo");
        guest.authorize(true).await.unwrap();
        let mut guest_events = guest.subscribe();
        guest.join(&room).await.unwrap();
        assert!(!guest.is_owner());

        let scene = Scene::from_json(r#"{"renderers":[{"general":{"id":3}}]}"#).unwrap();
        owner.set_object(scene.clone()).unwrap();
        assert_eq!(guest.get_object(), Some(scene));

        let mut got = Vec::new();
        while let Ok(e) = guest_events.try_recv() {
            got.push(e);
        }
        assert!(matches!(got[0], CollabEvent::Connected { owner: false, .. }));
        assert!(got.contains(&CollabEvent::SceneChanged));

        // The writer is not notified of its own change.
        let mut own = Vec::new();
        while let Ok(e) = owner_events.try_recv() {
            own.push(e);
        }
        assert!(!own.contains(&CollabEvent::SceneChanged));
        assert!(own.iter().any(|e| matches!(e, CollabEvent::CollaboratorsChanged(c) if c.len() == 2)));
    }

    #[tokio::test]
    async fn test_late_joiner_receives_file_list() {
        let hub = MemoryHub::new();
        let (mut owner, room) = started(&hub).await;
        let files = vec![SharedFile {
            url: "a/vol.nii".into(),
            cloud_id: "blob0".into(),
            record_id: 0,
        }];
        owner.set_data_file_list(files.clone()).unwrap();

        let mut guest = hub.channel("2", "Bo");
        guest.authorize(true).await.unwrap();
        let mut events = guest.subscribe();
        guest.join(&room).await.unwrap();

        let mut shared = None;
        while let Ok(e) = events.try_recv() {
            if let CollabEvent::DataFilesShared { from, files } = e {
                shared = Some((from, files));
            }
        }
        let (from, got) = shared.unwrap();
        assert_eq!(from.name, "Ana");
        assert_eq!(got, files);
    }

    #[tokio::test]
    async fn test_offline_hub_is_connectivity_error() {
        let hub = MemoryHub::new();
        hub.set_offline(true);
        let mut channel = hub.channel("1", "Ana");
        channel.authorize(true).await.unwrap();
        assert!(matches!(
            channel.start(Scene::default()).await,
            Err(CollabError::Connectivity(_))
        ));
    }

    #[tokio::test]
    async fn test_leave_notifies_and_disconnects() {
        let hub = MemoryHub::new();
        let (mut owner, room) = started(&hub).await;
        let mut events = owner.subscribe();
        let mut guest = hub.channel("2", "Bo");
        guest.authorize(true).await.unwrap();
        guest.join(&room).await.unwrap();

        guest.leave();
        assert!(!guest.is_on());
        assert_eq!(guest.set_object(Scene::default()), Err(CollabError::NotConnected));
        assert_eq!(owner.collaborators().len(), 1);

        let mut last_list = None;
        while let Ok(e) = events.try_recv() {
            if let CollabEvent::CollaboratorsChanged(list) = e {
                last_list = Some(list);
            }
        }
        assert_eq!(last_list.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_pass_through() {
        let hub = MemoryHub::new();
        let (mut owner, room) = started(&hub).await;
        let mut guest = hub.channel("2", "Bo");
        guest.authorize(true).await.unwrap();
        let mut events = guest.subscribe();
        guest.join(&room).await.unwrap();

        owner.send_chat("hello").unwrap();
        let mut chat = None;
        while let Ok(e) = events.try_recv() {
            if let CollabEvent::ChatMessage(m) = e {
                chat = Some(m);
            }
        }
        assert_eq!(chat.unwrap().line(), "Ana: hello");
    }
}
