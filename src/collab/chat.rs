use super::Collaborator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub user: String,
    pub text: String,
}

impl ChatMessage {
    pub fn line(&self) -> String {
        format!("{}: {}", self.user, self.text)
    }
}

/// Chat window state: transcript, collaborator list, open or closed.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    room_id: String,
    messages: Vec<ChatMessage>,
    collaborators: Vec<Collaborator>,
    me: Option<Collaborator>,
    open: bool,
}

impl ChatLog {
    pub fn new(room_id: &str, me: Collaborator) -> Self {
        Self {
            room_id: room_id.to_string(),
            messages: Vec::new(),
            collaborators: vec![me.clone()],
            me: Some(me),
            open: true,
        }
    }

    pub fn header(&self) -> String {
        format!("Room id: {}", self.room_id)
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Record a message typed locally.
    pub fn push_own(&mut self, text: &str) -> ChatMessage {
        let user = self.me.as_ref().map(|m| m.name.clone()).unwrap_or_default();
        let message = ChatMessage {
            user,
            text: text.to_string(),
        };
        self.messages.push(message.clone());
        message
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn set_collaborators(&mut self, collaborators: Vec<Collaborator>) {
        self.collaborators = collaborators;
    }

    /// Collaborator names, the local user first and marked `(me)`.
    pub fn collaborator_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.collaborators.len());
        for c in &self.collaborators {
            match &self.me {
                Some(me) if me.id == c.id => names.insert(0, format!("{} (me)", c.name)),
                _ => names.push(c.name.clone()),
            }
        }
        names
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}
