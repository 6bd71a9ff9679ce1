use std::collections::BTreeMap;

use super::ContainerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Button {
    Link,
    Collab,
    Auth,
    Chat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonState {
    pub visible: bool,
    pub caption: &'static str,
    pub title: &'static str,
}

/// Toolbar above the render box.
#[derive(Debug, Clone)]
pub struct Toolbar {
    buttons: BTreeMap<Button, ButtonState>,
    room_label: String,
}

impl Default for Toolbar {
    fn default() -> Self {
        Self::new()
    }
}

impl Toolbar {
    pub fn new() -> Self {
        let button = |visible, caption, title| ButtonState {
            visible,
            caption,
            title,
        };
        let buttons = BTreeMap::from([
            (Button::Link, button(false, "Link views", "Link views")),
            (Button::Collab, button(true, "Start collab", "Start collaboration")),
            (Button::Auth, button(false, "Authorize", "Authorize")),
            (Button::Chat, button(false, "Hide chat", "Hide chat window")),
        ]);
        Self {
            buttons,
            room_label: String::new(),
        }
    }

    pub fn container_id(&self) -> ContainerId {
        ContainerId::Toolbar
    }

    pub fn button(&self, button: Button) -> Option<&ButtonState> {
        self.buttons.get(&button)
    }

    pub fn is_visible(&self, button: Button) -> bool {
        self.buttons.get(&button).is_some_and(|b| b.visible)
    }

    pub fn caption(&self, button: Button) -> &'static str {
        self.buttons.get(&button).map(|b| b.caption).unwrap_or_default()
    }

    pub fn room_label(&self) -> &str {
        &self.room_label
    }

    fn set(&mut self, button: Button, f: impl FnOnce(&mut ButtonState)) {
        if let Some(state) = self.buttons.get_mut(&button) {
            f(state);
        }
    }

    /// The link button only makes sense with two or more panes.
    pub fn update_for_pane_count(&mut self, panes: usize) {
        self.set(Button::Link, |b| b.visible = panes >= 2);
    }

    pub fn set_linked(&mut self, linked: bool) {
        let text = if linked { "Unlink views" } else { "Link views" };
        self.set(Button::Link, |b| {
            b.caption = text;
            b.title = text;
        });
    }

    /// Authorization was refused: swap the collab button for the auth button.
    pub fn show_auth_prompt(&mut self) {
        self.set(Button::Collab, |b| b.visible = false);
        self.set(Button::Auth, |b| b.visible = true);
    }

    pub fn set_collab_on(&mut self, room_id: &str) {
        self.set(Button::Collab, |b| {
            b.visible = true;
            b.caption = "End collab";
            b.title = "End collaboration";
        });
        self.set(Button::Auth, |b| b.visible = false);
        self.set(Button::Chat, |b| b.visible = true);
        self.room_label = room_id.to_string();
    }

    pub fn set_collab_off(&mut self) {
        self.set(Button::Collab, |b| {
            b.visible = true;
            b.caption = "Start collab";
            b.title = "Start collaboration";
        });
        self.set(Button::Auth, |b| b.visible = false);
        self.set(Button::Chat, |b| b.visible = false);
        self.room_label.clear();
    }

    pub fn set_chat_open(&mut self, open: bool) {
        self.set(Button::Chat, |b| {
            if open {
                b.caption = "Hide chat";
                b.title = "Hide chat window";
            } else {
                b.caption = "Show chat";
                b.title = "Show chat window";
            }
        });
    }
}
