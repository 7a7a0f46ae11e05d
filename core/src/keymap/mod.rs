//! Keyboard and touch input mapped to reader actions.
//!
//! Hosts forward raw key codes and touch points; the keymap turns them into an [`ActionId`]
//! the session knows how to run. Bindings are data so a host can remap them.

mod layout;
mod swipe;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use layout::default_layout;
pub use swipe::{DEFAULT_VIEWPORT_WIDTH, SWIPE_THRESHOLD, SwipeTracker, Viewport, classify_swipe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Enter,
}

impl Key {
    /// Map a DOM `keyCode`. Unbound keys yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            37 => Some(Key::ArrowLeft),
            39 => Some(Key::ArrowRight),
            13 => Some(Key::Enter),
            _ => None,
        }
    }
}

/// Direction the finger travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Swipe {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum InputGesture {
    Key(Key),
    Swipe(Swipe),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionId {
    PrevPage,
    NextPage,
    /// Run the pending in-book search query, if one was typed.
    SubmitSearch,
}

#[derive(Debug, Clone)]
pub struct Keymap {
    bindings: HashMap<InputGesture, ActionId>,
}

impl Default for Keymap {
    fn default() -> Self {
        Self::from_layout(default_layout())
    }
}

impl Keymap {
    pub fn from_layout(layout: impl IntoIterator<Item = (InputGesture, ActionId)>) -> Self {
        Self { bindings: layout.into_iter().collect() }
    }

    /// Bind `gesture`, replacing any previous action for it.
    pub fn bind(&mut self, gesture: InputGesture, action: ActionId) -> Option<ActionId> {
        self.bindings.insert(gesture, action)
    }

    pub fn unbind(&mut self, gesture: &InputGesture) -> Option<ActionId> {
        self.bindings.remove(gesture)
    }

    pub fn action(&self, gesture: &InputGesture) -> Option<ActionId> {
        self.bindings.get(gesture).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_codes_map_to_keys() {
        assert_eq!(Key::from_code(37), Some(Key::ArrowLeft));
        assert_eq!(Key::from_code(39), Some(Key::ArrowRight));
        assert_eq!(Key::from_code(13), Some(Key::Enter));
        assert_eq!(Key::from_code(38), None);
    }

    #[test]
    fn default_bindings_page_and_search() {
        let keymap = Keymap::default();
        assert_eq!(keymap.action(&InputGesture::Key(Key::ArrowLeft)), Some(ActionId::PrevPage));
        assert_eq!(keymap.action(&InputGesture::Key(Key::ArrowRight)), Some(ActionId::NextPage));
        assert_eq!(keymap.action(&InputGesture::Key(Key::Enter)), Some(ActionId::SubmitSearch));
        // Dragging content to the right reveals the previous page.
        assert_eq!(keymap.action(&InputGesture::Swipe(Swipe::Right)), Some(ActionId::PrevPage));
        assert_eq!(keymap.action(&InputGesture::Swipe(Swipe::Left)), Some(ActionId::NextPage));
        assert_eq!(keymap.action(&InputGesture::Swipe(Swipe::Up)), None);
    }

    #[test]
    fn rebinding_replaces_action() {
        let mut keymap = Keymap::default();
        let previous = keymap.bind(InputGesture::Key(Key::Enter), ActionId::NextPage);
        assert_eq!(previous, Some(ActionId::SubmitSearch));
        assert_eq!(keymap.unbind(&InputGesture::Key(Key::Enter)), Some(ActionId::NextPage));
        assert_eq!(keymap.action(&InputGesture::Key(Key::Enter)), None);
    }
}
