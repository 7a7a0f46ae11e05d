//! Selection and contextual-menu state machine.
//!
//! A new text selection is saved as a highlight straight away, because clearing the native
//! selection overlay to show the menu would otherwise lose it. Such a highlight stays
//! *provisional* until the user confirms or annotates it; dismissing the menu, or running a
//! web search from it, rolls a provisional highlight back.
//!
//! At most one menu exists at a time. Opening another first cancels the current one.

use serde::Serialize;
use tracing::debug;

use crate::search::SearchEngine;
use crate::types::ContentLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "engine")]
pub enum MenuAction {
    Confirm,
    Delete,
    Annotate,
    Search(SearchEngine),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub action: MenuAction,
    pub label: String,
}

/// Menu contents for a highlight, as the host should render them.
pub fn menu_items(has_note: bool) -> Vec<MenuItem> {
    let item = |action, label: &str| MenuItem { action, label: label.to_string() };
    vec![
        item(MenuAction::Confirm, "Save Highlight"),
        item(MenuAction::Delete, "Delete Highlight"),
        item(MenuAction::Annotate, if has_note { "Edit Note" } else { "Create Note" }),
        item(MenuAction::Search(SearchEngine::Google), SearchEngine::Google.label()),
        item(MenuAction::Search(SearchEngine::Wikipedia), SearchEngine::Wikipedia.label()),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMenu {
    pub range: ContentLocation,
    /// The highlight was auto-created by this selection and not yet confirmed.
    pub provisional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    Idle,
    Selecting(ActiveMenu),
    MenuOpen(ActiveMenu),
}

/// Side effects the session must carry out after a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionCommand {
    CreateHighlight(ContentLocation),
    RemoveHighlight(ContentLocation),
    OpenNoteEditor(ContentLocation),
    Search { engine: SearchEngine, range: ContentLocation },
}

#[derive(Debug, Default)]
pub struct SelectionController {
    state: SelectionState,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SelectionState::Idle
    }

    /// Range the current menu acts on, if any.
    pub fn active(&self) -> Option<&ActiveMenu> {
        match &self.state {
            SelectionState::Idle => None,
            SelectionState::Selecting(menu) | SelectionState::MenuOpen(menu) => Some(menu),
        }
    }

    /// User selected text. `already_highlighted` is true when the range is already saved, in
    /// which case nothing is created and nothing will be rolled back.
    ///
    /// Engines repeat the selection event while a drag settles; reselecting the range the
    /// current menu already acts on keeps that menu as it is.
    pub fn select(
        &mut self,
        range: ContentLocation,
        already_highlighted: bool,
    ) -> Vec<SelectionCommand> {
        if self.active().is_some_and(|menu| menu.range == range) {
            debug!(target: "selection", range = %range, "repeated selection ignored");
            return Vec::new();
        }
        let mut commands = self.cancel_current();
        debug!(target: "selection", range = %range, "selecting");
        if !already_highlighted {
            commands.push(SelectionCommand::CreateHighlight(range.clone()));
        }
        self.state = SelectionState::Selecting(ActiveMenu { range, provisional: !already_highlighted });
        commands
    }

    /// The host finished rendering the menu.
    pub fn menu_rendered(&mut self) {
        if let SelectionState::Selecting(menu) = std::mem::take(&mut self.state) {
            self.state = SelectionState::MenuOpen(menu);
        }
    }

    /// Tap on an existing highlight opens its menu directly.
    pub fn tap(&mut self, range: ContentLocation) -> Vec<SelectionCommand> {
        if let SelectionState::MenuOpen(menu) = &self.state {
            if menu.range == range {
                return Vec::new();
            }
        }
        let commands = self.cancel_current();
        debug!(target: "selection", range = %range, "menu opened from tap");
        self.state = SelectionState::MenuOpen(ActiveMenu { range, provisional: false });
        commands
    }

    /// User picked a menu entry. Ignored when no menu is active.
    pub fn choose(&mut self, action: MenuAction) -> Vec<SelectionCommand> {
        let menu = match std::mem::take(&mut self.state) {
            SelectionState::Idle => return Vec::new(),
            SelectionState::Selecting(menu) | SelectionState::MenuOpen(menu) => menu,
        };
        debug!(target: "selection", range = %menu.range, ?action, "menu action");

        match action {
            MenuAction::Confirm => Vec::new(),
            MenuAction::Delete => vec![SelectionCommand::RemoveHighlight(menu.range)],
            MenuAction::Annotate => vec![SelectionCommand::OpenNoteEditor(menu.range)],
            MenuAction::Search(engine) => {
                let mut commands =
                    vec![SelectionCommand::Search { engine, range: menu.range.clone() }];
                if menu.provisional {
                    commands.push(SelectionCommand::RemoveHighlight(menu.range));
                }
                commands
            }
        }
    }

    /// Menu closed without a choice.
    pub fn dismiss(&mut self) -> Vec<SelectionCommand> {
        self.cancel_current()
    }

    /// The highlight behind the active menu was removed elsewhere.
    pub fn forget(&mut self, range: &ContentLocation) {
        if self.active().is_some_and(|menu| &menu.range == range) {
            self.state = SelectionState::Idle;
        }
    }

    fn cancel_current(&mut self) -> Vec<SelectionCommand> {
        match std::mem::take(&mut self.state) {
            SelectionState::Idle => Vec::new(),
            SelectionState::Selecting(menu) | SelectionState::MenuOpen(menu) => {
                debug!(target: "selection", range = %menu.range, provisional = menu.provisional, "menu cancelled");
                if menu.provisional {
                    vec![SelectionCommand::RemoveHighlight(menu.range)]
                } else {
                    Vec::new()
                }
            }
        }
    }
}
