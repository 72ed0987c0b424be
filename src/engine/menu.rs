//! Selection-driven menus.
//!
//! A handler renders a menu by answering its query with a mix of plain text
//! and clickable parts. The tracker then watches selection changes on that
//! surface:
//!
//! ```text
//!              create()
//!   Absent ───────────────▶ Active(context)
//!     ▲                        │
//!     │  length != expected    │  selection strictly inside a part
//!     ├────────────────────────┤
//!     │  (cancel / clear)      │  (run part action)
//!     └────────────────────────┘
//! ```
//!
//! Any other selection change leaves the context active. The context is
//! removed *before* an action or cancel callback runs, so a second event
//! arriving during the callback is a no-op.

use std::collections::HashMap;
use std::fmt;

use crate::Handler;
use crate::engine::Query;
use crate::surface::{Surface, SurfaceId};

/// One entry of a menu being rendered.
#[derive(Clone)]
pub enum MenuItem {
    /// Literal text.
    Text(String),
    /// A caption that runs `action` when the user selects inside it.
    Part { caption: String, action: Handler },
}

impl MenuItem {
    pub fn text(text: impl Into<String>) -> Self {
        MenuItem::Text(text.into())
    }

    pub fn part(caption: impl Into<String>, action: Handler) -> Self {
        MenuItem::Part { caption: caption.into(), action }
    }

    fn caption(&self) -> &str {
        match self {
            MenuItem::Text(text) => text,
            MenuItem::Part { caption, .. } => caption,
        }
    }
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuItem::Text(text) => f.debug_tuple("Text").field(text).finish(),
            MenuItem::Part { caption, .. } => {
                f.debug_struct("Part").field("caption", caption).field("action", &"<function>").finish()
            }
        }
    }
}

/// A clickable char range `[start, end)` in the rendered text.
#[derive(Clone)]
pub struct Part {
    pub start: usize,
    pub end: usize,
    pub action: Handler,
}

impl Part {
    /// Both selection ends lie strictly inside the part.
    pub fn contains_selection(&self, (sel_start, sel_end): (usize, usize)) -> bool {
        let inside = |pos: usize| self.start < pos && pos < self.end;
        inside(sel_start) && inside(sel_end)
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("action", &"<function>")
            .finish()
    }
}

/// An active menu on one surface.
#[derive(Clone)]
pub struct MenuContext {
    pub query: Query,
    pub parts: Vec<Part>,
    pub cancel: Option<Handler>,
    /// Char length of the text right after rendering.
    pub expected_length: usize,
}

impl fmt::Debug for MenuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuContext")
            .field("query", &self.query)
            .field("parts", &self.parts)
            .field("cancel", &self.cancel.as_ref().map(|_| "<function>"))
            .field("expected_length", &self.expected_length)
            .finish()
    }
}

/// What the engine must run after a selection change closed a menu.
pub(crate) enum MenuOutcome {
    /// The text changed under the menu; run `cancel` or clear the menu.
    Cancelled { query: Query, cancel: Option<Handler> },
    /// The user selected inside a part.
    Selected { query: Query, action: Handler },
}

/// Per-surface menu contexts.
#[derive(Debug, Default)]
pub struct MenuTracker {
    contexts: HashMap<SurfaceId, MenuContext>,
    receive_selection_changes: bool,
}

impl MenuTracker {
    pub fn new(receive_selection_changes: bool) -> Self {
        MenuTracker { contexts: HashMap::new(), receive_selection_changes }
    }

    /// Render `items` in place of the query's expression and start tracking.
    ///
    /// Returns `false` when selection tracking is disabled; the menu is still
    /// rendered but stays inert. A menu already active on the surface is
    /// replaced.
    pub fn create(
        &mut self,
        surface: &mut dyn Surface,
        query: &mut Query,
        items: Vec<MenuItem>,
        cancel: Option<Handler>,
    ) -> bool {
        let origin = query.start_position().unwrap_or(0);
        let mut rendered = String::new();
        let mut rendered_chars = 0;
        let mut parts = Vec::new();

        for item in items {
            let caption_chars = item.caption().chars().count();
            rendered.push_str(item.caption());
            if let MenuItem::Part { action, .. } = item {
                let start = origin + rendered_chars;
                parts.push(Part { start, end: start + caption_chars, action });
            }
            rendered_chars += caption_chars;
        }

        query.answer_with(surface, Some(&rendered), true);

        if !self.receive_selection_changes {
            tracing::debug!(surface = %query.surface(), "menu rendered without selection tracking");
            return false;
        }

        let id = query.surface();
        let expected_length = query.text().chars().count();
        tracing::debug!(surface = %id, parts = parts.len(), expected_length, "menu opened");
        self.contexts.insert(id, MenuContext { query: query.clone(), parts, cancel, expected_length });
        true
    }

    /// Advance the state machine for a selection change on `surface`.
    pub(crate) fn on_selection_changed(&mut self, surface: &dyn Surface) -> Option<MenuOutcome> {
        let id = surface.id();
        let context = self.contexts.get(&id)?;

        let length = surface.read_text().map(|text| text.chars().count());
        if length != Some(context.expected_length) {
            let context = self.contexts.remove(&id)?;
            tracing::debug!(surface = %id, ?length, expected = context.expected_length, "menu cancelled");
            return Some(MenuOutcome::Cancelled { query: context.query, cancel: context.cancel });
        }

        let selection = surface.read_selection();
        let index = context.parts.iter().position(|part| part.contains_selection(selection))?;
        let mut context = self.contexts.remove(&id)?;
        let part = context.parts.swap_remove(index);
        tracing::debug!(surface = %id, start = part.start, end = part.end, "menu part selected");
        Some(MenuOutcome::Selected { query: context.query, action: part.action })
    }

    /// Drop the menu on `surface` without running anything.
    pub fn close(&mut self, surface: SurfaceId) -> Option<MenuContext> {
        self.contexts.remove(&surface)
    }

    pub fn is_active(&self, surface: SurfaceId) -> bool {
        self.contexts.contains_key(&surface)
    }

    pub fn context(&self, surface: SurfaceId) -> Option<&MenuContext> {
        self.contexts.get(&surface)
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    pub(crate) fn set_receive_selection_changes(&mut self, enabled: bool) {
        self.receive_selection_changes = enabled;
    }
}
