//! The live text surface the engine observes and edits.
//!
//! The real binding (an accessibility node, an editor buffer, a terminal line)
//! lives outside this crate. The engine only needs the small capability set in
//! [`Surface`]. Offsets are counted in `char`s, never bytes.
//!
//! [`MemorySurface`] is a complete in-memory implementation used by the CLI
//! and the tests.

use std::fmt;

/// Stable identifier of a surface.
///
/// Menu contexts, the dedupe guard and scheduled tasks are keyed by this id
/// rather than by a handle to the surface itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Capabilities consumed from the text-surface binding.
///
/// Write operations report failure as `false`; the engine never retries them
/// except inside [`Query::answer_pasted`](crate::Query::answer_pasted).
pub trait Surface {
    fn id(&self) -> SurfaceId;

    /// Current text, or `None` when the binding cannot provide any.
    fn read_text(&self) -> Option<String>;

    /// Current selection as `(start, end)` char offsets.
    fn read_selection(&self) -> (usize, usize);

    fn write_text(&mut self, text: &str) -> bool;

    fn write_selection(&mut self, start: usize, end: usize) -> bool;

    fn cut(&mut self) -> bool;

    fn copy(&mut self) -> bool;

    fn paste(&mut self) -> bool;

    /// Stage `text` on the clipboard for a later [`paste`](Surface::paste).
    fn write_clipboard(&mut self, _text: &str) -> bool {
        false
    }
}

/// Resolves surface ids to live surfaces for deferred work.
///
/// Returning `None` means the surface went away; work bound to it is dropped.
pub trait Surfaces {
    fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut dyn Surface>;
}

impl Surfaces for MemorySurface {
    fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut dyn Surface> {
        if self.id == id { Some(self) } else { None }
    }
}

impl<S: Surface> Surfaces for Vec<S> {
    fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut dyn Surface> {
        self.iter_mut().find(|s| s.id() == id).map(|s| s as &mut dyn Surface)
    }
}

/// Byte offset of the `idx`-th char in `text` (clamped to the end).
pub(crate) fn byte_offset(text: &str, idx: usize) -> usize {
    text.char_indices().nth(idx).map(|(b, _)| b).unwrap_or(text.len())
}

/// Char count of `text[..byte]`.
pub(crate) fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// An in-memory text field.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    id: SurfaceId,
    text: Option<String>,
    selection: (usize, usize),
    clipboard: Option<String>,
    clipboard_access: bool,
    read_only: bool,
    writes: usize,
}

impl MemorySurface {
    /// Create a surface holding `text` with the caret at the end.
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        let text = text.into();
        let end = text.chars().count();
        MemorySurface {
            id: SurfaceId(id),
            text: Some(text),
            selection: (end, end),
            clipboard: None,
            clipboard_access: true,
            read_only: false,
            writes: 0,
        }
    }

    /// Simulate the user replacing the whole text; the caret moves to the end.
    pub fn type_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        let end = text.chars().count();
        self.text = Some(text);
        self.selection = (end, end);
    }

    /// Simulate the binding losing the text entirely.
    pub fn clear_text(&mut self) {
        self.text = None;
        self.selection = (0, 0);
    }

    /// Simulate the user moving the selection; out-of-range offsets are clamped.
    pub fn select(&mut self, start: usize, end: usize) {
        let len = self.len();
        self.selection = (start.min(len), end.min(len));
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn selection(&self) -> (usize, usize) {
        self.selection
    }

    pub fn clipboard(&self) -> Option<&str> {
        self.clipboard.as_deref()
    }

    /// Number of successful `write_text` calls.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Allow or deny clipboard staging (denied clipboards make pasted answers fall back).
    pub fn set_clipboard_access(&mut self, allowed: bool) {
        self.clipboard_access = allowed;
    }

    /// Make every write fail.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn len(&self) -> usize {
        self.text().chars().count()
    }

    fn selected_bytes(&self) -> (usize, usize) {
        let (start, end) = (self.selection.0.min(self.selection.1), self.selection.0.max(self.selection.1));
        (byte_offset(self.text(), start), byte_offset(self.text(), end))
    }
}

impl Surface for MemorySurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn read_text(&self) -> Option<String> {
        self.text.clone()
    }

    fn read_selection(&self) -> (usize, usize) {
        self.selection
    }

    fn write_text(&mut self, text: &str) -> bool {
        if self.read_only {
            return false;
        }
        self.text = Some(text.to_string());
        self.writes += 1;
        let len = self.len();
        self.selection = (self.selection.0.min(len), self.selection.1.min(len));
        true
    }

    fn write_selection(&mut self, start: usize, end: usize) -> bool {
        if start > end || end > self.len() {
            return false;
        }
        self.selection = (start, end);
        true
    }

    fn cut(&mut self) -> bool {
        if self.read_only || !self.copy() {
            return false;
        }
        let (start, end) = self.selected_bytes();
        let mut text = self.text().to_string();
        text.replace_range(start..end, "");
        let caret = self.selection.0.min(self.selection.1);
        self.text = Some(text);
        self.writes += 1;
        self.selection = (caret, caret);
        true
    }

    fn copy(&mut self) -> bool {
        if !self.clipboard_access || self.selection.0 == self.selection.1 {
            return false;
        }
        let (start, end) = self.selected_bytes();
        self.clipboard = Some(self.text()[start..end].to_string());
        true
    }

    fn paste(&mut self) -> bool {
        if self.read_only || !self.clipboard_access {
            return false;
        }
        let Some(clip) = self.clipboard.clone() else {
            return false;
        };
        let (start, end) = self.selected_bytes();
        let mut text = self.text().to_string();
        text.replace_range(start..end, &clip);
        let caret = self.selection.0.min(self.selection.1) + clip.chars().count();
        self.text = Some(text);
        self.writes += 1;
        self.selection = (caret, caret);
        true
    }

    fn write_clipboard(&mut self, text: &str) -> bool {
        if !self.clipboard_access {
            return false;
        }
        self.clipboard = Some(text.to_string());
        true
    }
}
