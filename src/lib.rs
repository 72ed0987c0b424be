extern crate self as inkline;

use std::fmt;
use std::sync::Arc;

#[macro_use]
mod macros;
mod api;
mod config;
mod engine;
mod error;
mod handlers;
mod module;
mod surface;
mod tokenizer;

pub use api::{Engine, Host};
pub use config::{DEFAULT_PATTERN, Settings};
pub use engine::{
    DispatchReport, FinderId, MenuContext, MenuItem, MenuTracker, Occurrence, OccurrenceTrace, Outcome, Part, Query,
    Registry, Resolution, Scheduler, SharedRegistry, Task, TriggerPattern, WatcherId,
};
pub use error::{CollectingReporter, Error, Failure, FailureSource, HandlerError, LogReporter, Reporter, Result};
pub use handlers::{ArgsHandler, builtins, requires_args, with_arity};
pub use module::{LazyCommand, LazyManifest, Loader, Module, ModuleId, ModuleSource, install_lazy_stubs};
pub use surface::{MemorySurface, Surface, SurfaceId, Surfaces};
pub use tokenizer::{tokenize, tokenize_quoted};

// --- Events -----------------------------------------------------------------

/// Notification kinds delivered by the text-surface binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The surface text changed.
    TextChanged,
    /// Only the selection (or caret) moved.
    SelectionChanged,
}

impl EventKind {
    /// The single-bit mask for this event.
    pub fn mask(self) -> EventMask {
        match self {
            EventKind::TextChanged => EventMask::TEXT_CHANGED,
            EventKind::SelectionChanged => EventMask::SELECTION_CHANGED,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::TextChanged => f.write_str("text-changed"),
            EventKind::SelectionChanged => f.write_str("selection-changed"),
        }
    }
}

bitflags::bitflags! {
    /// Event categories a watcher subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        const TEXT_CHANGED      = 1 << 0;
        const SELECTION_CHANGED = 1 << 1;
        const ALL = Self::TEXT_CHANGED.bits() | Self::SELECTION_CHANGED.bits();
    }
}

impl Default for EventMask {
    fn default() -> Self {
        EventMask::TEXT_CHANGED
    }
}

// --- Callables --------------------------------------------------------------

/// Result returned by every registered callable.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// A command handler or menu action, invoked with the host and the per-occurrence query.
pub type Handler = Arc<dyn Fn(&mut Host<'_>, &mut Query) -> HandlerResult + Send + Sync>;

/// A watcher, invoked for every event whose kind is in its mask.
pub type Watcher = Arc<dyn Fn(&mut Host<'_>, EventKind) -> HandlerResult + Send + Sync>;

/// A finder, invoked for every occurrence with `(name, args, candidate)`.
pub type Finder =
    Arc<dyn Fn(&str, &str, Option<&Handler>) -> std::result::Result<FinderOutcome, HandlerError> + Send + Sync>;

/// Build a [`Handler`] from a closure.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Host<'_>, &mut Query) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Build a [`Watcher`] from a closure.
pub fn watcher<F>(f: F) -> Watcher
where
    F: Fn(&mut Host<'_>, EventKind) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Build a [`Finder`] from a closure.
pub fn finder<F>(f: F) -> Finder
where
    F: Fn(&str, &str, Option<&Handler>) -> std::result::Result<FinderOutcome, HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a finder wants to change about the current occurrence.
///
/// `None` fields leave the previous candidate (or args) untouched.
#[derive(Clone, Default)]
pub struct FinderOutcome {
    pub handler: Option<Handler>,
    pub args: Option<String>,
}

impl FinderOutcome {
    /// Keep everything as it is.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Replace the candidate handler.
    pub fn handler(handler: Handler) -> Self {
        Self { handler: Some(handler), args: None }
    }

    /// Replace the arguments.
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }
}

impl fmt::Debug for FinderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinderOutcome")
            .field("handler", &self.handler.as_ref().map(|_| "<function>"))
            .field("args", &self.args)
            .finish()
    }
}

// --- Commands ---------------------------------------------------------------

/// A registered command: an opaque handler plus the metadata shown in listings.
///
/// Commands are immutable; re-registering a name replaces the whole entry.
#[derive(Clone)]
pub struct Command {
    pub category: Option<String>,
    pub handler: Handler,
    pub description: Option<String>,
}

impl Command {
    pub fn new(handler: Handler) -> Self {
        Command { category: None, handler, description: None }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("category", &self.category)
            .field("handler", &"<function>")
            .field("description", &self.description)
            .finish()
    }
}
