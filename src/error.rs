//! Errors and the failure-report channel.
//!
//! Two kinds of failure exist:
//!
//! - [`Error`]: construction-time problems (bad trigger pattern, unreadable
//!   settings). These are returned to the caller.
//! - Handler failures: a command, finder, watcher, menu action or scheduled
//!   task returned a [`HandlerError`] or panicked. These are caught at the call
//!   site, turned into a [`Failure`] and handed to the [`Reporter`]. They never
//!   abort sibling work in the same event.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{FinderId, WatcherId};

/// Errors raised while building an engine or loading its settings.
#[derive(Debug, Error)]
pub enum Error {
    /// The trigger pattern is not a valid regular expression.
    #[error("invalid trigger pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The trigger pattern has no group that captures the command name.
    #[error("trigger pattern `{0}` has no name group (expected `(?P<name>..)` or at least two groups)")]
    MissingNameGroup(String),

    /// Settings or a lazy-load manifest are not valid TOML for their type.
    #[error("invalid TOML: {0}")]
    Settings(#[from] toml::de::Error),

    /// A lazy-load manifest could not be serialized.
    #[error("failed to write manifest: {0}")]
    Manifest(#[from] toml::ser::Error),

    /// Reading a settings or manifest file failed.
    #[error("I/O error reading {path}: {error}")]
    Io {
        path: String,
        error: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a registered callable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

/// Which callable failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSource {
    /// A command handler, by the trigger name that selected it.
    Command(String),
    Finder(FinderId),
    Watcher(WatcherId),
    MenuAction,
    MenuCancel,
    Task,
    /// A module initializer, by module path.
    Module(String),
}

impl fmt::Display for FailureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureSource::Command(name) => write!(f, "command `{name}`"),
            FailureSource::Finder(id) => write!(f, "finder {id}"),
            FailureSource::Watcher(id) => write!(f, "watcher {id}"),
            FailureSource::MenuAction => f.write_str("menu action"),
            FailureSource::MenuCancel => f.write_str("menu cancel action"),
            FailureSource::Task => f.write_str("scheduled task"),
            FailureSource::Module(path) => write!(f, "module `{path}`"),
        }
    }
}

/// A caught handler failure, ready for the user-visible report channel.
#[derive(Debug, Clone)]
pub struct Failure {
    pub source: FailureSource,
    pub message: String,
    pub at: DateTime<Local>,
}

impl Failure {
    pub fn new(source: FailureSource, message: impl Into<String>) -> Self {
        Failure { source, message: message.into(), at: Local::now() }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} failed: {}", self.at.format("%H:%M:%S"), self.source, self.message)
    }
}

/// The notification channel for caught failures.
pub trait Reporter: Send + Sync {
    fn report(&self, failure: Failure);
}

/// Reports failures as `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, failure: Failure) {
        tracing::error!(source = %failure.source, at = %failure.at.to_rfc3339(), "{}", failure.message);
    }
}

/// Keeps failures in memory (and logs them) so callers can inspect them later.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    failures: Arc<Mutex<Vec<Failure>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every failure reported so far.
    pub fn failures(&self) -> Vec<Failure> {
        self.failures.lock().clone()
    }

    /// Remove and return the reported failures.
    pub fn take(&self) -> Vec<Failure> {
        std::mem::take(&mut *self.failures.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, failure: Failure) {
        LogReporter.report(failure.clone());
        self.failures.lock().push(failure);
    }
}

/// Run `f`, converting both an `Err` and a panic into a failure message.
pub(crate) fn isolate<T>(f: impl FnOnce() -> std::result::Result<T, HandlerError>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
