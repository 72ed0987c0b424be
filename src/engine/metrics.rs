//! Dispatch pass reports.
//!
//! Every processed text-change event yields a [`DispatchReport`]: what the
//! scan found, how each occurrence resolved, and what happened when its
//! handler ran. The CLI prints it; tests assert on it.
//!
//! ## Design notes
//!
//! - Failures are also sent to the engine's reporter. The copy kept here is
//!   for the caller that triggered the pass.
//! - `elapsed` covers watchers, scan and dispatch, not the dedupe check.

use std::time::Duration;

use crate::engine::FinderId;
use crate::error::Failure;
use crate::surface::SurfaceId;

// --- Report ------------------------------------------------------------------

/// Result of one dispatch pass over a surface.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub surface: SurfaceId,
    /// Text after the pass; recorded as the surface's last processed text.
    pub text: String,
    /// One entry per occurrence, in scan order.
    pub occurrences: Vec<OccurrenceTrace>,
    /// Failures caught during the pass (watchers, finders, handlers).
    pub failures: Vec<Failure>,
    pub elapsed: Duration,
}

impl DispatchReport {
    /// Occurrences whose handler ran to completion.
    pub fn dispatched(&self) -> usize {
        self.occurrences.iter().filter(|o| o.outcome == Outcome::Completed).count()
    }

    /// Occurrences with no handler.
    pub fn skipped(&self) -> usize {
        self.occurrences.iter().filter(|o| o.outcome == Outcome::Skipped).count()
    }
}

/// How one occurrence was resolved and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceTrace {
    pub expression: String,
    /// The name as typed.
    pub name: String,
    /// Arguments after finder overrides.
    pub args: String,
    pub resolution: Resolution,
    pub outcome: Outcome,
}

/// Where the handler for an occurrence came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Registry lookup of this canonical name.
    Command(String),
    /// The last finder that supplied a handler.
    Finder(FinderId),
    /// Nothing matched.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
    Skipped,
}
