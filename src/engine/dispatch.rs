//! The per-event dispatch loop.
//!
//! [`Dispatcher::run_pass`] is the operational core of the engine. For one
//! text snapshot it:
//!
//! - notifies `TEXT_CHANGED` watchers,
//! - scans the snapshot once for trigger occurrences (see `pattern.rs`),
//! - resolves each occurrence to a handler (see [`Dispatcher::resolve`]),
//! - invokes the handler with a fresh [`Query`] whose baseline is the text as
//!   left by the previous occurrence,
//! - records the final text as the surface's last processed text.
//!
//! ## Resolution order
//!
//! ```text
//! typed name ──▶ alias table ──▶ registry lookup ──▶ candidate
//!                                                      │
//!            finder #1 (typed name, args, candidate) ◀─┘
//!                 │  Some(handler) replaces the candidate
//!                 │  Some(args) replaces the args
//!                 ▼
//!            finder #2 ... ──▶ final handler or skip
//! ```
//!
//! Every finder runs for every occurrence. A failing finder is reported and
//! the chain continues with the previous result.
//!
//! ## Failure isolation
//!
//! Watchers, finders and handlers run through `isolate`, which catches both
//! `Err` returns and panics. A failure is reported and the pass moves on to the
//! next callable; the text keeps whatever the failing handler already wrote.

use std::collections::HashMap;
use std::time::Instant;

use super::metrics::{DispatchReport, OccurrenceTrace, Outcome, Resolution};
use super::pattern::{Occurrence, TriggerPattern};
use super::query::Query;
use super::registry::Registry;
use crate::api::Host;
use crate::error::{Failure, FailureSource, Reporter, isolate};
use crate::surface::SurfaceId;
use crate::{EventKind, Handler};

/// Scans text snapshots and runs the handlers they trigger.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    pattern: TriggerPattern,
    /// Last processed text per surface (the dedupe guard).
    last_text: HashMap<SurfaceId, String>,
}

impl Dispatcher {
    pub(crate) fn new(pattern: TriggerPattern) -> Self {
        Dispatcher { pattern, last_text: HashMap::new() }
    }

    pub(crate) fn pattern(&self) -> &TriggerPattern {
        &self.pattern
    }

    /// `false` when `text` is exactly what the last pass on `surface` left behind.
    pub(crate) fn should_process(&self, surface: SurfaceId, text: &str) -> bool {
        self.last_text.get(&surface).map(String::as_str) != Some(text)
    }

    /// Resolve `occurrence` against `registry`.
    ///
    /// Returns the handler (if any), the possibly overridden args, and where
    /// the handler came from.
    pub(crate) fn resolve(
        registry: &Registry,
        occurrence: &Occurrence,
        reporter: &dyn Reporter,
        failures: &mut Vec<Failure>,
    ) -> (Option<Handler>, String, Resolution) {
        let canonical = registry.resolve_alias(&occurrence.name);
        let mut candidate = registry.command(canonical).map(|command| command.handler.clone());
        let mut resolution =
            if candidate.is_some() { Resolution::Command(canonical.to_string()) } else { Resolution::Missing };
        let mut args = occurrence.args.clone();

        for entry in registry.finder_chain() {
            match isolate(|| (entry.finder)(&occurrence.name, &args, candidate.as_ref())) {
                Ok(outcome) => {
                    if let Some(handler) = outcome.handler {
                        candidate = Some(handler);
                        resolution = Resolution::Finder(entry.id);
                    }
                    if let Some(new_args) = outcome.args {
                        args = new_args;
                    }
                }
                Err(message) => report_failure(reporter, failures, FailureSource::Finder(entry.id), message),
            }
        }

        (candidate, args, resolution)
    }

    /// Run one dispatch pass over `text`, which must be the surface's current text.
    pub(crate) fn run_pass(
        &mut self,
        host: &mut Host<'_>,
        registry: &Registry,
        text: String,
        reporter: &dyn Reporter,
    ) -> DispatchReport {
        let started = Instant::now();
        let surface = host.surface_id();
        let mut failures = Vec::new();

        notify_watchers(host, registry, EventKind::TextChanged, reporter, &mut failures);

        let occurrences = self.pattern.scan(&text);
        let mut current = text;
        let mut traces = Vec::with_capacity(occurrences.len());

        for occurrence in occurrences {
            let (handler, args, resolution) = Self::resolve(registry, &occurrence, reporter, &mut failures);
            tracing::trace!(%surface, name = %occurrence.name, %args, ?resolution, "resolved occurrence");

            let outcome = match handler {
                None => Outcome::Skipped,
                Some(handler) => {
                    let mut query = Query::new(surface, current.clone(), occurrence.expression.clone(), args.clone());
                    let result = isolate(|| handler(host, &mut query));
                    current = query.into_text();
                    match result {
                        Ok(()) => Outcome::Completed,
                        Err(message) => {
                            let source = FailureSource::Command(occurrence.name.clone());
                            report_failure(reporter, &mut failures, source, message.clone());
                            Outcome::Failed(message)
                        }
                    }
                }
            };

            traces.push(OccurrenceTrace {
                expression: occurrence.expression,
                name: occurrence.name,
                args,
                resolution,
                outcome,
            });
        }

        self.last_text.insert(surface, current.clone());

        let report = DispatchReport { surface, text: current, occurrences: traces, failures, elapsed: started.elapsed() };
        tracing::debug!(
            %surface,
            occurrences = report.occurrences.len(),
            dispatched = report.dispatched(),
            failures = report.failures.len(),
            elapsed_us = report.elapsed.as_micros() as u64,
            "dispatch pass"
        );
        report
    }

    /// Forget the last processed text of `surface`.
    pub(crate) fn forget(&mut self, surface: SurfaceId) {
        self.last_text.remove(&surface);
    }

    pub(crate) fn clear(&mut self) {
        self.last_text.clear();
    }
}

/// Invoke every watcher subscribed to `kind`, in registration order.
pub(crate) fn notify_watchers(
    host: &mut Host<'_>,
    registry: &Registry,
    kind: EventKind,
    reporter: &dyn Reporter,
    failures: &mut Vec<Failure>,
) {
    for entry in registry.watchers_for(kind) {
        if let Err(message) = isolate(|| (entry.watcher)(host, kind)) {
            report_failure(reporter, failures, FailureSource::Watcher(entry.id), message);
        }
    }
}

/// Send a caught failure to `reporter` and keep a copy in `failures`.
pub(crate) fn report_failure(
    reporter: &dyn Reporter,
    failures: &mut Vec<Failure>,
    source: FailureSource,
    message: String,
) {
    tracing::warn!(%source, %message, "callable failed");
    let failure = Failure::new(source, message);
    failures.push(failure.clone());
    reporter.report(failure);
}
