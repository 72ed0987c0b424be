//! Trigger detection and dispatch engine.
//!
//! This module holds everything that runs on the event thread between a
//! text-surface notification and the handler invocations it causes.
//!
//! ## How the parts work together
//!
//! ```text
//! TextChanged ──▶ Dispatcher::should_process      (dispatch.rs)
//!                   - dedupe against last processed text
//!                        │
//!                        ▼
//!                 TriggerPattern::scan             (pattern.rs)
//!                   - all non-overlapping occurrences, one pass
//!                        │
//!                        ▼ for each occurrence, left to right
//!                 Dispatcher::resolve
//!                   - alias ─▶ Registry lookup ─▶ finder chain (registry.rs)
//!                        │
//!                        ▼
//!                 handler(host, Query)             (query.rs)
//!                   - answer() rewrites the surface
//!                   - query.text becomes the next baseline
//!
//! SelectionChanged ──▶ watchers ──▶ MenuTracker    (menu.rs)
//!
//! any thread ──▶ Scheduler::post ──▶ Engine::run_pending (scheduler.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `pattern.rs`: compiles the trigger grammar and extracts occurrences.
//! - `registry.rs`: commands, aliases, finders and watchers, plus the
//!   snapshot-swapping [`SharedRegistry`].
//! - `dispatch.rs`: the per-event loop.
//! - `query.rs`: the per-occurrence context and the answer protocol.
//! - `menu.rs`: the selection-driven menu state machine.
//! - `scheduler.rs`: deferred work marshalled back onto the event thread.
//! - `metrics.rs`: the per-pass [`DispatchReport`].
//!
//! ## Debugging
//!
//! Every stage emits `tracing` events; set `INKLINE_LOG=inkline=trace` in the
//! CLI to see resolution traces.

#[path = "engine/dispatch.rs"]
mod dispatch;
#[path = "engine/menu.rs"]
mod menu;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/pattern.rs"]
mod pattern;
#[path = "engine/query.rs"]
mod query;
#[path = "engine/registry.rs"]
mod registry;
#[path = "engine/scheduler.rs"]
mod scheduler;

#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;

pub(crate) use dispatch::{Dispatcher, notify_watchers, report_failure};
pub(crate) use menu::MenuOutcome;
pub use menu::{MenuContext, MenuItem, MenuTracker, Part};
pub use metrics::{DispatchReport, OccurrenceTrace, Outcome, Resolution};
pub use pattern::{Occurrence, TriggerPattern};
pub use query::Query;
pub use registry::{FinderId, Registry, SharedRegistry, WatcherId};
pub use scheduler::{Scheduler, Task};
