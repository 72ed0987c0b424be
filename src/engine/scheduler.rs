//! Deferred work for the event thread.
//!
//! Handlers that start background work (a timer, a network call) must not
//! touch a surface from another thread. They post a [`Task`] here instead and
//! the host drains the queue on the event thread with
//! [`Engine::run_pending`](crate::Engine::run_pending).
//!
//! Tasks run in due-time order; tasks with the same due time run in the order
//! they were posted.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::HandlerResult;
use crate::api::Host;
use crate::surface::SurfaceId;

/// A unit of deferred work, run once with a host for its surface.
pub type Task = Box<dyn FnOnce(&mut Host<'_>) -> HandlerResult + Send>;

pub(crate) struct Scheduled {
    pub(crate) due: Instant,
    seq: u64,
    pub(crate) surface: SurfaceId,
    pub(crate) task: Task,
}

#[derive(Default)]
struct Queue {
    pending: Vec<Scheduled>,
    seq: u64,
}

/// Thread-safe handle to the event-thread task queue. Clones share the queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    queue: Arc<Mutex<Queue>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the event thread at the next [`Engine::run_pending`](crate::Engine::run_pending).
    pub fn post<F>(&self, surface: SurfaceId, f: F)
    where
        F: FnOnce(&mut Host<'_>) -> HandlerResult + Send + 'static,
    {
        self.push(surface, Instant::now(), Box::new(f));
    }

    /// Run `f` on the event thread once `delay` has elapsed.
    pub fn post_after<F>(&self, surface: SurfaceId, delay: Duration, f: F)
    where
        F: FnOnce(&mut Host<'_>) -> HandlerResult + Send + 'static,
    {
        self.push(surface, Instant::now() + delay, Box::new(f));
    }

    fn push(&self, surface: SurfaceId, due: Instant, task: Task) {
        let mut queue = self.queue.lock();
        queue.seq += 1;
        let seq = queue.seq;
        queue.pending.push(Scheduled { due, seq, surface, task });
        tracing::trace!(%surface, seq, "task posted");
    }

    /// Number of tasks not yet run.
    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Drop every pending task.
    pub fn cancel_all(&self) -> usize {
        let dropped = std::mem::take(&mut self.queue.lock().pending).len();
        if dropped > 0 {
            tracing::debug!(dropped, "pending tasks cancelled");
        }
        dropped
    }

    /// Earliest due time among pending tasks.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.lock().pending.iter().map(|s| s.due).min()
    }

    /// Remove and return the tasks due at `now`, oldest first.
    pub(crate) fn take_due(&self, now: Instant) -> Vec<Scheduled> {
        let mut queue = self.queue.lock();
        let (mut due, later): (Vec<_>, Vec<_>) =
            std::mem::take(&mut queue.pending).into_iter().partition(|s| s.due <= now);
        queue.pending = later;
        due.sort_by_key(|s| (s.due, s.seq));
        due
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").field("pending", &self.pending()).finish()
    }
}
